//! Bootstrap: assign roles by rank and run a batch end to end.
//!
//! Any fatal error on any rank aborts every other rank, so a failed run never
//! leaves participants blocked on a receive.

use crate::cluster::config::LaunchConfig;
use crate::cluster::coordinator::{Coordinator, CoordinatorOutcome};
use crate::cluster::worker::{WorkerSummary, run_worker};
use crate::error::{ClusterError, Result, TransportError};
use crate::model::{Batch, Rank};
use crate::search::{Matcher, SearchOrchestrator};
use crate::transport::{ProcessHub, StdioEndpoint, Transport, create_mesh};
use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a completed run
#[derive(Debug)]
pub struct RunOutcome {
    pub coordinator: CoordinatorOutcome,
    pub elapsed: Duration,
}

/// Run the coordinator role on `transport`, aborting every peer on failure
pub fn coordinate<T: Transport + ?Sized>(
    transport: &mut T,
    batch: Batch,
    progress: bool,
) -> Result<CoordinatorOutcome> {
    let result = Coordinator::new(&mut *transport, batch.jobs).and_then(|c| {
        c.with_progress(progress)
            .run(batch.tolerance, &batch.patterns)
    });
    if let Err(e) = &result {
        tracing::error!(error = %e, "coordinator failed, aborting run");
        transport.abort(&e.to_string());
    }
    result
}

/// Run the worker role on `transport`, aborting the run on failure
pub fn serve<T: Transport + ?Sized>(
    transport: &mut T,
    threads: usize,
    matcher: Arc<dyn Matcher>,
) -> Result<WorkerSummary> {
    let result =
        SearchOrchestrator::new(threads, matcher).and_then(|o| run_worker(&mut *transport, &o));
    if let Err(e) = &result {
        tracing::error!(rank = transport.rank(), error = %e, "worker failed, aborting run");
        transport.abort(&e.to_string());
    }
    result
}

/// Aborts the run when a worker thread unwinds, so no peer waits on it forever
struct AbortOnPanic<'a, T: Transport + ?Sized>(&'a mut T);

impl<T: Transport + ?Sized> Drop for AbortOnPanic<'_, T> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.abort("worker thread panicked");
        }
    }
}

/// Run a batch with every worker on its own thread of this process
pub fn run_threads(
    batch: Batch,
    config: &LaunchConfig,
    matcher: Arc<dyn Matcher>,
) -> Result<RunOutcome> {
    let start = Instant::now();
    let size = config.participants();
    if size < 2 {
        return Err(ClusterError::TooFewParticipants(size));
    }

    let mut mesh = create_mesh(size);
    let mut coordinator_t = mesh.remove(0);
    let threads = config.threads_per_worker;

    let (outcome, workers) = thread::scope(|s| {
        let spawned: std::io::Result<Vec<_>> = mesh
            .into_iter()
            .map(|mut t| {
                let matcher = Arc::clone(&matcher);
                let rank = t.rank();
                thread::Builder::new()
                    .name(format!("rank-{}", rank))
                    .spawn_scoped(s, move || {
                        let guard = AbortOnPanic(&mut t);
                        serve(&mut *guard.0, threads, matcher)
                    })
                    .map(|handle| (rank, handle))
            })
            .collect();

        let handles = match spawned {
            Ok(handles) => handles,
            Err(e) => {
                // Release the workers that did start before the scope joins them
                coordinator_t.abort("failed to start worker threads");
                return (Err(ClusterError::from(TransportError::Io(e))), Vec::new());
            }
        };

        let outcome = coordinate(&mut coordinator_t, batch, config.progress);
        let workers: Vec<(Rank, Option<Result<WorkerSummary>>)> = handles
            .into_iter()
            .map(|(rank, handle)| (rank, handle.join().ok()))
            .collect();
        (outcome, workers)
    });

    // The coordinator's error names the rank that failed first
    let coordinator = outcome?;
    for (rank, result) in workers {
        match result {
            Some(summary) => {
                summary?;
            }
            None => return Err(ClusterError::WorkerPanicked(rank)),
        }
    }

    let elapsed = start.elapsed();
    tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "run complete");
    Ok(RunOutcome {
        coordinator,
        elapsed,
    })
}

/// Run a batch with every worker in a child process of `program`.
///
/// Children are started as `program base_args... --rank R --size S` and must
/// call [`serve_stdio`].
pub fn run_processes(
    batch: Batch,
    config: &LaunchConfig,
    program: &Path,
    base_args: &[OsString],
) -> Result<RunOutcome> {
    let start = Instant::now();
    let size = config.participants();
    if size < 2 {
        return Err(ClusterError::TooFewParticipants(size));
    }

    let mut hub = ProcessHub::spawn(program, base_args, config.workers)?;
    // On error the hub is dropped here, which kills the children
    let coordinator = coordinate(&mut hub, batch, config.progress)?;
    hub.wait()?;

    let elapsed = start.elapsed();
    tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "run complete");
    Ok(RunOutcome {
        coordinator,
        elapsed,
    })
}

/// Worker-process entry point: serve the coordinator over stdin/stdout
pub fn serve_stdio(
    rank: Rank,
    size: usize,
    threads: usize,
    matcher: Arc<dyn Matcher>,
) -> Result<WorkerSummary> {
    let mut endpoint = StdioEndpoint::from_stdio(rank, size)?;
    let summary = serve(&mut endpoint, threads, matcher)?;
    endpoint.into_writer()?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MatchError;
    use crate::model::{Grid, Job, Offset, Pattern};
    use crate::search::{MatchBuffer, ReferenceMatcher};

    fn batch(jobs: usize) -> Batch {
        let pattern = Pattern::new(1, Grid::from_rows(&[&[7, 8], &[9, 10]]).unwrap());
        let jobs = (0..jobs as i32)
            .map(|id| {
                let mut grid = Grid::new(4, vec![1; 16]).unwrap();
                if id % 2 == 0 {
                    grid.embed(&pattern.grid, Offset::new(1, 2));
                }
                Job::new(id, grid)
            })
            .collect();
        Batch {
            tolerance: 0.0,
            jobs,
            patterns: vec![pattern],
        }
    }

    #[test]
    fn test_run_threads_completes_every_job() {
        let config = LaunchConfig::default().with_workers(3).with_threads_per_worker(1);
        let outcome = run_threads(batch(7), &config, Arc::new(ReferenceMatcher)).unwrap();

        let jobs = &outcome.coordinator.jobs;
        assert_eq!(jobs.len(), 7);
        for job in jobs {
            let expected = if job.id % 2 == 0 { 1 } else { 0 };
            assert_eq!(job.found, expected, "job {}", job.id);
        }
        assert!(jobs[0].report.ends_with("1 Position (1,2); "));
    }

    struct BrokenMatcher;

    impl Matcher for BrokenMatcher {
        fn find(&self, _: &Job, _: &Pattern, _: f64) -> std::result::Result<MatchBuffer, MatchError> {
            Err(MatchError::Kernel("out of device memory".to_string()))
        }
    }

    #[test]
    fn test_worker_failure_aborts_whole_run() {
        let config = LaunchConfig::default().with_workers(2).with_threads_per_worker(1);
        let err = run_threads(batch(4), &config, Arc::new(BrokenMatcher)).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("aborted the run"), "{}", msg);
        assert!(msg.contains("out of device memory"), "{}", msg);
    }
}
