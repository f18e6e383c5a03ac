//! Work distribution on rank 0.
//!
//! The coordinator owns the job queue. It broadcasts the run configuration
//! and the pattern set, gives every worker one job, then hands the next job
//! to whichever worker returns first. Once the queue is empty it only
//! collects, and when every job is back it terminates each worker once.

use crate::error::{ClusterError, Result};
use crate::model::{Job, Pattern, Rank, RunConfig};
use crate::transport::{Source, Transport};
use crate::utils::progress::{ProgressBar, job_bar};
use crate::wire::{recv_job, send_config, send_job, send_pattern, send_terminate};

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Jobs remain undispatched; every return is answered with a new job
    Dispatching,
    /// Every job is out; only collecting returns
    Draining,
    /// Every job is back and every worker has been terminated
    Done,
}

/// One job handed to one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    pub job_index: usize,
    pub worker: Rank,
}

/// Everything a finished coordinator hands back
#[derive(Debug)]
pub struct CoordinatorOutcome {
    /// Completed jobs in input order
    pub jobs: Vec<Job>,
    /// Dispatches in the order they were sent
    pub dispatches: Vec<Dispatch>,
    /// Rank of each returned job, in arrival order
    pub returns: Vec<Rank>,
    /// Jobs completed per worker; index 0 is rank 1
    pub per_worker: Vec<usize>,
    /// Largest number of jobs out at once
    pub peak_in_progress: usize,
}

/// The job queue and its bookkeeping
pub struct Coordinator<'t, T: Transport + ?Sized> {
    transport: &'t mut T,
    phase: Phase,
    /// Jobs not yet sent; taken (and freed) as they go out
    queue: Vec<Option<Job>>,
    next: usize,
    completed: Vec<Option<Job>>,
    /// Outstanding (job index, job id) per worker; index 0 is rank 1
    assignments: Vec<Option<(usize, i32)>>,
    finished: usize,
    in_progress: usize,
    peak_in_progress: usize,
    dispatches: Vec<Dispatch>,
    returns: Vec<Rank>,
    per_worker: Vec<usize>,
    progress: Option<ProgressBar>,
}

impl<'t, T: Transport + ?Sized> Coordinator<'t, T> {
    pub fn new(transport: &'t mut T, jobs: Vec<Job>) -> Result<Self> {
        let size = transport.size();
        if size < 2 {
            return Err(ClusterError::TooFewParticipants(size));
        }
        let total = jobs.len();
        Ok(Self {
            transport,
            phase: Phase::Dispatching,
            queue: jobs.into_iter().map(Some).collect(),
            next: 0,
            completed: (0..total).map(|_| None).collect(),
            assignments: vec![None; size - 1],
            finished: 0,
            in_progress: 0,
            peak_in_progress: 0,
            dispatches: Vec::with_capacity(total),
            returns: Vec::with_capacity(total),
            per_worker: vec![0; size - 1],
            progress: None,
        })
    }

    /// Tick a progress bar as jobs complete
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled.then(|| job_bar(self.queue.len()));
        self
    }

    fn workers(&self) -> usize {
        self.assignments.len()
    }

    fn total(&self) -> usize {
        self.queue.len()
    }

    /// Drive the whole run: setup, dispatch, drain, terminate
    pub fn run(mut self, tolerance: f64, patterns: &[Pattern]) -> Result<CoordinatorOutcome> {
        let config = RunConfig {
            tolerance,
            job_count: self.total(),
            pattern_count: patterns.len(),
        };
        self.broadcast_setup(&config, patterns)?;

        // Initial fan-out: at most one job per worker
        for worker in 1..=self.workers() {
            if self.next == self.total() {
                break;
            }
            self.dispatch(worker)?;
        }
        if self.next == self.total() {
            self.enter(Phase::Draining);
        }

        while self.finished < self.total() {
            let worker = self.collect_one()?;
            if self.phase == Phase::Dispatching {
                self.dispatch(worker)?;
                if self.next == self.total() {
                    self.enter(Phase::Draining);
                }
            }
        }

        for worker in 1..=self.workers() {
            send_terminate(&mut *self.transport, worker, self.finished)?;
        }
        self.enter(Phase::Done);

        if let Some(bar) = &self.progress {
            bar.finish_and_clear();
        }

        let jobs = self
            .completed
            .into_iter()
            .enumerate()
            .map(|(i, job)| {
                job.ok_or_else(|| ClusterError::Protocol(format!("job #{} never came back", i)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(CoordinatorOutcome {
            jobs,
            dispatches: self.dispatches,
            returns: self.returns,
            per_worker: self.per_worker,
            peak_in_progress: self.peak_in_progress,
        })
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!(from = ?self.phase, to = ?phase, finished = self.finished, "phase change");
        self.phase = phase;
    }

    fn broadcast_setup(&mut self, config: &RunConfig, patterns: &[Pattern]) -> Result<()> {
        tracing::info!(
            workers = self.workers(),
            jobs = config.job_count,
            patterns = config.pattern_count,
            tolerance = config.tolerance,
            "broadcasting run configuration"
        );
        for worker in 1..=self.workers() {
            send_config(&mut *self.transport, worker, config)?;
        }
        for worker in 1..=self.workers() {
            for pattern in patterns {
                send_pattern(&mut *self.transport, worker, pattern)?;
            }
        }
        Ok(())
    }

    /// Send the next queued job to an idle worker
    fn dispatch(&mut self, worker: Rank) -> Result<()> {
        let slot = worker - 1;
        if let Some((index, _)) = self.assignments[slot] {
            return Err(ClusterError::Protocol(format!(
                "rank {} still holds job #{}",
                worker, index
            )));
        }

        let index = self.next;
        let job = self.queue[index]
            .take()
            .ok_or_else(|| ClusterError::Protocol(format!("job #{} dispatched twice", index)))?;
        send_job(&mut *self.transport, worker, &job)?;

        self.assignments[slot] = Some((index, job.id));
        self.next += 1;
        self.in_progress += 1;
        self.peak_in_progress = self.peak_in_progress.max(self.in_progress);
        self.dispatches.push(Dispatch {
            job_index: index,
            worker,
        });
        tracing::debug!(job = job.id, worker, in_progress = self.in_progress, "dispatched");
        Ok(())
    }

    /// Wait for any worker to return its job; returns that worker's rank
    fn collect_one(&mut self) -> Result<Rank> {
        let (worker, job) = recv_job(&mut *self.transport, Source::Any)?;
        if worker == 0 || worker > self.workers() {
            return Err(ClusterError::Protocol(format!(
                "job returned from unexpected rank {}",
                worker
            )));
        }

        let (index, id) = self.assignments[worker - 1].take().ok_or_else(|| {
            ClusterError::Protocol(format!("rank {} returned a job it was never sent", worker))
        })?;
        if job.id != id {
            return Err(ClusterError::Protocol(format!(
                "rank {} returned job {} but was sent job {}",
                worker, job.id, id
            )));
        }

        tracing::debug!(job = job.id, worker, found = job.found, "job returned");
        self.completed[index] = Some(job);
        self.finished += 1;
        self.in_progress -= 1;
        self.per_worker[worker - 1] += 1;
        self.returns.push(worker);
        if let Some(bar) = &self.progress {
            bar.inc(1);
        }
        Ok(worker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{COORDINATOR, Grid};
    use crate::transport::{LocalTransport, create_mesh};
    use crate::wire::{Field, Tag, decode_job, recv_config, recv_pattern};
    use std::thread;

    fn jobs(n: i32) -> Vec<Job> {
        (0..n)
            .map(|id| Job::new(id, Grid::new(2, vec![id; 4]).unwrap()))
            .collect()
    }

    /// A scripted worker that echoes jobs back and records what it saw
    fn echo_worker(mut t: LocalTransport) -> Vec<Tag> {
        let config = recv_config(&mut t, Source::Rank(COORDINATOR)).unwrap();
        for _ in 0..config.pattern_count {
            recv_pattern(&mut t, Source::Rank(COORDINATOR)).unwrap();
        }
        let mut seen = Vec::new();
        loop {
            let msg = t.recv(Source::Rank(COORDINATOR)).unwrap();
            seen.push(msg.tag);
            match msg.tag {
                Tag::Terminate => {
                    assert_eq!(msg.field, Field::Int(config.job_count as i32));
                    break;
                }
                Tag::Job => {
                    let (_, job) = decode_job(&mut t, msg).unwrap();
                    send_job(&mut t, COORDINATOR, &job).unwrap();
                }
                other => panic!("unexpected tag {:?}", other),
            }
        }
        seen
    }

    fn run_with(workers: usize, n: i32) -> (CoordinatorOutcome, Vec<Vec<Tag>>) {
        let mut mesh = create_mesh(workers + 1);
        let mut coordinator_t = mesh.remove(0);
        let handles: Vec<_> = mesh
            .into_iter()
            .map(|t| thread::spawn(move || echo_worker(t)))
            .collect();

        let patterns = vec![Pattern::new(9, Grid::new(1, vec![1]).unwrap())];
        let outcome = Coordinator::new(&mut coordinator_t, jobs(n))
            .unwrap()
            .run(0.0, &patterns)
            .unwrap();
        let seen = handles.into_iter().map(|h| h.join().unwrap()).collect();
        (outcome, seen)
    }

    #[test]
    fn test_every_job_returns_once_in_input_order() {
        let (outcome, _) = run_with(3, 10);
        let ids: Vec<_> = outcome.jobs.iter().map(|j| j.id).collect();
        assert_eq!(ids, (0..10).collect::<Vec<_>>());
        assert_eq!(outcome.dispatches.len(), 10);
        assert_eq!(outcome.per_worker.iter().sum::<usize>(), 10);
    }

    #[test]
    fn test_refill_goes_to_the_returning_worker() {
        let (outcome, _) = run_with(3, 11);
        assert_eq!(outcome.returns.len(), 11);
        // Each dispatch after the initial fan-out answers exactly one return
        for (k, dispatch) in outcome.dispatches.iter().enumerate().skip(3) {
            assert_eq!(dispatch.worker, outcome.returns[k - 3], "dispatch {}", k);
        }
    }

    #[test]
    fn test_in_progress_never_exceeds_workers() {
        let (outcome, _) = run_with(2, 5);
        assert!(outcome.peak_in_progress <= 2);
        assert_eq!(outcome.peak_in_progress, 2);
    }

    #[test]
    fn test_each_worker_terminated_exactly_once_and_last() {
        let (_, seen) = run_with(4, 6);
        for tags in seen {
            assert_eq!(tags.iter().filter(|t| **t == Tag::Terminate).count(), 1);
            assert_eq!(tags.last(), Some(&Tag::Terminate));
        }
    }

    #[test]
    fn test_fewer_jobs_than_workers() {
        let (outcome, seen) = run_with(4, 2);
        assert_eq!(outcome.jobs.len(), 2);
        let idle = seen.iter().filter(|tags| tags == &&vec![Tag::Terminate]).count();
        assert_eq!(idle, 2);
    }

    #[test]
    fn test_no_jobs_still_terminates() {
        let (outcome, seen) = run_with(2, 0);
        assert!(outcome.jobs.is_empty());
        assert!(seen.iter().all(|tags| tags == &vec![Tag::Terminate]));
    }

    #[test]
    fn test_single_participant_is_rejected() {
        let mut mesh = create_mesh(1);
        assert!(matches!(
            Coordinator::new(&mut mesh[0], jobs(1)),
            Err(ClusterError::TooFewParticipants(1))
        ));
    }

    #[test]
    fn test_unsolicited_return_is_protocol_violation() {
        let mut mesh = create_mesh(2);
        let mut worker_t = mesh.pop().unwrap();
        let mut coordinator_t = mesh.pop().unwrap();

        // Worker answers with a job id it was never given
        let handle = thread::spawn(move || {
            let config = recv_config(&mut worker_t, Source::Any).unwrap();
            assert_eq!(config.pattern_count, 0);
            let msg = worker_t.recv(Source::Any).unwrap();
            let (_, mut job) = decode_job(&mut worker_t, msg).unwrap();
            job.id += 100;
            send_job(&mut worker_t, COORDINATOR, &job).unwrap();
            worker_t
        });

        let err = Coordinator::new(&mut coordinator_t, jobs(1))
            .unwrap()
            .run(0.0, &[])
            .unwrap_err();
        assert!(matches!(err, ClusterError::Protocol(_)));
        handle.join().unwrap();
    }
}
