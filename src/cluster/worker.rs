//! The loop every worker rank runs.

use crate::error::{ClusterError, Result};
use crate::model::{COORDINATOR, Pattern, Rank, RunConfig};
use crate::search::SearchOrchestrator;
use crate::transport::{Source, Transport};
use crate::wire::{Tag, decode_job, recv_config, recv_pattern, send_job};

/// What a worker did before it was terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSummary {
    pub rank: Rank,
    pub jobs: usize,
}

/// Receive the run configuration and the full pattern set from the coordinator
pub fn receive_setup<T: Transport + ?Sized>(transport: &mut T) -> Result<(RunConfig, Vec<Pattern>)> {
    let config = recv_config(transport, Source::Rank(COORDINATOR))?;
    let patterns = (0..config.pattern_count)
        .map(|_| recv_pattern(transport, Source::Rank(COORDINATOR)))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((config, patterns))
}

/// Process jobs one at a time until the coordinator says stop
pub fn run_worker<T: Transport + ?Sized>(
    transport: &mut T,
    orchestrator: &SearchOrchestrator,
) -> Result<WorkerSummary> {
    let rank = transport.rank();
    let (config, patterns) = receive_setup(transport)?;
    tracing::debug!(
        rank,
        patterns = patterns.len(),
        threads = orchestrator.threads(),
        "worker ready"
    );

    let mut jobs = 0;
    loop {
        let message = transport.recv(Source::Rank(COORDINATOR))?;
        match message.tag {
            Tag::Terminate => break,
            Tag::Job => {
                if jobs == config.job_count {
                    return Err(ClusterError::Protocol(format!(
                        "coordinator sent rank {} more jobs than the run declared ({})",
                        rank, config.job_count
                    )));
                }
                let (_, mut job) = decode_job(transport, message)?;
                orchestrator.search(&mut job, &patterns, config.tolerance)?;
                send_job(transport, COORDINATOR, &job)?;
                jobs += 1;
            }
            other => {
                return Err(ClusterError::Protocol(format!(
                    "worker {} expected a job or terminate, got {:?}",
                    rank, other
                )));
            }
        }
    }

    tracing::debug!(rank, jobs, "worker terminated");
    Ok(WorkerSummary { rank, jobs })
}
