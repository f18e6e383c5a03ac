//! Configuration for a distributed run.

use std::fmt;
use std::str::FromStr;

/// How worker ranks are hosted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LaunchMode {
    /// Every worker is a thread in this process
    #[default]
    Threads,
    /// Every worker is a child process of this binary
    Processes,
}

impl FromStr for LaunchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "threads" | "thread" => Ok(Self::Threads),
            "processes" | "process" => Ok(Self::Processes),
            _ => Err(format!(
                "Unknown launch mode: '{}'. Valid options: threads, processes",
                s
            )),
        }
    }
}

impl fmt::Display for LaunchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Threads => write!(f, "threads"),
            Self::Processes => write!(f, "processes"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Number of worker ranks (the coordinator is extra)
    pub workers: usize,
    /// Search threads inside each worker; 0 means one per core
    pub threads_per_worker: usize,
    pub mode: LaunchMode,
    /// Show a progress bar while jobs complete
    pub progress: bool,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            threads_per_worker: 0,
            mode: LaunchMode::default(),
            progress: false,
        }
    }
}

impl LaunchConfig {
    /// Set the number of workers (at least one)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_threads_per_worker(mut self, threads: usize) -> Self {
        self.threads_per_worker = threads;
        self
    }

    pub fn with_mode(mut self, mode: LaunchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    /// Participants in the run, coordinator included
    pub fn participants(&self) -> usize {
        self.workers + 1
    }
}
