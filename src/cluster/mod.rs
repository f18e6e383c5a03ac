//! Distributed batch execution
//!
//! One coordinator rank owns the batch and hands jobs out one at a time; every
//! other rank is a worker that searches a job against the full pattern set and
//! sends it back annotated.
//!
//! Architecture:
//! - `coordinator`: dispatch/refill state machine, collects jobs in input order
//! - `worker`: receive setup, then process jobs until told to terminate
//! - `launch`: role assignment by rank, thread or process hosting, abort on failure

pub mod config;
pub mod coordinator;
pub mod launch;
pub mod worker;

pub use config::{LaunchConfig, LaunchMode};
pub use coordinator::{Coordinator, CoordinatorOutcome, Dispatch};
pub use launch::{RunOutcome, coordinate, run_processes, run_threads, serve, serve_stdio};
pub use worker::{WorkerSummary, receive_setup, run_worker};
