//! # picsift - distributed template search
//!
//! picsift reads a batch of square integer grids ("jobs") and a set of smaller
//! grids ("patterns"), and reports where each pattern occurs inside each job
//! within a relative-difference tolerance.
//!
//! ## Architecture
//!
//! The crate is organized into these main modules:
//!
//! - [`wire`] - Tagged, versioned record codec on top of the transport
//! - [`transport`] - Rank-addressed message passing (thread mesh or child processes)
//! - [`cluster`] - Coordinator, worker loop and bootstrap
//! - [`search`] - Matching primitive and the per-job parallel orchestrator
//! - [`input`] / [`output`] - Batch file loader and report writer
//! - [`logging`] - tracing subscriber setup
//!
//! ## Quick Start
//!
//! ```ignore
//! use picsift::cluster::{LaunchConfig, run_threads};
//! use picsift::search::ReferenceMatcher;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let batch = picsift::input::load(Path::new("input.txt")).unwrap();
//! let config = LaunchConfig::default().with_workers(4);
//! let outcome = run_threads(batch, &config, Arc::new(ReferenceMatcher)).unwrap();
//! picsift::output::write_report(Path::new("output.txt"), &outcome.coordinator.jobs).unwrap();
//! ```

pub mod cluster;
pub mod error;
pub mod input;
pub mod logging;
pub mod model;
pub mod output;
pub mod search;
pub mod transport;
pub mod utils;
pub mod wire;
