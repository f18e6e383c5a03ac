//! Core records: jobs, patterns and the run configuration.

pub mod types;

pub use types::*;
