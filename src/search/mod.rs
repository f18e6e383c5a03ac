//! Intra-worker search: the matching primitive and the orchestrator that
//! fans a job out across it.

pub mod matcher;
pub mod orchestrator;

pub use matcher::{MatchBuffer, Matcher, ReferenceMatcher, candidate_span};
pub use orchestrator::{SearchOrchestrator, SearchStats};
