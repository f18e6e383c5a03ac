//! Error types for picsift.
//!
//! Every layer has its own enum; the binary folds them into `anyhow::Error`.
//! None of these are retried: any error that reaches the cluster layer aborts
//! the whole run.

use crate::model::Rank;
use crate::wire::{FieldKind, Tag};
use std::path::PathBuf;
use thiserror::Error;

/// Failures of the point-to-point channel between ranks.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer channel disconnected")]
    Disconnected,

    #[error("rank {rank} aborted the run: {reason}")]
    Aborted { rank: Rank, reason: String },

    #[error("bad frame: {0}")]
    BadFrame(String),

    #[error("invalid rank {rank} for a run of {size} participants")]
    InvalidRank { rank: Rank, size: usize },
}

/// Failures while encoding or decoding a record.
#[derive(Error, Debug)]
pub enum WireError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("malformed {record} record: {detail}")]
    MalformedRecord { record: &'static str, detail: String },

    #[error(
        "schema mismatch for {record}: expected id {expected_id} v{expected_version} \
         ({expected_fields} fields), got id {id} v{version} ({fields} fields)"
    )]
    SchemaMismatch {
        record: &'static str,
        expected_id: u8,
        expected_version: u8,
        expected_fields: u8,
        id: u8,
        version: u8,
        fields: u8,
    },

    #[error("unexpected {found:?} message from rank {from_rank}, expected {expected:?}")]
    UnexpectedTag {
        from_rank: Rank,
        expected: Tag,
        found: Tag,
    },

    #[error("{record} field '{field}' should be {expected:?}, got {found:?}")]
    UnexpectedField {
        record: &'static str,
        field: &'static str,
        expected: FieldKind,
        found: FieldKind,
    },
}

impl WireError {
    pub(crate) fn malformed(record: &'static str, detail: impl Into<String>) -> Self {
        WireError::MalformedRecord {
            record,
            detail: detail.into(),
        }
    }
}

/// Failures while reading the textual input file.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected end of input while reading {what}")]
    Missing { what: String },

    #[error("invalid value '{token}' while reading {what}")]
    Invalid { what: String, token: String },

    #[error("{what} must be positive, got {value}")]
    NotPositive { what: String, value: i64 },
}

/// Failures reported by a matching primitive.
#[derive(Error, Debug)]
pub enum MatchError {
    #[error("pattern {pattern} (dim {pattern_dim}) does not fit job {job} (dim {job_dim})")]
    DoesNotFit {
        job: i32,
        job_dim: usize,
        pattern: i32,
        pattern_dim: usize,
    },

    #[error("matching kernel failed: {0}")]
    Kernel(String),
}

/// Failures of the coordinator, the workers or the bootstrap.
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("a run needs at least 2 participants, got {0}")]
    TooFewParticipants(usize),

    #[error("worker rank {0} panicked")]
    WorkerPanicked(Rank),

    #[error("failed to build search thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result type alias for cluster operations.
pub type Result<T> = std::result::Result<T, ClusterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_record_message() {
        let err = WireError::malformed("job", "dimension 0");
        let msg = err.to_string();
        assert!(msg.contains("malformed job record"));
        assert!(msg.contains("dimension 0"));
    }

    #[test]
    fn test_aborted_message_names_rank() {
        let err = TransportError::Aborted {
            rank: 3,
            reason: "kernel failed".to_string(),
        };
        assert_eq!(err.to_string(), "rank 3 aborted the run: kernel failed");
    }

    #[test]
    fn test_transport_error_converts_through_wire() {
        let err: ClusterError = WireError::from(TransportError::Disconnected).into();
        assert!(matches!(
            err,
            ClusterError::Wire(WireError::Transport(TransportError::Disconnected))
        ));
    }
}
