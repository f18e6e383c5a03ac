//! Point-to-point message passing between ranks.
//!
//! A transport moves single field messages between participants. Messages
//! from one sender arrive in the order they were sent; there is no other
//! framing, so multi-field records rely on field order alone.
//!
//! Backends:
//! - [`local`]: every rank is a thread, linked by crossbeam channels
//! - [`pipe`]: every worker is a child process, linked to the coordinator by
//!   its stdin/stdout
//!
//! Both coordinator-side backends funnel arrivals through an [`Inbox`] so a
//! wait-for-any receive can be followed by receives pinned to the rank that
//! answered.

mod inbox;
pub mod local;
pub mod pipe;

pub use inbox::{Delivery, Inbox};
pub use local::{LocalTransport, create_mesh};
pub use pipe::{ProcessHub, StdioEndpoint};

use crate::error::TransportError;
use crate::model::Rank;
use crate::wire::{Envelope, FieldRef, Tag};

/// Which sender a receive accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// First arrival from any rank
    Any,
    /// Only messages from this rank
    Rank(Rank),
}

impl Source {
    pub fn matches(&self, rank: Rank) -> bool {
        match self {
            Source::Any => true,
            Source::Rank(r) => *r == rank,
        }
    }
}

/// Ordered, reliable, tagged point-to-point channel.
pub trait Transport {
    /// This participant's rank
    fn rank(&self) -> Rank;

    /// Total number of participants, coordinator included
    fn size(&self) -> usize;

    /// Send one field message to `dest`
    fn send(&mut self, dest: Rank, tag: Tag, field: FieldRef<'_>) -> Result<(), TransportError>;

    /// Block until a message from `from` arrives.
    ///
    /// An `Abort` message from any rank surfaces as [`TransportError::Aborted`].
    fn recv(&mut self, from: Source) -> Result<Envelope, TransportError>;

    /// Tell every reachable peer that the run is over. Best effort.
    fn abort(&mut self, reason: &str);
}

pub(crate) fn check_rank(rank: Rank, size: usize) -> Result<(), TransportError> {
    if rank >= size {
        return Err(TransportError::InvalidRank { rank, size });
    }
    Ok(())
}

/// Turn an `Abort` envelope into the matching error
pub(crate) fn aborted(envelope: &Envelope) -> TransportError {
    let reason = match &envelope.field {
        crate::wire::Field::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        other => format!("{:?}", other),
    };
    TransportError::Aborted {
        rank: envelope.source,
        reason,
    }
}
