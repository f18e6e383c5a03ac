//! In-process transport: one thread per rank, crossbeam channels between them.
//!
//! Fields are copied into owned envelopes on send, so ranks share nothing but
//! the channels themselves.

use crate::error::TransportError;
use crate::model::Rank;
use crate::transport::{Delivery, Inbox, Source, Transport, check_rank};
use crate::wire::{Envelope, FieldRef, Tag};
use crossbeam_channel::{Sender, unbounded};

/// Endpoint of one rank in an in-process mesh
pub struct LocalTransport {
    rank: Rank,
    /// One sender per rank, indexed by destination
    peers: Vec<Sender<Delivery>>,
    inbox: Inbox,
}

/// Create a fully connected mesh of `size` endpoints; endpoint `i` has rank `i`
pub fn create_mesh(size: usize) -> Vec<LocalTransport> {
    // Unbounded so senders never block; message passing stays eager
    let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();

    receivers
        .into_iter()
        .enumerate()
        .map(|(rank, rx)| LocalTransport {
            rank,
            peers: senders.clone(),
            inbox: Inbox::new(rx),
        })
        .collect()
}

impl Transport for LocalTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&mut self, dest: Rank, tag: Tag, field: FieldRef<'_>) -> Result<(), TransportError> {
        check_rank(dest, self.size())?;
        let envelope = Envelope {
            source: self.rank,
            tag,
            field: field.to_owned(),
        };
        self.peers[dest]
            .send(Ok(envelope))
            .map_err(|_| TransportError::Disconnected)
    }

    fn recv(&mut self, from: Source) -> Result<Envelope, TransportError> {
        if let Source::Rank(r) = from {
            check_rank(r, self.size())?;
        }
        self.inbox.recv(from)
    }

    fn abort(&mut self, reason: &str) {
        for dest in 0..self.size() {
            if dest != self.rank {
                let _ = self.send(dest, Tag::Abort, FieldRef::Text(reason.as_bytes()));
            }
        }
    }
}
