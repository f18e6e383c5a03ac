use crate::error::TransportError;
use crate::transport::{Source, aborted};
use crate::wire::{Envelope, Tag};
use crossbeam_channel::Receiver;
use std::collections::VecDeque;

/// What a backend pushes into an inbox: a message, or the reason none will come
pub type Delivery = Result<Envelope, TransportError>;

/// Arrival-ordered mailbox with per-source matching.
///
/// Messages that arrive while a receive is pinned to another rank are stashed
/// and handed out later in their original arrival order.
pub struct Inbox {
    rx: Receiver<Delivery>,
    stash: VecDeque<Envelope>,
}

impl Inbox {
    pub fn new(rx: Receiver<Delivery>) -> Self {
        Self {
            rx,
            stash: VecDeque::new(),
        }
    }

    pub fn recv(&mut self, from: Source) -> Result<Envelope, TransportError> {
        if let Some(pos) = self.stash.iter().position(|e| from.matches(e.source))
            && let Some(envelope) = self.stash.remove(pos)
        {
            return Ok(envelope);
        }

        loop {
            let envelope = self
                .rx
                .recv()
                .map_err(|_| TransportError::Disconnected)??;

            if envelope.tag == Tag::Abort {
                return Err(aborted(&envelope));
            }
            if from.matches(envelope.source) {
                return Ok(envelope);
            }
            self.stash.push_back(envelope);
        }
    }

    /// Messages received but not yet handed out
    pub fn pending(&self) -> usize {
        self.stash.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Field;
    use crossbeam_channel::unbounded;

    fn env(source: usize, value: i32) -> Delivery {
        Ok(Envelope {
            source,
            tag: Tag::Job,
            field: Field::Int(value),
        })
    }

    #[test]
    fn test_pinned_receive_stashes_other_sources() {
        let (tx, rx) = unbounded();
        let mut inbox = Inbox::new(rx);
        tx.send(env(1, 10)).unwrap();
        tx.send(env(2, 20)).unwrap();
        tx.send(env(1, 11)).unwrap();
        tx.send(env(2, 21)).unwrap();

        assert_eq!(inbox.recv(Source::Rank(2)).unwrap().field, Field::Int(20));
        assert_eq!(inbox.pending(), 1);
        assert_eq!(inbox.recv(Source::Rank(2)).unwrap().field, Field::Int(21));
        assert_eq!(inbox.pending(), 2);

        // Stashed messages come back in arrival order
        assert_eq!(inbox.recv(Source::Any).unwrap().field, Field::Int(10));
        assert_eq!(inbox.recv(Source::Any).unwrap().field, Field::Int(11));
        assert_eq!(inbox.pending(), 0);
    }

    #[test]
    fn test_abort_surfaces_regardless_of_filter() {
        let (tx, rx) = unbounded();
        let mut inbox = Inbox::new(rx);
        tx.send(Ok(Envelope {
            source: 3,
            tag: Tag::Abort,
            field: Field::Text(b"boom".to_vec()),
        }))
        .unwrap();

        match inbox.recv(Source::Rank(1)) {
            Err(TransportError::Aborted { rank, reason }) => {
                assert_eq!(rank, 3);
                assert_eq!(reason, "boom");
            }
            other => panic!("expected abort, got {:?}", other),
        }
    }

    #[test]
    fn test_disconnected_when_all_senders_gone() {
        let (tx, rx) = unbounded::<Delivery>();
        drop(tx);
        let mut inbox = Inbox::new(rx);
        assert!(matches!(
            inbox.recv(Source::Any),
            Err(TransportError::Disconnected)
        ));
    }
}
