//! Process transport: workers are child processes speaking framed fields
//! over their stdin (from the coordinator) and stdout (to the coordinator).
//!
//! Writes are buffered and flushed right before the sender blocks on a
//! receive, so a multi-field record normally leaves in one write.

use crate::error::TransportError;
use crate::model::{COORDINATOR, Rank};
use crate::transport::{Delivery, Inbox, Source, Transport, aborted, check_rank};
use crate::wire::frame::{read_frame, write_frame};
use crate::wire::{Envelope, FieldRef, Tag};
use crossbeam_channel::{Sender, unbounded};
use std::ffi::OsString;
use std::io::{self, BufReader, BufWriter, Read, Stdin, Stdout, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

/// Coordinator side of the process transport
pub struct ProcessHub {
    size: usize,
    children: Vec<Child>,
    /// Indexed by `rank - 1`
    writers: Vec<BufWriter<ChildStdin>>,
    dirty: Vec<bool>,
    readers: Vec<JoinHandle<()>>,
    inbox: Inbox,
}

impl ProcessHub {
    /// Spawn `workers` children running `program base_args... --rank R --size S`
    pub fn spawn(
        program: &Path,
        base_args: &[OsString],
        workers: usize,
    ) -> Result<Self, TransportError> {
        let size = workers + 1;
        let (tx, rx) = unbounded();

        let mut hub = Self {
            size,
            children: Vec::with_capacity(workers),
            writers: Vec::with_capacity(workers),
            dirty: vec![false; workers],
            readers: Vec::with_capacity(workers),
            inbox: Inbox::new(rx),
        };

        for rank in 1..size {
            let mut child = Command::new(program)
                .args(base_args)
                .arg("--rank")
                .arg(rank.to_string())
                .arg("--size")
                .arg(size.to_string())
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .spawn()?;

            let stdin = child.stdin.take().ok_or(TransportError::Disconnected)?;
            let stdout = child.stdout.take().ok_or(TransportError::Disconnected)?;
            hub.children.push(child);
            hub.writers.push(BufWriter::new(stdin));
            hub.readers.push(spawn_reader(rank, stdout, tx.clone())?);
            tracing::debug!(rank, "spawned worker process");
        }

        // Only the reader threads hold senders; once every child is gone the
        // inbox reports disconnection instead of blocking forever
        drop(tx);
        Ok(hub)
    }

    fn flush_dirty(&mut self) -> Result<(), TransportError> {
        for (i, (writer, dirty)) in self.writers.iter_mut().zip(self.dirty.iter_mut()).enumerate() {
            if *dirty {
                writer
                    .flush()
                    .map_err(|e| io::Error::new(e.kind(), format!("rank {}: {}", i + 1, e)))?;
                *dirty = false;
            }
        }
        Ok(())
    }

    /// Close every child's stdin and wait for all of them to exit
    pub fn wait(mut self) -> Result<(), TransportError> {
        self.flush_dirty()?;
        self.writers.clear();

        let mut failed = Vec::new();
        for (i, child) in self.children.iter_mut().enumerate() {
            let status = child.wait()?;
            if !status.success() {
                failed.push(format!("rank {} exited with {}", i + 1, status));
            }
        }
        self.children.clear();

        for handle in self.readers.drain(..) {
            let _ = handle.join();
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(TransportError::Io(io::Error::other(failed.join(", "))))
        }
    }
}

fn spawn_reader(
    rank: Rank,
    stdout: ChildStdout,
    tx: Sender<Delivery>,
) -> Result<JoinHandle<()>, TransportError> {
    let handle = thread::Builder::new()
        .name(format!("rank-{}-reader", rank))
        .spawn(move || {
            let mut reader = BufReader::new(stdout);
            loop {
                match read_frame(&mut reader) {
                    Ok(Some((tag, field))) => {
                        let envelope = Envelope {
                            source: rank,
                            tag,
                            field,
                        };
                        if tx.send(Ok(envelope)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        let eof = io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            format!("rank {} closed its stream", rank),
                        );
                        let _ = tx.send(Err(eof.into()));
                        break;
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        })?;
    Ok(handle)
}

impl Transport for ProcessHub {
    fn rank(&self) -> Rank {
        COORDINATOR
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&mut self, dest: Rank, tag: Tag, field: FieldRef<'_>) -> Result<(), TransportError> {
        check_rank(dest, self.size)?;
        if dest == COORDINATOR {
            return Err(TransportError::InvalidRank {
                rank: dest,
                size: self.size,
            });
        }
        write_frame(&mut self.writers[dest - 1], tag, field)?;
        self.dirty[dest - 1] = true;
        Ok(())
    }

    fn recv(&mut self, from: Source) -> Result<Envelope, TransportError> {
        if let Source::Rank(r) = from {
            check_rank(r, self.size)?;
        }
        self.flush_dirty()?;
        self.inbox.recv(from)
    }

    fn abort(&mut self, reason: &str) {
        for dest in 1..self.size {
            let _ = self.send(dest, Tag::Abort, FieldRef::Text(reason.as_bytes()));
        }
        let _ = self.flush_dirty();
    }
}

impl Drop for ProcessHub {
    fn drop(&mut self) {
        // Reached with live children only on an error path
        for child in &mut self.children {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Worker side of the process transport: talks only to the coordinator
pub struct StdioEndpoint<R: Read, W: Write> {
    rank: Rank,
    size: usize,
    reader: R,
    writer: W,
    dirty: bool,
}

impl StdioEndpoint<BufReader<Stdin>, BufWriter<Stdout>> {
    /// Endpoint over this process's own stdin and stdout
    pub fn from_stdio(rank: Rank, size: usize) -> Result<Self, TransportError> {
        Self::new(
            rank,
            size,
            BufReader::new(io::stdin()),
            BufWriter::new(io::stdout()),
        )
    }
}

impl<R: Read, W: Write> StdioEndpoint<R, W> {
    pub fn new(rank: Rank, size: usize, reader: R, writer: W) -> Result<Self, TransportError> {
        check_rank(rank, size)?;
        if rank == COORDINATOR {
            return Err(TransportError::InvalidRank { rank, size });
        }
        Ok(Self {
            rank,
            size,
            reader,
            writer,
            dirty: false,
        })
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        if self.dirty {
            self.writer.flush()?;
            self.dirty = false;
        }
        Ok(())
    }

    pub fn into_writer(mut self) -> Result<W, TransportError> {
        self.flush()?;
        Ok(self.writer)
    }
}

impl<R: Read, W: Write> Transport for StdioEndpoint<R, W> {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&mut self, dest: Rank, tag: Tag, field: FieldRef<'_>) -> Result<(), TransportError> {
        if dest != COORDINATOR {
            return Err(TransportError::InvalidRank {
                rank: dest,
                size: self.size,
            });
        }
        write_frame(&mut self.writer, tag, field)?;
        self.dirty = true;
        Ok(())
    }

    fn recv(&mut self, from: Source) -> Result<Envelope, TransportError> {
        if let Source::Rank(r) = from
            && r != COORDINATOR
        {
            return Err(TransportError::InvalidRank {
                rank: r,
                size: self.size,
            });
        }
        self.flush()?;

        let (tag, field) = read_frame(&mut self.reader)?.ok_or(TransportError::Disconnected)?;
        let envelope = Envelope {
            source: COORDINATOR,
            tag,
            field,
        };
        if tag == Tag::Abort {
            return Err(aborted(&envelope));
        }
        Ok(envelope)
    }

    fn abort(&mut self, reason: &str) {
        let _ = self.send(COORDINATOR, Tag::Abort, FieldRef::Text(reason.as_bytes()));
        let _ = self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Field;
    use std::io::Cursor;

    #[test]
    fn test_endpoint_reads_coordinator_frames() {
        let mut input = Vec::new();
        write_frame(&mut input, Tag::Config, FieldRef::Float(1.5)).unwrap();
        write_frame(&mut input, Tag::Terminate, FieldRef::Int(4)).unwrap();

        let mut endpoint = StdioEndpoint::new(1, 3, Cursor::new(input), Vec::new()).unwrap();
        let first = endpoint.recv(Source::Rank(COORDINATOR)).unwrap();
        assert_eq!((first.tag, first.field), (Tag::Config, Field::Float(1.5)));
        let second = endpoint.recv(Source::Any).unwrap();
        assert_eq!((second.tag, second.field), (Tag::Terminate, Field::Int(4)));
        assert!(matches!(
            endpoint.recv(Source::Any),
            Err(TransportError::Disconnected)
        ));
    }

    #[test]
    fn test_endpoint_buffers_until_receive() {
        let mut endpoint = StdioEndpoint::new(2, 3, Cursor::new(Vec::new()), Vec::new()).unwrap();
        endpoint.send(COORDINATOR, Tag::Job, FieldRef::Int(7)).unwrap();
        endpoint.send(COORDINATOR, Tag::Job, FieldRef::Text(b"hi")).unwrap();

        let written = endpoint.into_writer().unwrap();
        let mut cursor = Cursor::new(written);
        assert_eq!(
            read_frame(&mut cursor).unwrap(),
            Some((Tag::Job, Field::Int(7)))
        );
        assert_eq!(
            read_frame(&mut cursor).unwrap(),
            Some((Tag::Job, Field::Text(b"hi".to_vec())))
        );
    }

    #[test]
    fn test_endpoint_only_talks_to_coordinator() {
        let mut endpoint = StdioEndpoint::new(1, 3, Cursor::new(Vec::new()), Vec::new()).unwrap();
        assert!(endpoint.send(2, Tag::Job, FieldRef::Int(1)).is_err());
        assert!(endpoint.recv(Source::Rank(2)).is_err());
        assert!(StdioEndpoint::new(0, 3, Cursor::new(Vec::new()), Vec::new()).is_err());
    }

    #[test]
    fn test_endpoint_surfaces_abort() {
        let mut input = Vec::new();
        write_frame(&mut input, Tag::Abort, FieldRef::Text(b"bad input")).unwrap();
        let mut endpoint = StdioEndpoint::new(1, 2, Cursor::new(input), Vec::new()).unwrap();
        match endpoint.recv(Source::Any) {
            Err(TransportError::Aborted { rank, reason }) => {
                assert_eq!(rank, COORDINATOR);
                assert_eq!(reason, "bad input");
            }
            other => panic!("expected abort, got {:?}", other),
        }
    }
}
