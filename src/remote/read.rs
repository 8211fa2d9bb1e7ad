//! Remote read stream
//!
//! Presents an inbound block stream as a `Read`.

use std::io::{self, BufRead, Read, Write};

use crate::error::{ErrorKind, RepoError};
use crate::protocol::{BlockHeader, Channel};

/// Reads a remote file block by block
///
/// Mutably borrows the channel, so no other exchange can start until the
/// stream is finished or dropped.
pub struct RemoteRead<'a, R: BufRead, W: Write> {
    channel: &'a mut Channel<R, W>,

    /// Unread payload bytes of the current block
    remaining: usize,

    /// A terminator was seen or the stream failed
    done: bool,
}

impl<'a, R: BufRead, W: Write> RemoteRead<'a, R, W> {
    pub(crate) fn new(channel: &'a mut Channel<R, W>) -> Self {
        Self {
            channel,
            remaining: 0,
            done: false,
        }
    }

    /// True once the end of the stream has been reached
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Advance to the next block with payload, false at the end
    fn next_block(&mut self) -> Result<bool, RepoError> {
        while self.remaining == 0 {
            match self.channel.read_block_header()? {
                BlockHeader::Data(len) => {
                    tracing::trace!("Block of {} bytes", len);
                    self.remaining = len;
                }
                BlockHeader::End => return Ok(false),
                BlockHeader::Abort => {
                    return Err(RepoError::fault(
                        ErrorKind::Protocol,
                        "read stream aborted by peer",
                    ))
                }
            }
        }
        Ok(true)
    }
}

impl<R: BufRead, W: Write> Read for RemoteRead<'_, R, W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.done || buf.is_empty() {
            return Ok(0);
        }

        match self.next_block() {
            Ok(true) => {}
            Ok(false) => {
                self.done = true;
                return Ok(0);
            }
            Err(e) => {
                self.done = true;
                return Err(e.into());
            }
        }

        let want = buf.len().min(self.remaining);
        match self.channel.read_payload(&mut buf[..want]) {
            Ok(read) => {
                self.remaining -= read;
                Ok(read)
            }
            Err(e) => {
                self.done = true;
                Err(e.into())
            }
        }
    }
}

impl<R: BufRead, W: Write> Drop for RemoteRead<'_, R, W> {
    fn drop(&mut self) {
        if self.done {
            return;
        }

        // Leave the channel at a line boundary for the next command
        let drained = self
            .channel
            .skip_payload(self.remaining)
            .and_then(|_| self.channel.drain_blocks());

        if let Err(e) = drained {
            tracing::warn!("Failed to drain abandoned read stream: {}", e);
        }
    }
}
