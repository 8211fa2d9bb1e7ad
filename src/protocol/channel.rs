//! Channel
//!
//! One duplex byte stream carrying a session's command lines, response
//! lines and block streams. Everything is strictly sequential: a block
//! stream must be drained before the next line is interpreted.

use std::io::{self, BufRead, Read, Write};

use bytes::BytesMut;

use crate::error::{RepoError, Result};

use super::block::{self, BlockHeader};
use super::codec::{self, MAX_LINE_SIZE};
use super::{Command, Response};

/// Role and host of the other end, used only to label re-raised faults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub role: String,
    pub host: String,
}

impl Peer {
    pub fn new(role: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            host: host.into(),
        }
    }
}

impl Default for Peer {
    fn default() -> Self {
        Self::new("remote", "localhost")
    }
}

/// Buffered duplex channel
pub struct Channel<R, W> {
    reader: R,
    writer: W,

    /// Largest block this side writes
    buffer_size: usize,

    peer: Peer,
}

impl<R: BufRead, W: Write> Channel<R, W> {
    /// Create a channel over a reader/writer pair
    pub fn new(reader: R, writer: W, buffer_size: usize) -> Self {
        Self {
            reader,
            writer,
            buffer_size: buffer_size.clamp(1, block::MAX_BLOCK_SIZE),
            peer: Peer::default(),
        }
    }

    /// Label the other end for error messages
    pub fn with_peer(mut self, peer: Peer) -> Self {
        self.peer = peer;
        self
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn set_buffer_size(&mut self, size: usize) {
        self.buffer_size = size.clamp(1, block::MAX_BLOCK_SIZE);
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }

    // =========================================================================
    // Lines
    // =========================================================================

    /// Read one line, without its newline
    ///
    /// End of stream before any byte is an `UnexpectedEof` transport error.
    pub fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = (&mut self.reader)
            .take(MAX_LINE_SIZE as u64 + 1)
            .read_line(&mut line)?;

        if read == 0 {
            return Err(RepoError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "channel closed while waiting for a line",
            )));
        }

        if !line.ends_with('\n') {
            if read > MAX_LINE_SIZE {
                return Err(RepoError::Protocol(format!(
                    "line exceeds maximum of {} bytes",
                    MAX_LINE_SIZE
                )));
            }
            return Err(RepoError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "channel closed mid-line",
            )));
        }

        line.pop();
        Ok(line)
    }

    /// Write one line (buffered until `flush`)
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    // =========================================================================
    // Commands and Responses
    // =========================================================================

    /// Send a command and flush
    pub fn write_command(&mut self, command: &Command) -> Result<()> {
        tracing::trace!("Sending command {}", command.name);
        self.write_line(&codec::encode_command(command))?;
        self.flush()
    }

    /// Block until the next command line arrives
    pub fn read_command(&mut self) -> Result<Command> {
        let line = self.read_line()?;
        codec::decode_command(&line)
    }

    /// Send a response and flush
    pub fn write_response(&mut self, response: &Response) -> Result<()> {
        self.write_line(&codec::encode_response(response))?;
        self.flush()
    }

    /// Block until the next response line arrives
    pub fn read_response(&mut self) -> Result<Response> {
        let line = self.read_line()?;
        codec::decode_response(&line)
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    /// Write one data block (buffered until `flush`)
    pub fn write_block(&mut self, payload: &[u8]) -> Result<()> {
        block::write_block(&mut self.writer, payload)
    }

    /// Write the stream terminator and flush
    pub fn write_terminator(&mut self, ok: bool) -> Result<()> {
        block::write_terminator(&mut self.writer, ok)?;
        self.flush()
    }

    /// Read the next block header
    ///
    /// A response line in place of a header means the producer failed after
    /// the stream started; that fault is raised here.
    pub fn read_block_header(&mut self) -> Result<BlockHeader> {
        let line = self.read_line()?;

        if codec::is_response_line(&line) {
            return match codec::decode_response(&line)? {
                Response::Error { code, message } => Err(self.peer.raise(code, message)),
                _ => Err(RepoError::Protocol(format!(
                    "unexpected response '{}' in block stream",
                    line
                ))),
            };
        }

        block::parse_block_size(&line)
    }

    /// Read exactly `len` payload bytes into `buf`, replacing its contents
    pub fn read_block_payload(&mut self, len: usize, buf: &mut BytesMut) -> Result<()> {
        buf.clear();
        buf.resize(len, 0);
        self.reader.read_exact(&mut buf[..])?;
        Ok(())
    }

    /// Read up to `out.len()` payload bytes of the current block
    pub fn read_payload(&mut self, out: &mut [u8]) -> Result<usize> {
        let read = self.reader.read(out)?;
        if read == 0 && !out.is_empty() {
            return Err(RepoError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "channel closed inside a block",
            )));
        }
        Ok(read)
    }

    /// Discard payload bytes of the current block
    pub fn skip_payload(&mut self, len: usize) -> Result<()> {
        let skipped = io::copy(&mut (&mut self.reader).take(len as u64), &mut io::sink())?;
        if skipped != len as u64 {
            return Err(RepoError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "channel closed inside a block",
            )));
        }
        Ok(())
    }

    /// Discard blocks until a terminator, returning it
    pub fn drain_blocks(&mut self) -> Result<BlockHeader> {
        loop {
            match self.read_block_header()? {
                BlockHeader::Data(len) => self.skip_payload(len)?,
                terminator => return Ok(terminator),
            }
        }
    }
}
