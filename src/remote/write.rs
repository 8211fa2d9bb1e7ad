//! Remote write stream
//!
//! Buffers outbound bytes and sends them as blocks of exactly the channel
//! buffer size. `close()` ends the stream with `BRBLOCK0`; dropping without
//! close ends it with `BRBLOCK-1` so the remote side abandons the file.

use std::io::{self, BufRead, Write};

use bytes::BytesMut;

use crate::error::{RepoError, Result};
use crate::protocol::Channel;
use crate::storage::{StorageWrite, WriteOptions};

/// Writes a remote file block by block
pub struct RemoteWrite<'a, R: BufRead, W: Write> {
    channel: &'a mut Channel<R, W>,
    name: String,
    options: WriteOptions,

    /// Bytes not yet sent as a block
    pending: BytesMut,

    closed: bool,
}

impl<'a, R: BufRead, W: Write> RemoteWrite<'a, R, W> {
    pub(crate) fn new(channel: &'a mut Channel<R, W>, name: String, options: WriteOptions) -> Self {
        let capacity = channel.buffer_size();
        Self {
            channel,
            name,
            options,
            pending: BytesMut::with_capacity(capacity),
            closed: false,
        }
    }

    fn closed_error(&self) -> io::Error {
        io::Error::other(format!("write to '{}' already closed", self.name))
    }

    /// Send every complete block
    fn send_full_blocks(&mut self) -> Result<()> {
        let size = self.channel.buffer_size();
        while self.pending.len() >= size {
            let block = self.pending.split_to(size);
            self.channel.write_block(&block)?;
        }
        Ok(())
    }

    /// Send whatever is pending as one short block
    fn send_pending(&mut self) -> Result<()> {
        if !self.pending.is_empty() {
            let block = self.pending.split();
            self.channel.write_block(&block)?;
        }
        Ok(())
    }
}

impl<R: BufRead, W: Write> Write for RemoteWrite<'_, R, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(self.closed_error());
        }

        self.pending.extend_from_slice(buf);
        self.send_full_blocks()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }

        self.send_pending()?;
        self.channel.flush()?;
        Ok(())
    }
}

impl<R: BufRead, W: Write> StorageWrite for RemoteWrite<'_, R, W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn options(&self) -> &WriteOptions {
        &self.options
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        self.send_pending()?;
        self.channel.write_terminator(true)?;

        let peer = self.channel.peer().clone();
        self.channel.read_response()?.into_value(&peer)?;

        tracing::debug!("Closed remote write '{}'", self.name);
        Ok(())
    }
}

impl<R: BufRead, W: Write> Drop for RemoteWrite<'_, R, W> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        tracing::debug!("Abandoning remote write '{}'", self.name);
        self.pending.clear();

        let abandoned = self
            .channel
            .write_terminator(false)
            .and_then(|_| self.channel.read_response());

        match abandoned {
            Ok(_) => {}
            Err(RepoError::Io(e)) => tracing::debug!("Channel lost abandoning write: {}", e),
            Err(e) => tracing::warn!("Failed to abandon remote write '{}': {}", self.name, e),
        }
    }
}
