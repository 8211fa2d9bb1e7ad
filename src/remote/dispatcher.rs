//! Storage Command Dispatcher
//!
//! Server side of the remote storage protocol. Executes storage commands
//! against a local `Storage` and writes the response, driving a block
//! stream for reads and writes.

use std::collections::HashMap;
use std::io::{BufRead, Read, Write};

use bytes::BytesMut;

use crate::error::{RepoError, Result};
use crate::network::{CommandHandler, Handled};
use crate::protocol::{BlockHeader, Channel, Command, CommandKind, Response, StorageCommand};
use crate::storage::{Storage, WriteOptions};

/// Executes storage commands on behalf of a remote driver
pub struct StorageDispatcher<S> {
    storage: S,

    /// Command names this dispatcher owns
    table: HashMap<&'static str, CommandKind>,

    /// Reused block buffer
    buffer: BytesMut,
}

impl<S: Storage> StorageDispatcher<S> {
    pub fn new(storage: S) -> Self {
        let table = CommandKind::STORAGE
            .into_iter()
            .map(|kind| (kind.name(), kind))
            .collect();

        Self {
            storage,
            table,
            buffer: BytesMut::new(),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Execute a decoded command and write its response
    pub fn execute<R: BufRead, W: Write>(
        &mut self,
        command: StorageCommand,
        channel: &mut Channel<R, W>,
    ) -> Result<()> {
        match command {
            StorageCommand::Exists { file } => {
                let exists = self.storage.exists(&file)?;
                channel.write_response(&Response::out(exists))
            }
            StorageCommand::List {
                path,
                error_on_missing,
                expression,
            } => {
                let list =
                    self.storage
                        .list(path.as_deref(), error_on_missing, expression.as_deref())?;
                channel.write_response(&Response::out(list))
            }
            StorageCommand::PathExists { path } => {
                let exists = self.storage.path_exists(path.as_deref())?;
                channel.write_response(&Response::out(exists))
            }
            StorageCommand::PathCreate {
                path,
                error_on_exists,
                no_parent_create,
                mode,
            } => {
                self.storage
                    .path_create(&path, error_on_exists, no_parent_create, mode)?;
                channel.write_response(&Response::Void)
            }
            StorageCommand::PathRemove {
                path,
                error_on_missing,
                recurse,
            } => {
                self.storage.path_remove(&path, error_on_missing, recurse)?;
                channel.write_response(&Response::Void)
            }
            StorageCommand::PathSync {
                path,
                ignore_missing,
            } => {
                self.storage.path_sync(&path, ignore_missing)?;
                channel.write_response(&Response::Void)
            }
            StorageCommand::Remove {
                file,
                error_on_missing,
            } => {
                self.storage.remove(&file, error_on_missing)?;
                channel.write_response(&Response::Void)
            }
            StorageCommand::OpenRead {
                file,
                ignore_missing,
            } => self.open_read(&file, ignore_missing, channel),
            StorageCommand::OpenWrite { file, options } => self.open_write(&file, options, channel),
        }
    }

    /// `{"out":false}`, or `{"out":true}` followed by the file as blocks
    ///
    /// A fault after the stream started propagates and is written by the
    /// session in place of the next block header.
    fn open_read<R: BufRead, W: Write>(
        &mut self,
        file: &str,
        ignore_missing: bool,
        channel: &mut Channel<R, W>,
    ) -> Result<()> {
        let mut read = match self.storage.open_read(file, ignore_missing)? {
            Some(read) => read,
            None => return channel.write_response(&Response::out(false)),
        };

        channel.write_response(&Response::out(true))?;

        self.buffer.clear();
        self.buffer.resize(channel.buffer_size(), 0);

        let mut total = 0u64;
        loop {
            let len = read_full(&mut read, &mut self.buffer)?;
            if len == 0 {
                break;
            }
            channel.write_block(&self.buffer[..len])?;
            total += len as u64;
        }

        tracing::debug!("Sent '{}' ({} bytes)", file, total);
        channel.write_terminator(true)
    }

    /// Ack the open, write inbound blocks, ack the close
    fn open_write<R: BufRead, W: Write>(
        &mut self,
        file: &str,
        options: WriteOptions,
        channel: &mut Channel<R, W>,
    ) -> Result<()> {
        let mut write = self.storage.open_write(file, options)?;
        channel.write_response(&Response::Void)?;

        // A failed write keeps draining so the channel stays in sync
        let mut failure: Option<RepoError> = None;
        let mut total = 0u64;

        let completed = loop {
            match channel.read_block_header()? {
                BlockHeader::Data(len) if failure.is_some() => channel.skip_payload(len)?,
                BlockHeader::Data(len) => {
                    channel.read_block_payload(len, &mut self.buffer)?;
                    match write.write_all(&self.buffer) {
                        Ok(()) => total += len as u64,
                        Err(e) => {
                            let err = RepoError::from(e);
                            tracing::warn!("Write to '{}' failed: {}", file, err);
                            failure = Some(err);
                        }
                    }
                }
                BlockHeader::End => break true,
                BlockHeader::Abort => break false,
            }
        };

        if completed {
            if let Some(err) = failure {
                return Err(err);
            }
            write.close()?;
            tracing::debug!("Received '{}' ({} bytes)", file, total);
        } else {
            tracing::warn!(
                "Write to '{}' abandoned by peer after {} bytes",
                file,
                total
            );
            drop(write);
        }

        channel.write_response(&Response::Void)
    }
}

impl<S: Storage, R: BufRead, W: Write> CommandHandler<R, W> for StorageDispatcher<S> {
    fn handle(&mut self, command: &Command, channel: &mut Channel<R, W>) -> Result<Handled> {
        let kind = match self.table.get(command.name.as_str()) {
            Some(kind) => *kind,
            None => return Ok(Handled::NotRecognized),
        };

        match StorageCommand::decode(kind, &command.params)? {
            Some(decoded) => {
                self.execute(decoded, channel)?;
                Ok(Handled::Done)
            }
            None => Ok(Handled::NotRecognized),
        }
    }
}

/// Read until `buf` is full or the source is exhausted
fn read_full<T: Read + ?Sized>(read: &mut T, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match read.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
