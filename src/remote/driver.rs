//! Remote Storage Driver
//!
//! Client side of the remote storage protocol. Every `Storage` call is one
//! command line and one response line, with reads and writes continuing
//! as a block stream on the same channel.
//!
//! ```text
//!   caller ──► RemoteStorage ──command──► Session ──► StorageDispatcher
//!                   ▲                                        │
//!                   └──────── response (+ blocks) ◄──────────┘
//! ```

use std::io::{BufRead, Read, Write};

use serde_json::Value;

use crate::config::Config;
use crate::error::{RepoError, Result};
use crate::protocol::{Channel, Command, CommandKind, Peer, StorageCommand};
use crate::storage::{Storage, StorageWrite, WriteOptions};

use super::{RemoteRead, RemoteWrite};

/// `Storage` backed by a remote session
pub struct RemoteStorage<R, W> {
    channel: Channel<R, W>,
}

impl<R: BufRead, W: Write> RemoteStorage<R, W> {
    pub fn new(channel: Channel<R, W>) -> Self {
        Self { channel }
    }

    /// Build a driver over a reader/writer pair, labeled from config
    pub fn from_config(reader: R, writer: W, config: &Config) -> Self {
        let channel = Channel::new(reader, writer, config.buffer_size).with_peer(Peer::new(
            config.remote_role.clone(),
            config.remote_host.clone(),
        ));
        Self::new(channel)
    }

    pub fn channel(&self) -> &Channel<R, W> {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut Channel<R, W> {
        &mut self.channel
    }

    pub fn into_channel(self) -> Channel<R, W> {
        self.channel
    }

    /// Send a command and unpack its response
    pub fn call(&mut self, command: &StorageCommand) -> Result<Value> {
        self.exchange(&command.to_command())
    }

    /// Round trip with no effect, useful to check the channel
    pub fn noop(&mut self) -> Result<()> {
        self.exchange(&Command::new(CommandKind::Noop.name(), vec![]))?;
        Ok(())
    }

    /// End the session
    pub fn close(mut self) -> Result<()> {
        self.exchange(&Command::new(CommandKind::Exit.name(), vec![]))?;
        Ok(())
    }

    fn exchange(&mut self, command: &Command) -> Result<Value> {
        tracing::debug!("Sending command {}", command.name);
        self.channel.write_command(command)?;
        let peer = self.channel.peer().clone();
        self.channel.read_response()?.into_value(&peer)
    }

    fn call_bool(&mut self, command: StorageCommand) -> Result<bool> {
        let name = command.kind().name();
        match self.call(&command)? {
            Value::Bool(b) => Ok(b),
            other => Err(unexpected(name, "a boolean", &other)),
        }
    }

    fn call_void(&mut self, command: StorageCommand) -> Result<()> {
        self.call(&command)?;
        Ok(())
    }
}

impl<R: BufRead, W: Write> Storage for RemoteStorage<R, W> {
    fn exists(&mut self, file: &str) -> Result<bool> {
        self.call_bool(StorageCommand::Exists {
            file: file.to_string(),
        })
    }

    fn list(
        &mut self,
        path: Option<&str>,
        error_on_missing: bool,
        expression: Option<&str>,
    ) -> Result<Option<Vec<String>>> {
        let command = StorageCommand::List {
            path: path.map(str::to_string),
            error_on_missing,
            expression: expression.map(str::to_string),
        };

        match self.call(&command)? {
            Value::Null => Ok(None),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(name) => Ok(name),
                    other => Err(unexpected("storageList", "a file name", &other)),
                })
                .collect::<Result<Vec<_>>>()
                .map(Some),
            other => Err(unexpected("storageList", "a list", &other)),
        }
    }

    fn path_exists(&mut self, path: Option<&str>) -> Result<bool> {
        self.call_bool(StorageCommand::PathExists {
            path: path.map(str::to_string),
        })
    }

    fn path_create(
        &mut self,
        path: &str,
        error_on_exists: bool,
        no_parent_create: bool,
        mode: Option<u32>,
    ) -> Result<()> {
        self.call_void(StorageCommand::PathCreate {
            path: path.to_string(),
            error_on_exists,
            no_parent_create,
            mode,
        })
    }

    fn path_remove(&mut self, path: &str, error_on_missing: bool, recurse: bool) -> Result<()> {
        self.call_void(StorageCommand::PathRemove {
            path: path.to_string(),
            error_on_missing,
            recurse,
        })
    }

    fn path_sync(&mut self, path: &str, ignore_missing: bool) -> Result<()> {
        self.call_void(StorageCommand::PathSync {
            path: path.to_string(),
            ignore_missing,
        })
    }

    fn remove(&mut self, file: &str, error_on_missing: bool) -> Result<()> {
        self.call_void(StorageCommand::Remove {
            file: file.to_string(),
            error_on_missing,
        })
    }

    fn open_read(
        &mut self,
        file: &str,
        ignore_missing: bool,
    ) -> Result<Option<Box<dyn Read + '_>>> {
        let found = self.call_bool(StorageCommand::OpenRead {
            file: file.to_string(),
            ignore_missing,
        })?;

        if !found {
            return Ok(None);
        }
        Ok(Some(Box::new(RemoteRead::new(&mut self.channel))))
    }

    fn open_write(
        &mut self,
        file: &str,
        options: WriteOptions,
    ) -> Result<Box<dyn StorageWrite + '_>> {
        self.call_void(StorageCommand::OpenWrite {
            file: file.to_string(),
            options: options.clone(),
        })?;

        Ok(Box::new(RemoteWrite::new(
            &mut self.channel,
            file.to_string(),
            options,
        )))
    }
}

fn unexpected(command: &str, expected: &str, found: &Value) -> RepoError {
    RepoError::Protocol(format!(
        "expected {} in response to {}, found '{}'",
        expected, command, found
    ))
}
