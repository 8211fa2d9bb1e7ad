//! Session
//!
//! Serves one channel: reads command lines, offers each to a chain of
//! handlers and answers with exactly one response. Storage faults become
//! error responses; protocol and transport failures end the session.

use std::io::{self, BufRead, Write};

use crate::error::{ErrorKind, RepoError, Result};
use crate::protocol::{Channel, Command, CommandKind, Response};

/// Outcome of offering a command to a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// The handler executed the command and wrote its response
    Done,

    /// The handler does not own this command name
    NotRecognized,
}

/// Something that serves commands on a channel
///
/// On `Ok(Handled::Done)` the handler has written the full response
/// (and any block stream). On `Err` of a non-fatal kind the session
/// writes the error response.
pub trait CommandHandler<R, W> {
    fn handle(&mut self, command: &Command, channel: &mut Channel<R, W>) -> Result<Handled>;
}

/// Whether the session keeps serving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Command loop over one channel
pub struct Session<R, W> {
    channel: Channel<R, W>,

    /// Tried in order until one recognizes the command
    handlers: Vec<Box<dyn CommandHandler<R, W>>>,

    /// Label for logging
    name: String,
}

impl<R: BufRead, W: Write> Session<R, W> {
    /// Create a session with no handlers
    pub fn new(channel: Channel<R, W>) -> Self {
        Self {
            channel,
            handlers: Vec::new(),
            name: "session".to_string(),
        }
    }

    /// Set the label used in log lines
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Append a handler to the chain
    pub fn with_handler(mut self, handler: impl CommandHandler<R, W> + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn channel(&self) -> &Channel<R, W> {
        &self.channel
    }

    pub fn into_channel(self) -> Channel<R, W> {
        self.channel
    }

    /// Serve until `exit` or the peer disconnects
    pub fn serve(&mut self) -> Result<()> {
        tracing::debug!("{}: serving", self.name);

        loop {
            match self.process() {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => {
                    tracing::debug!("{}: exit requested", self.name);
                    return Ok(());
                }
                Err(e) if is_disconnect(&e) => {
                    tracing::debug!("{}: peer disconnected", self.name);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("{}: session failed: {}", self.name, e);
                    // Tell the peer why if the channel still carries lines
                    if matches!(e, RepoError::Protocol(_)) {
                        let _ = self.channel.write_response(&Response::error(&e));
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Read and answer one command
    pub fn process(&mut self) -> Result<Flow> {
        let command = self.channel.read_command()?;
        tracing::debug!("{}: received command {}", self.name, command.name);

        match command.kind() {
            Some(CommandKind::Noop) => {
                self.channel.write_response(&Response::Void)?;
                return Ok(Flow::Continue);
            }
            Some(CommandKind::Exit) => {
                self.channel.write_response(&Response::Void)?;
                return Ok(Flow::Exit);
            }
            _ => {}
        }

        let mut outcome = Ok(Handled::NotRecognized);
        for handler in self.handlers.iter_mut() {
            outcome = handler.handle(&command, &mut self.channel);
            if !matches!(outcome, Ok(Handled::NotRecognized)) {
                break;
            }
        }

        match outcome {
            Ok(Handled::Done) => {}
            Ok(Handled::NotRecognized) => {
                tracing::warn!("{}: invalid command '{}'", self.name, command.name);
                let err = RepoError::fault(
                    ErrorKind::Protocol,
                    format!("invalid command '{}'", command.name),
                );
                self.channel.write_response(&Response::error(&err))?;
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!("{}: command {} failed: {}", self.name, command.name, e);
                self.channel.write_response(&Response::error(&e))?;
            }
        }

        Ok(Flow::Continue)
    }
}

/// Transport failures that mean the peer went away
fn is_disconnect(err: &RepoError) -> bool {
    match err {
        RepoError::Io(e) => matches!(
            e.kind(),
            io::ErrorKind::UnexpectedEof
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
        ),
        _ => false,
    }
}
