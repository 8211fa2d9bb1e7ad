//! TCP Server
//!
//! Accepts connections and serves each one as an independent session on
//! its own thread, with its own storage and dispatcher.

use std::io::{self, BufReader, BufWriter};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::error::{RepoError, Result};
use crate::protocol::{Channel, Peer};
use crate::remote::StorageDispatcher;
use crate::storage::PosixStorage;

use super::Session;

/// How long the accept loop sleeps between shutdown checks
const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// TCP server for repolink
pub struct Server {
    config: Config,
    listener: Option<TcpListener>,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    /// Create a new server with the given config
    pub fn new(config: Config) -> Self {
        Self {
            config,
            listener: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bind the listen address, returning the bound address
    pub fn bind(&mut self) -> Result<SocketAddr> {
        let listener = TcpListener::bind(&self.config.listen_addr)?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        tracing::info!("Listening on {}", addr);
        self.listener = Some(listener);
        Ok(addr)
    }

    /// Start the server (blocking until shutdown)
    pub fn run(&mut self) -> Result<()> {
        if self.listener.is_none() {
            self.bind()?;
        }
        let listener = self
            .listener
            .take()
            .ok_or_else(|| RepoError::Config("listener not bound".to_string()))?;

        while !self.shutdown.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, addr)) => {
                    let config = self.config.clone();
                    thread::spawn(move || {
                        if let Err(e) = serve_connection(stream, addr, config) {
                            tracing::warn!("Session with {} ended with error: {}", addr, e);
                        }
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }

        tracing::info!("Server stopped accepting connections");
        Ok(())
    }

    /// Handle that stops the accept loop when set
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

/// Serve one accepted connection until the client exits or disconnects
fn serve_connection(stream: TcpStream, addr: SocketAddr, config: Config) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;

    let reader = BufReader::new(stream.try_clone()?);
    let writer = BufWriter::new(stream);

    let channel = Channel::new(reader, writer, config.buffer_size)
        .with_peer(Peer::new("client", addr.to_string()));

    let mut session = Session::new(channel)
        .named(addr.to_string())
        .with_handler(StorageDispatcher::new(PosixStorage::from_config(&config)));

    session.serve()
}
