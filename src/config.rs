//! Configuration for repolink
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{RepoError, Result};
use crate::protocol::MAX_BLOCK_SIZE;

/// Default negotiated buffer size (64 KiB)
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default mode for files created in the repository
pub const DEFAULT_MODE_FILE: u32 = 0o640;

/// Default mode for paths created in the repository
pub const DEFAULT_MODE_PATH: u32 = 0o750;

/// Main configuration for a repolink endpoint
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Repository base path; relative storage paths resolve against it
    pub repo_path: PathBuf,

    /// Mode applied to new files when the caller does not override it
    pub mode_file: u32,

    /// Mode applied to new paths when the caller does not override it
    pub mode_path: u32,

    // -------------------------------------------------------------------------
    // Protocol Configuration
    // -------------------------------------------------------------------------
    /// Maximum bytes per block written to the channel
    pub buffer_size: usize,

    /// Role label of the peer, used in re-raised error messages
    pub remote_role: String,

    /// Host label of the peer, used in re-raised error messages
    pub remote_host: String,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address for the remote server
    pub listen_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo_path: PathBuf::from("./repo"),
            mode_file: DEFAULT_MODE_FILE,
            mode_path: DEFAULT_MODE_PATH,
            buffer_size: DEFAULT_BUFFER_SIZE,
            remote_role: "remote".to_string(),
            remote_host: "localhost".to_string(),
            listen_addr: "127.0.0.1:7480".to_string(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the protocol cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 || self.buffer_size > MAX_BLOCK_SIZE {
            return Err(RepoError::Config(format!(
                "buffer size must be between 1 and {} bytes, got {}",
                MAX_BLOCK_SIZE, self.buffer_size
            )));
        }
        if self.mode_file > 0o7777 || self.mode_path > 0o7777 {
            return Err(RepoError::Config(format!(
                "invalid mode {:o}/{:o}",
                self.mode_file, self.mode_path
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the repository base path
    pub fn repo_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.repo_path = path.into();
        self
    }

    /// Set the default file mode
    pub fn mode_file(mut self, mode: u32) -> Self {
        self.config.mode_file = mode;
        self
    }

    /// Set the default path mode
    pub fn mode_path(mut self, mode: u32) -> Self {
        self.config.mode_path = mode;
        self
    }

    /// Set the buffer size (in bytes)
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    /// Set the peer's role label
    pub fn remote_role(mut self, role: impl Into<String>) -> Self {
        self.config.remote_role = role.into();
        self
    }

    /// Set the peer's host label
    pub fn remote_host(mut self, host: impl Into<String>) -> Self {
        self.config.remote_host = host.into();
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
