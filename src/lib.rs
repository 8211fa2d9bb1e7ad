//! # repolink
//!
//! Remote repository storage for backup tools:
//! - Line-based command protocol with JSON parameters and responses
//! - Block streaming for file content in both directions
//! - Server-side dispatcher over a local POSIX repository
//! - Client-side driver implementing the same `Storage` interface
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Caller (backup/restore logic)                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  Storage trait
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                 RemoteStorage (driver)                       │
//! │          RemoteRead / RemoteWrite block streams              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  Channel: stdio of a spawned remote, or TCP
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                 Session (command loop)                       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!                       ▼
//!               ┌───────────────────┐      ┌─────────────────┐
//!               │ StorageDispatcher │ ───► │  PosixStorage   │
//!               └───────────────────┘      └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod storage;
pub mod remote;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ErrorKind, RepoError, Result};
pub use config::Config;
pub use storage::{PosixStorage, Storage, StorageWrite, WriteOptions};
pub use remote::{RemoteStorage, StorageDispatcher};
pub use network::{Server, Session};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of repolink
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
