//! Error types for repolink
//!
//! Provides a unified error type for all operations, plus the
//! classification (`ErrorKind`) that travels across the wire so a fault
//! raised on the remote host is re-raised locally with the same kind.

use std::fmt;
use std::io;
use std::path::Path;

use thiserror::Error;

/// Result type alias using RepoError
pub type Result<T> = std::result::Result<T, RepoError>;

/// Fault classification with stable wire codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Assert,
    Format,
    Io,
    Protocol,
    FileMissing,
    FileOpen,
    FileRead,
    FileWrite,
    FileSync,
    FileRemove,
    FileMove,
    FileOwner,
    FileInfo,
    PathMissing,
    PathCreate,
    PathOpen,
    PathRemove,
    PathSync,
}

impl ErrorKind {
    /// Numeric code sent in error responses
    pub fn code(self) -> u32 {
        match self {
            ErrorKind::Assert => 25,
            ErrorKind::Format => 29,
            ErrorKind::Io => 39,
            ErrorKind::Protocol => 41,
            ErrorKind::FileMissing => 55,
            ErrorKind::FileOpen => 56,
            ErrorKind::FileRead => 57,
            ErrorKind::FileWrite => 58,
            ErrorKind::FileSync => 59,
            ErrorKind::FileRemove => 60,
            ErrorKind::FileMove => 61,
            ErrorKind::FileOwner => 62,
            ErrorKind::FileInfo => 63,
            ErrorKind::PathMissing => 73,
            ErrorKind::PathCreate => 74,
            ErrorKind::PathOpen => 75,
            ErrorKind::PathRemove => 76,
            ErrorKind::PathSync => 77,
        }
    }

    /// Map a wire code back to a kind. Unknown codes become `Io`.
    pub fn from_code(code: u32) -> Self {
        match code {
            25 => ErrorKind::Assert,
            29 => ErrorKind::Format,
            41 => ErrorKind::Protocol,
            55 => ErrorKind::FileMissing,
            56 => ErrorKind::FileOpen,
            57 => ErrorKind::FileRead,
            58 => ErrorKind::FileWrite,
            59 => ErrorKind::FileSync,
            60 => ErrorKind::FileRemove,
            61 => ErrorKind::FileMove,
            62 => ErrorKind::FileOwner,
            63 => ErrorKind::FileInfo,
            73 => ErrorKind::PathMissing,
            74 => ErrorKind::PathCreate,
            75 => ErrorKind::PathOpen,
            76 => ErrorKind::PathRemove,
            77 => ErrorKind::PathSync,
            _ => ErrorKind::Io,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}Error", self)
    }
}

/// Unified error type for repolink operations
#[derive(Debug, Error)]
pub enum RepoError {
    // -------------------------------------------------------------------------
    // Transport Errors
    // -------------------------------------------------------------------------
    /// The channel itself failed (EOF, reset, broken pipe, timeout)
    #[error("IO error: {0}")]
    Io(io::Error),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    /// Malformed line or frame; the channel is out of sync and unusable
    #[error("{0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    /// A classified fault raised on this host
    #[error("{message}")]
    Fault { kind: ErrorKind, message: String },

    /// A fault raised by the peer and re-raised here
    #[error("raised from {role} protocol on '{host}': {message}")]
    Remote {
        kind: ErrorKind,
        role: String,
        host: String,
        message: String,
    },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RepoError {
    /// Create a classified fault
    pub fn fault(kind: ErrorKind, message: impl Into<String>) -> Self {
        RepoError::Fault {
            kind,
            message: message.into(),
        }
    }

    /// Create a classified fault from an OS error
    ///
    /// Renders as `<context>: [<errno>] <description>` when the OS code is
    /// known, so the message reads the same on every host.
    pub fn os(kind: ErrorKind, context: impl fmt::Display, err: &io::Error) -> Self {
        let message = match err.raw_os_error() {
            Some(code) => format!(
                "{}: [{}] {}",
                context,
                code,
                nix::errno::Errno::from_raw(code).desc()
            ),
            None => format!("{}: {}", context, err),
        };
        RepoError::Fault { kind, message }
    }

    /// Shorthand for faults about a path: `unable to <action> '<path>'`
    pub fn path(kind: ErrorKind, action: &str, path: &Path, err: &io::Error) -> Self {
        Self::os(kind, format!("unable to {} '{}'", action, path.display()), err)
    }

    /// Classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepoError::Io(_) => ErrorKind::Io,
            RepoError::Protocol(_) => ErrorKind::Protocol,
            RepoError::Fault { kind, .. } | RepoError::Remote { kind, .. } => *kind,
            RepoError::Config(_) => ErrorKind::Assert,
        }
    }

    /// True when the channel cannot carry further commands after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, RepoError::Io(_) | RepoError::Protocol(_))
    }

    /// True when the underlying transport hit end-of-stream
    pub fn is_eof(&self) -> bool {
        matches!(self, RepoError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

impl From<io::Error> for RepoError {
    /// Unwraps a `RepoError` that was tunnelled through an `io::Error` by a
    /// `Read`/`Write` adapter, otherwise treats it as a transport failure.
    fn from(err: io::Error) -> Self {
        match err.downcast::<RepoError>() {
            Ok(inner) => inner,
            Err(err) => RepoError::Io(err),
        }
    }
}

impl From<RepoError> for io::Error {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Io(e) => e,
            other => io::Error::other(other),
        }
    }
}
