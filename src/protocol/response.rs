//! Response definitions
//!
//! Exactly one response line answers each command.

use serde_json::Value;

use crate::error::{ErrorKind, RepoError, Result};

use super::Peer;

/// A response to a command
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Success with no value (`{}`)
    Void,

    /// Success with a value (`{"out":...}`)
    Out(Value),

    /// Failure (`{"err":<code>,"out":"<message>"}`)
    Error { code: u32, message: String },
}

impl Response {
    /// Create a value response
    pub fn out(value: impl Into<Value>) -> Self {
        Response::Out(value.into())
    }

    /// Create an error response carrying the error's classification
    ///
    /// Faults re-raised from a further peer keep their full
    /// `raised from ...` text so multi-hop failures stay attributable.
    pub fn error(err: &RepoError) -> Self {
        Response::Error {
            code: err.kind().code(),
            message: err.to_string(),
        }
    }

    /// Unpack into the success value, re-raising an error from `peer`
    ///
    /// `Void` yields `Value::Null`.
    pub fn into_value(self, peer: &Peer) -> Result<Value> {
        match self {
            Response::Void => Ok(Value::Null),
            Response::Out(value) => Ok(value),
            Response::Error { code, message } => Err(peer.raise(code, message)),
        }
    }
}

impl Peer {
    /// Build the local error for a fault the peer reported
    pub fn raise(&self, code: u32, message: String) -> RepoError {
        RepoError::Remote {
            kind: ErrorKind::from_code(code),
            role: self.role.clone(),
            host: self.host.clone(),
            message,
        }
    }
}
