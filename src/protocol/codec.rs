//! Protocol codec
//!
//! Encoding and decoding functions for command and response lines.
//!
//! ## Wire Format
//!
//! ### Command Line
//! ```text
//! <name> <json array of params>\n
//! storageOpenRead ["test.txt",false]
//! ```
//!
//! ### Response Line
//! ```text
//! {}                                   void success
//! {"out":true}                         value success
//! {"err":55,"out":"unable to ..."}     error
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RepoError, Result};

use super::{Command, Param, Response};

/// Maximum length of a command or response line (1 MB)
pub const MAX_LINE_SIZE: usize = 1024 * 1024;

/// JSON shape of a response line
#[derive(Debug, Serialize, Deserialize)]
struct ResponseLine {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    err: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    out: Option<Value>,
}

// =============================================================================
// Command Encoding/Decoding
// =============================================================================

/// Encode a command as a line (without the trailing newline)
pub fn encode_command(command: &Command) -> String {
    let params = Value::Array(command.params.iter().map(Param::to_json).collect());
    format!("{} {}", command.name, params)
}

/// Decode a command line
pub fn decode_command(line: &str) -> Result<Command> {
    let (name, params) = line
        .split_once(' ')
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| RepoError::Protocol(format!("'{}' is not a valid command", line)))?;

    let values: Vec<Value> = serde_json::from_str(params).map_err(|e| {
        RepoError::Protocol(format!("invalid parameters for command '{}': {}", name, e))
    })?;

    let params = values
        .into_iter()
        .map(Param::from_json)
        .collect::<Result<Vec<_>>>()?;

    Ok(Command::new(name, params))
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response as a line (without the trailing newline)
pub fn encode_response(response: &Response) -> String {
    let line = match response {
        Response::Void => ResponseLine {
            err: None,
            out: None,
        },
        Response::Out(value) => ResponseLine {
            err: None,
            out: Some(value.clone()),
        },
        Response::Error { code, message } => ResponseLine {
            err: Some(*code),
            out: Some(Value::String(message.clone())),
        },
    };

    // A struct of an integer and a JSON value always serializes
    serde_json::to_string(&line).unwrap_or_else(|_| "{}".to_string())
}

/// Decode a response line
///
/// `{"out":null}` decodes the same as `{}`.
pub fn decode_response(line: &str) -> Result<Response> {
    let invalid = || RepoError::Protocol(format!("'{}' is not a valid response", line));

    if !is_response_line(line) {
        return Err(invalid());
    }

    let parsed: ResponseLine = serde_json::from_str(line).map_err(|_| invalid())?;

    Ok(match (parsed.err, parsed.out) {
        (Some(code), out) => Response::Error {
            code,
            message: match out {
                Some(Value::String(message)) => message,
                Some(other) => other.to_string(),
                None => String::new(),
            },
        },
        (None, Some(value)) => Response::Out(value),
        (None, None) => Response::Void,
    })
}

/// Response lines are JSON objects; block headers and commands never start with `{`
pub fn is_response_line(line: &str) -> bool {
    line.starts_with('{')
}
