//! Block stream codec
//!
//! Bulk file content travels as a sequence of length-prefixed blocks:
//!
//! ```text
//! BRBLOCK<len>\n<len raw bytes>BRBLOCK<len>\n<len raw bytes>...BRBLOCK0\n
//! ```
//!
//! A length of `0` ends the stream normally. A length of `-1` means the
//! producer abandoned the transfer: the receiver stops reading without
//! raising, and whatever arrived before is not a complete transfer.

use std::io::Write;

use crate::error::{RepoError, Result};

/// Literal prefix of every block header line
pub const BLOCK_MARKER: &str = "BRBLOCK";

/// Largest block a receiver accepts (16 MB)
pub const MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024;

/// A decoded block header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockHeader {
    /// `len` raw bytes follow
    Data(usize),

    /// Normal end of stream (`0`)
    End,

    /// Producer abandoned the stream (`-1`)
    Abort,
}

impl BlockHeader {
    /// True for either terminator
    pub fn is_terminator(&self) -> bool {
        !matches!(self, BlockHeader::Data(_))
    }
}

/// Write one data block
///
/// Empty payloads are skipped: a zero-length block would read as the
/// end-of-stream terminator.
pub fn write_block<W: Write>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.is_empty() {
        return Ok(());
    }

    writeln!(writer, "{}{}", BLOCK_MARKER, payload.len())?;
    writer.write_all(payload)?;

    tracing::trace!("Wrote block of {} bytes", payload.len());
    Ok(())
}

/// Write the stream terminator: `0` when `ok`, `-1` when abandoning
pub fn write_terminator<W: Write>(writer: &mut W, ok: bool) -> Result<()> {
    writeln!(writer, "{}{}", BLOCK_MARKER, if ok { 0 } else { -1 })?;
    Ok(())
}

/// Parse a block header line (without its trailing newline)
pub fn parse_block_size(line: &str) -> Result<BlockHeader> {
    let invalid = || RepoError::Protocol(format!("'{}' is not a valid block size message", line));

    let token = line.strip_prefix(BLOCK_MARKER).ok_or_else(invalid)?;

    // Canonical decimal only: no '+', no leading zeros, '-' only in "-1"
    let canonical = token == "0"
        || token == "-1"
        || (token.starts_with(|c: char| ('1'..='9').contains(&c))
            && token.bytes().all(|b| b.is_ascii_digit()));
    if !canonical {
        return Err(invalid());
    }

    let size: i64 = token.parse().map_err(|_| invalid())?;

    match size {
        0 => Ok(BlockHeader::End),
        -1 => Ok(BlockHeader::Abort),
        n if n > 0 => {
            let n = n as usize;
            if n > MAX_BLOCK_SIZE {
                return Err(RepoError::Protocol(format!(
                    "block size {} exceeds maximum {}",
                    n, MAX_BLOCK_SIZE
                )));
            }
            Ok(BlockHeader::Data(n))
        }
        _ => Err(invalid()),
    }
}
