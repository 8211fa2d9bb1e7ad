//! Protocol Module
//!
//! Defines the wire protocol between a storage driver (client) and a
//! storage dispatcher (server).
//!
//! ## Protocol Format (line oriented)
//!
//! ### Exchange
//! ```text
//! client                                   server
//!   │ storageOpenRead ["test.txt",false]     │
//!   │ ─────────────────────────────────────▶ │
//!   │                           {"out":true} │
//!   │ ◀───────────────────────────────────── │
//!   │               BRBLOCK4\nTESTBRBLOCK0\n │
//!   │ ◀───────────────────────────────────── │
//! ```
//!
//! ### Commands
//! - storageExists      [file]
//! - storageList        [path?, errorOnMissing, expression?]
//! - storagePathExists  [path?]
//! - storagePathCreate  [path, errorOnExists, noParentCreate, mode]
//! - storagePathRemove  [path, errorOnMissing, recurse]
//! - storagePathSync    [path, ignoreMissing]
//! - storageRemove      [file, errorOnMissing]
//! - storageOpenRead    [file, ignoreMissing]
//! - storageOpenWrite   [file, modeFile, modePath, user?, group?,
//!                       timeModified, createPath, syncFile, syncPath, atomic]
//! - noop / exit        []
//!
//! ### Block Frame
//! ```text
//! ┌────────────────────────┬─────────────────────────────┐
//! │ BRBLOCK<len>\n         │  len raw bytes              │
//! └────────────────────────┴─────────────────────────────┘
//! ```
//! - len 0:  end of stream
//! - len -1: stream abandoned by the producer

mod block;
mod channel;
mod codec;
mod command;
mod response;

pub use block::{
    parse_block_size, write_block, write_terminator, BlockHeader, BLOCK_MARKER, MAX_BLOCK_SIZE,
};
pub use channel::{Channel, Peer};
pub use codec::{
    decode_command, decode_response, encode_command, encode_response, is_response_line,
    MAX_LINE_SIZE,
};
pub use command::{Command, CommandKind, Param, StorageCommand};
pub use response::Response;
