//! Storage Module
//!
//! The storage interface shared by local and remote repositories.
//!
//! ## Responsibilities
//! - Existence checks and directory listings
//! - Path create/remove/sync
//! - File removal
//! - Streaming reads (`Read`) and writes (`StorageWrite`)
//!
//! ## Implementations
//! ```text
//! ┌──────────────────┐        ┌──────────────────────────────┐
//! │  PosixStorage    │        │  RemoteStorage               │
//! │  (local files)   │        │  (commands over a Channel)   │
//! └──────────────────┘        └──────────────────────────────┘
//! ```
//!
//! Methods take `&mut self`: streams returned by `open_read`/`open_write`
//! borrow the storage, so a remote channel can never interleave a second
//! command with an unfinished block stream.

mod posix;

use std::io::{Read, Write};

use crate::error::Result;

pub use posix::{PosixRead, PosixStorage, PosixWrite, TEMP_EXTENSION};

/// Options fixed when a file is opened for write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// File mode (`None` = storage default)
    pub mode_file: Option<u32>,

    /// Mode for created parent paths (`None` = storage default)
    pub mode_path: Option<u32>,

    /// Owner name to apply
    pub user: Option<String>,

    /// Group name to apply
    pub group: Option<String>,

    /// Modification time (unix seconds) to apply on close
    pub time_modified: Option<i64>,

    /// Create missing parent paths
    pub create_path: bool,

    /// fsync the file on close
    pub sync_file: bool,

    /// fsync the parent path on close
    pub sync_path: bool,

    /// Write to a temp file and rename on close
    pub atomic: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            mode_file: None,
            mode_path: None,
            user: None,
            group: None,
            time_modified: None,
            create_path: true,
            sync_file: true,
            sync_path: true,
            atomic: true,
        }
    }
}

/// A file open for write
///
/// Dropping without `close()` abandons the write: an atomic write leaves
/// its temp file behind and the destination untouched.
pub trait StorageWrite: Write {
    /// Name the file was opened with
    fn name(&self) -> &str;

    fn options(&self) -> &WriteOptions;

    /// Finish the write. Closing an already closed file is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// Repository storage operations
pub trait Storage {
    /// Does the file exist
    fn exists(&mut self, file: &str) -> Result<bool>;

    /// Names of entries in `path`, filtered by a regex
    ///
    /// A missing path yields `Ok(None)` unless `error_on_missing`.
    /// Order is unspecified.
    fn list(
        &mut self,
        path: Option<&str>,
        error_on_missing: bool,
        expression: Option<&str>,
    ) -> Result<Option<Vec<String>>>;

    /// Does the path exist (`None` = base path)
    fn path_exists(&mut self, path: Option<&str>) -> Result<bool>;

    /// Create a path
    fn path_create(
        &mut self,
        path: &str,
        error_on_exists: bool,
        no_parent_create: bool,
        mode: Option<u32>,
    ) -> Result<()>;

    /// Remove a path, with its contents when `recurse`
    fn path_remove(&mut self, path: &str, error_on_missing: bool, recurse: bool) -> Result<()>;

    /// fsync a path
    fn path_sync(&mut self, path: &str, ignore_missing: bool) -> Result<()>;

    /// Remove a file
    fn remove(&mut self, file: &str, error_on_missing: bool) -> Result<()>;

    /// Open a file for read; `Ok(None)` when missing and `ignore_missing`
    fn open_read(&mut self, file: &str, ignore_missing: bool)
        -> Result<Option<Box<dyn Read + '_>>>;

    /// Open a file for write
    fn open_write(
        &mut self,
        file: &str,
        options: WriteOptions,
    ) -> Result<Box<dyn StorageWrite + '_>>;

    /// Read a whole file
    fn get(&mut self, file: &str) -> Result<Vec<u8>> {
        let mut content = Vec::new();
        if let Some(mut read) = self.open_read(file, false)? {
            read.read_to_end(&mut content)?;
        }
        Ok(content)
    }

    /// Write a whole file
    fn put(&mut self, file: &str, options: WriteOptions, content: &[u8]) -> Result<()> {
        let mut write = self.open_write(file, options)?;
        write.write_all(content)?;
        write.close()
    }
}
