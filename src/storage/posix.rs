//! POSIX Storage
//!
//! Local filesystem implementation of `Storage`, rooted at a base path.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions, Permissions};
use std::io::{self, Read, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};

use filetime::FileTime;
use nix::unistd::{Gid, Group, Uid, User};
use regex::Regex;

use crate::config::{Config, DEFAULT_MODE_FILE, DEFAULT_MODE_PATH};
use crate::error::{ErrorKind, RepoError, Result};

use super::{Storage, StorageWrite, WriteOptions};

/// Suffix appended to the destination name during an atomic write
pub const TEMP_EXTENSION: &str = "repolink.tmp";

/// Storage over the local filesystem
///
/// Relative paths resolve against `base`; absolute paths must lie inside it.
#[derive(Debug, Clone)]
pub struct PosixStorage {
    base: PathBuf,
    mode_file: u32,
    mode_path: u32,
}

impl PosixStorage {
    /// Create storage rooted at `base` with default modes
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            mode_file: DEFAULT_MODE_FILE,
            mode_path: DEFAULT_MODE_PATH,
        }
    }

    /// Create storage from the repository settings in `config`
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.repo_path).with_modes(config.mode_file, config.mode_path)
    }

    /// Override the default file/path modes
    pub fn with_modes(mut self, mode_file: u32, mode_path: u32) -> Self {
        self.mode_file = mode_file;
        self.mode_path = mode_path;
        self
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Resolve a storage path to a filesystem path
    ///
    /// `.` and `..` are folded lexically; the result must stay inside the
    /// base path whether the input was relative or absolute.
    pub fn resolve(&self, path: Option<&str>) -> Result<PathBuf> {
        let path = match path {
            None => return Ok(self.base.clone()),
            Some(path) => path,
        };

        let joined = if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            self.base.join(path)
        };
        let resolved = normalize(&joined);

        if !resolved.starts_with(normalize(&self.base)) {
            let label = if Path::new(path).is_absolute() {
                "absolute path"
            } else {
                "path"
            };
            return Err(RepoError::fault(
                ErrorKind::Assert,
                format!(
                    "{} '{}' is not in base path '{}'",
                    label,
                    path,
                    self.base.display()
                ),
            ));
        }

        Ok(resolved)
    }
}

/// Fold `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // ".." above the root is the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

impl Storage for PosixStorage {
    fn exists(&mut self, file: &str) -> Result<bool> {
        let path = self.resolve(Some(file))?;

        match fs::metadata(&path) {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RepoError::path(ErrorKind::FileInfo, "get info for", &path, &e)),
        }
    }

    fn list(
        &mut self,
        path: Option<&str>,
        error_on_missing: bool,
        expression: Option<&str>,
    ) -> Result<Option<Vec<String>>> {
        let path = self.resolve(path)?;

        let filter = expression
            .map(Regex::new)
            .transpose()
            .map_err(|e| RepoError::fault(ErrorKind::Format, format!("invalid expression: {}", e)))?;

        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if error_on_missing {
                    return Err(RepoError::path(
                        ErrorKind::PathMissing,
                        "list files for missing path",
                        &path,
                        &e,
                    ));
                }
                return Ok(None);
            }
            Err(e) => return Err(open_path_error(&path, &e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| open_path_error(&path, &e))?;
            let name = entry.file_name().to_string_lossy().into_owned();

            if filter.as_ref().map_or(true, |re| re.is_match(&name)) {
                names.push(name);
            }
        }

        Ok(Some(names))
    }

    fn path_exists(&mut self, path: Option<&str>) -> Result<bool> {
        let path = self.resolve(path)?;

        match fs::metadata(&path) {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RepoError::path(ErrorKind::PathOpen, "get info for", &path, &e)),
        }
    }

    fn path_create(
        &mut self,
        path: &str,
        error_on_exists: bool,
        no_parent_create: bool,
        mode: Option<u32>,
    ) -> Result<()> {
        let path = self.resolve(Some(path))?;
        create_path(
            &path,
            error_on_exists,
            no_parent_create,
            mode.unwrap_or(self.mode_path),
        )
    }

    fn path_remove(&mut self, path: &str, error_on_missing: bool, recurse: bool) -> Result<()> {
        let path = self.resolve(Some(path))?;
        remove_path(&path, error_on_missing, recurse)
    }

    fn path_sync(&mut self, path: &str, ignore_missing: bool) -> Result<()> {
        let path = self.resolve(Some(path))?;
        sync_path(&path, ignore_missing)
    }

    fn remove(&mut self, file: &str, error_on_missing: bool) -> Result<()> {
        let path = self.resolve(Some(file))?;

        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound && !error_on_missing => Ok(()),
            Err(e) => Err(RepoError::path(ErrorKind::FileRemove, "remove", &path, &e)),
        }
    }

    fn open_read(
        &mut self,
        file: &str,
        ignore_missing: bool,
    ) -> Result<Option<Box<dyn Read + '_>>> {
        let path = self.resolve(Some(file))?;

        match File::open(&path) {
            Ok(file) => Ok(Some(Box::new(PosixRead { path, file }))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if ignore_missing {
                    return Ok(None);
                }
                Err(open_read_error(ErrorKind::FileMissing, &path, &e))
            }
            Err(e) => Err(open_read_error(ErrorKind::FileOpen, &path, &e)),
        }
    }

    fn open_write(
        &mut self,
        file: &str,
        options: WriteOptions,
    ) -> Result<Box<dyn StorageWrite + '_>> {
        let path = self.resolve(Some(file))?;
        let write = PosixWrite::open(
            file,
            path,
            options,
            self.mode_file,
            self.mode_path,
        )?;
        Ok(Box::new(write))
    }
}

// =============================================================================
// Read
// =============================================================================

/// A local file open for read
pub struct PosixRead {
    path: PathBuf,
    file: File,
}

impl Read for PosixRead {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::Interrupted {
                return e;
            }
            RepoError::path(ErrorKind::FileRead, "read", &self.path, &e).into()
        })
    }
}

// =============================================================================
// Write
// =============================================================================

/// A local file open for write
pub struct PosixWrite {
    name: String,
    options: WriteOptions,

    /// Final destination
    path: PathBuf,

    /// Where bytes are written; differs from `path` for atomic writes
    path_tmp: PathBuf,

    /// `None` once closed
    file: Option<File>,
}

impl PosixWrite {
    fn open(
        name: &str,
        path: PathBuf,
        options: WriteOptions,
        default_mode_file: u32,
        default_mode_path: u32,
    ) -> Result<Self> {
        let mode_file = options.mode_file.unwrap_or(default_mode_file);
        let mode_path = options.mode_path.unwrap_or(default_mode_path);

        let path_tmp = if options.atomic {
            temp_path(&path)
        } else {
            path.clone()
        };

        let file = match open_for_write(&path_tmp, mode_file) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound && options.create_path => {
                if let Some(parent) = path_tmp.parent() {
                    create_path(parent, false, false, mode_path)?;
                }
                open_for_write(&path_tmp, mode_file)
                    .map_err(|e| open_write_error(&path_tmp, &e))?
            }
            Err(e) => return Err(open_write_error(&path_tmp, &e)),
        };

        // open() honors umask; apply the requested mode exactly
        file.set_permissions(Permissions::from_mode(mode_file))
            .map_err(|e| open_write_error(&path_tmp, &e))?;

        if options.user.is_some() || options.group.is_some() {
            set_owner(&path_tmp, options.user.as_deref(), options.group.as_deref())?;
        }

        tracing::trace!("Opened '{}' for write", path_tmp.display());

        Ok(Self {
            name: name.to_string(),
            options,
            path,
            path_tmp,
            file: Some(file),
        })
    }
}

impl Write for PosixWrite {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let path_tmp = &self.path_tmp;
        match self.file.as_mut() {
            Some(file) => file
                .write(buf)
                .map_err(|e| RepoError::path(ErrorKind::FileWrite, "write", path_tmp, &e).into()),
            None => Err(closed_error(path_tmp)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl StorageWrite for PosixWrite {
    fn name(&self) -> &str {
        &self.name
    }

    fn options(&self) -> &WriteOptions {
        &self.options
    }

    fn close(&mut self) -> Result<()> {
        let file = match self.file.take() {
            Some(file) => file,
            None => return Ok(()),
        };

        if let Some(time) = self.options.time_modified {
            let time = FileTime::from_unix_time(time, 0);
            filetime::set_file_handle_times(&file, Some(time), Some(time))
                .map_err(|e| RepoError::path(ErrorKind::FileInfo, "set time for", &self.path_tmp, &e))?;
        }

        if self.options.sync_file {
            file.sync_all()
                .map_err(|e| RepoError::path(ErrorKind::FileSync, "sync", &self.path_tmp, &e))?;
        }

        drop(file);

        if self.options.atomic {
            fs::rename(&self.path_tmp, &self.path).map_err(|e| {
                RepoError::os(
                    ErrorKind::FileMove,
                    format!(
                        "unable to move '{}' to '{}'",
                        self.path_tmp.display(),
                        self.path.display()
                    ),
                    &e,
                )
            })?;
        }

        if self.options.sync_path {
            if let Some(parent) = self.path.parent() {
                sync_path(parent, false)?;
            }
        }

        tracing::trace!("Closed '{}'", self.path.display());
        Ok(())
    }
}

impl Drop for PosixWrite {
    fn drop(&mut self) {
        if self.file.is_some() {
            tracing::debug!(
                "Write to '{}' abandoned before close",
                self.path_tmp.display()
            );
        }
    }
}

// =============================================================================
// Private Helpers
// =============================================================================

/// "file.txt" → "file.txt.repolink.tmp"
fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(TEMP_EXTENSION);
    PathBuf::from(name)
}

fn closed_error(path: &Path) -> io::Error {
    RepoError::fault(
        ErrorKind::Assert,
        format!("'{}' is already closed", path.display()),
    )
    .into()
}

fn open_for_write(path: &Path, mode: u32) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
}

fn open_read_error(kind: ErrorKind, path: &Path, err: &io::Error) -> RepoError {
    RepoError::os(kind, format!("unable to open '{}' for read", path.display()), err)
}

fn open_write_error(path: &Path, err: &io::Error) -> RepoError {
    RepoError::os(
        ErrorKind::FileOpen,
        format!("unable to open '{}' for write", path.display()),
        err,
    )
}

fn open_path_error(path: &Path, err: &io::Error) -> RepoError {
    RepoError::os(
        ErrorKind::PathOpen,
        format!("unable to open path '{}' for read", path.display()),
        err,
    )
}

/// mkdir with optional parent creation; the mode is applied exactly
fn create_path(path: &Path, error_on_exists: bool, no_parent_create: bool, mode: u32) -> Result<()> {
    match fs::DirBuilder::new().mode(mode).create(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            if error_on_exists {
                return Err(RepoError::path(ErrorKind::PathCreate, "create path", path, &e));
            }
            return Ok(());
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound && !no_parent_create => {
            if let Some(parent) = path.parent() {
                create_path(parent, false, false, mode)?;
            }
            return create_path(path, error_on_exists, true, mode);
        }
        Err(e) => return Err(RepoError::path(ErrorKind::PathCreate, "create path", path, &e)),
    }

    fs::set_permissions(path, Permissions::from_mode(mode))
        .map_err(|e| RepoError::path(ErrorKind::PathCreate, "set mode for path", path, &e))
}

fn remove_path(path: &Path, error_on_missing: bool, recurse: bool) -> Result<()> {
    if recurse {
        match fs::read_dir(path) {
            Ok(entries) => {
                for entry in entries {
                    let entry = entry.map_err(|e| open_path_error(path, &e))?;
                    let child = entry.path();
                    let is_dir = entry
                        .file_type()
                        .map_err(|e| RepoError::path(ErrorKind::FileInfo, "get info for", &child, &e))?
                        .is_dir();

                    if is_dir {
                        remove_path(&child, false, true)?;
                    } else {
                        match fs::remove_file(&child) {
                            Ok(()) => {}
                            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                            Err(e) => {
                                return Err(RepoError::path(ErrorKind::FileRemove, "remove", &child, &e))
                            }
                        }
                    }
                }
            }
            // reported by remove_dir below
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(open_path_error(path, &e)),
        }
    }

    match fs::remove_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound && !error_on_missing => Ok(()),
        Err(e) => Err(RepoError::path(ErrorKind::PathRemove, "remove path", path, &e)),
    }
}

fn sync_path(path: &Path, ignore_missing: bool) -> Result<()> {
    let dir = match File::open(path) {
        Ok(dir) => dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if ignore_missing {
                return Ok(());
            }
            return Err(RepoError::os(
                ErrorKind::PathMissing,
                format!("unable to open '{}' for sync", path.display()),
                &e,
            ));
        }
        Err(e) => {
            return Err(RepoError::os(
                ErrorKind::PathOpen,
                format!("unable to open '{}' for sync", path.display()),
                &e,
            ))
        }
    };

    dir.sync_all()
        .map_err(|e| RepoError::path(ErrorKind::PathSync, "sync path", path, &e))
}

fn set_owner(path: &Path, user: Option<&str>, group: Option<&str>) -> Result<()> {
    let owner_error = |err: nix::errno::Errno| {
        RepoError::os(
            ErrorKind::FileOwner,
            format!("unable to set ownership for '{}'", path.display()),
            &io::Error::from(err),
        )
    };

    let uid: Option<Uid> = match user {
        Some(name) => Some(
            User::from_name(name)
                .map_err(owner_error)?
                .ok_or_else(|| {
                    RepoError::fault(ErrorKind::FileOwner, format!("unable to find user '{}'", name))
                })?
                .uid,
        ),
        None => None,
    };

    let gid: Option<Gid> = match group {
        Some(name) => Some(
            Group::from_name(name)
                .map_err(owner_error)?
                .ok_or_else(|| {
                    RepoError::fault(ErrorKind::FileOwner, format!("unable to find group '{}'", name))
                })?
                .gid,
        ),
        None => None,
    };

    nix::unistd::chown(path, uid, gid).map_err(owner_error)
}
