//! Command definitions
//!
//! A command is a name plus an ordered list of nullable scalar parameters.
//! `StorageCommand` is the typed view: each kind has a fixed arity and a
//! fixed type per position, checked when a raw `Command` is decoded.

use serde_json::Value;

use crate::error::{ErrorKind, RepoError, Result};
use crate::storage::WriteOptions;

// =============================================================================
// Parameters
// =============================================================================

/// One positional command parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Null,
    Bool(bool),
    UInt(u64),
    Int(i64),
    Str(String),
}

impl Param {
    /// Encode as a JSON value
    pub fn to_json(&self) -> Value {
        match self {
            Param::Null => Value::Null,
            Param::Bool(b) => Value::Bool(*b),
            Param::UInt(n) => Value::from(*n),
            Param::Int(n) => Value::from(*n),
            Param::Str(s) => Value::String(s.clone()),
        }
    }

    /// Decode from a JSON value
    ///
    /// Non-negative integers always decode as `UInt`; only scalars are allowed.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Param::Null),
            Value::Bool(b) => Ok(Param::Bool(b)),
            Value::String(s) => Ok(Param::Str(s)),
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Ok(Param::UInt(u))
                } else if let Some(i) = n.as_i64() {
                    Ok(Param::Int(i))
                } else {
                    Err(RepoError::Protocol(format!("'{}' is not an integer parameter", n)))
                }
            }
            other => Err(RepoError::Protocol(format!(
                "'{}' is not a scalar parameter",
                other
            ))),
        }
    }

    /// Short type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Param::Null => "null",
            Param::Bool(_) => "bool",
            Param::UInt(_) => "uint",
            Param::Int(_) => "int",
            Param::Str(_) => "string",
        }
    }
}

impl From<bool> for Param {
    fn from(b: bool) -> Self {
        Param::Bool(b)
    }
}

impl From<u64> for Param {
    fn from(n: u64) -> Self {
        Param::UInt(n)
    }
}

impl From<i64> for Param {
    fn from(n: i64) -> Self {
        Param::Int(n)
    }
}

impl From<&str> for Param {
    fn from(s: &str) -> Self {
        Param::Str(s.to_string())
    }
}

impl From<String> for Param {
    fn from(s: String) -> Self {
        Param::Str(s)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(value: Option<T>) -> Self {
        value.map_or(Param::Null, Into::into)
    }
}

// =============================================================================
// Raw Commands
// =============================================================================

/// A command as it appears on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub params: Vec<Param>,
}

impl Command {
    pub fn new(name: impl Into<String>, params: Vec<Param>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Known kind for this command's name, if any
    pub fn kind(&self) -> Option<CommandKind> {
        CommandKind::from_name(&self.name)
    }
}

/// Command kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Exists,
    List,
    PathExists,
    PathCreate,
    PathRemove,
    PathSync,
    Remove,
    OpenRead,
    OpenWrite,
    Noop,
    Exit,
}

impl CommandKind {
    /// Every kind, in table order
    pub const ALL: [CommandKind; 11] = [
        CommandKind::Exists,
        CommandKind::List,
        CommandKind::PathExists,
        CommandKind::PathCreate,
        CommandKind::PathRemove,
        CommandKind::PathSync,
        CommandKind::Remove,
        CommandKind::OpenRead,
        CommandKind::OpenWrite,
        CommandKind::Noop,
        CommandKind::Exit,
    ];

    /// Storage kinds, served by the storage dispatcher
    pub const STORAGE: [CommandKind; 9] = [
        CommandKind::Exists,
        CommandKind::List,
        CommandKind::PathExists,
        CommandKind::PathCreate,
        CommandKind::PathRemove,
        CommandKind::PathSync,
        CommandKind::Remove,
        CommandKind::OpenRead,
        CommandKind::OpenWrite,
    ];

    /// Wire name
    pub fn name(self) -> &'static str {
        match self {
            CommandKind::Exists => "storageExists",
            CommandKind::List => "storageList",
            CommandKind::PathExists => "storagePathExists",
            CommandKind::PathCreate => "storagePathCreate",
            CommandKind::PathRemove => "storagePathRemove",
            CommandKind::PathSync => "storagePathSync",
            CommandKind::Remove => "storageRemove",
            CommandKind::OpenRead => "storageOpenRead",
            CommandKind::OpenWrite => "storageOpenWrite",
            CommandKind::Noop => "noop",
            CommandKind::Exit => "exit",
        }
    }

    /// Number of parameters the kind takes
    pub fn arity(self) -> usize {
        match self {
            CommandKind::Noop | CommandKind::Exit => 0,
            CommandKind::Exists | CommandKind::PathExists => 1,
            CommandKind::PathSync | CommandKind::Remove | CommandKind::OpenRead => 2,
            CommandKind::List | CommandKind::PathRemove => 3,
            CommandKind::PathCreate => 4,
            CommandKind::OpenWrite => 10,
        }
    }

    /// Look a kind up by wire name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

// =============================================================================
// Typed Storage Commands
// =============================================================================

/// A validated storage command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageCommand {
    /// Does the file exist
    Exists { file: String },

    /// List entries of a path, optionally filtered by a regex
    List {
        path: Option<String>,
        error_on_missing: bool,
        expression: Option<String>,
    },

    /// Does the path exist (`None` = repository base)
    PathExists { path: Option<String> },

    /// Create a path
    PathCreate {
        path: String,
        error_on_exists: bool,
        no_parent_create: bool,
        mode: Option<u32>,
    },

    /// Remove a path
    PathRemove {
        path: String,
        error_on_missing: bool,
        recurse: bool,
    },

    /// Sync a path
    PathSync { path: String, ignore_missing: bool },

    /// Remove a file
    Remove { file: String, error_on_missing: bool },

    /// Open a file and stream its content back
    OpenRead { file: String, ignore_missing: bool },

    /// Open a file and receive its content as a block stream
    OpenWrite { file: String, options: WriteOptions },
}

impl StorageCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            StorageCommand::Exists { .. } => CommandKind::Exists,
            StorageCommand::List { .. } => CommandKind::List,
            StorageCommand::PathExists { .. } => CommandKind::PathExists,
            StorageCommand::PathCreate { .. } => CommandKind::PathCreate,
            StorageCommand::PathRemove { .. } => CommandKind::PathRemove,
            StorageCommand::PathSync { .. } => CommandKind::PathSync,
            StorageCommand::Remove { .. } => CommandKind::Remove,
            StorageCommand::OpenRead { .. } => CommandKind::OpenRead,
            StorageCommand::OpenWrite { .. } => CommandKind::OpenWrite,
        }
    }

    /// Build the wire command
    pub fn to_command(&self) -> Command {
        let params = match self {
            StorageCommand::Exists { file } => vec![file.as_str().into()],
            StorageCommand::List {
                path,
                error_on_missing,
                expression,
            } => vec![
                path.clone().into(),
                (*error_on_missing).into(),
                expression.clone().into(),
            ],
            StorageCommand::PathExists { path } => vec![path.clone().into()],
            StorageCommand::PathCreate {
                path,
                error_on_exists,
                no_parent_create,
                mode,
            } => vec![
                path.as_str().into(),
                (*error_on_exists).into(),
                (*no_parent_create).into(),
                Param::UInt(mode.unwrap_or(0).into()),
            ],
            StorageCommand::PathRemove {
                path,
                error_on_missing,
                recurse,
            } => vec![
                path.as_str().into(),
                (*error_on_missing).into(),
                (*recurse).into(),
            ],
            StorageCommand::PathSync { path, ignore_missing } => {
                vec![path.as_str().into(), (*ignore_missing).into()]
            }
            StorageCommand::Remove {
                file,
                error_on_missing,
            } => vec![file.as_str().into(), (*error_on_missing).into()],
            StorageCommand::OpenRead {
                file,
                ignore_missing,
            } => vec![file.as_str().into(), (*ignore_missing).into()],
            StorageCommand::OpenWrite { file, options } => vec![
                file.as_str().into(),
                Param::UInt(options.mode_file.unwrap_or(0).into()),
                Param::UInt(options.mode_path.unwrap_or(0).into()),
                options.user.clone().into(),
                options.group.clone().into(),
                Param::Int(options.time_modified.unwrap_or(0)),
                options.create_path.into(),
                options.sync_file.into(),
                options.sync_path.into(),
                options.atomic.into(),
            ],
        };

        Command::new(self.kind().name(), params)
    }

    /// Validate a raw command
    ///
    /// Returns `Ok(None)` when the name is not a storage command, so other
    /// handlers may claim it.
    pub fn from_command(command: &Command) -> Result<Option<Self>> {
        match command.kind() {
            Some(kind) => Self::decode(kind, &command.params),
            None => Ok(None),
        }
    }

    /// Validate parameters for a known kind; `Ok(None)` for non-storage kinds
    pub fn decode(kind: CommandKind, params: &[Param]) -> Result<Option<Self>> {
        if !CommandKind::STORAGE.contains(&kind) {
            return Ok(None);
        }

        let mut p = ParamReader::new(kind, params)?;

        let decoded = match kind {
            CommandKind::Exists => StorageCommand::Exists { file: p.string()? },
            CommandKind::List => StorageCommand::List {
                path: p.opt_string()?,
                error_on_missing: p.boolean()?,
                expression: p.opt_string()?,
            },
            CommandKind::PathExists => StorageCommand::PathExists {
                path: p.opt_string()?,
            },
            CommandKind::PathCreate => StorageCommand::PathCreate {
                path: p.string()?,
                error_on_exists: p.boolean()?,
                no_parent_create: p.boolean()?,
                mode: p.mode()?,
            },
            CommandKind::PathRemove => StorageCommand::PathRemove {
                path: p.string()?,
                error_on_missing: p.boolean()?,
                recurse: p.boolean()?,
            },
            CommandKind::PathSync => StorageCommand::PathSync {
                path: p.string()?,
                ignore_missing: p.boolean()?,
            },
            CommandKind::Remove => StorageCommand::Remove {
                file: p.string()?,
                error_on_missing: p.boolean()?,
            },
            CommandKind::OpenRead => StorageCommand::OpenRead {
                file: p.string()?,
                ignore_missing: p.boolean()?,
            },
            CommandKind::OpenWrite => StorageCommand::OpenWrite {
                file: p.string()?,
                options: WriteOptions {
                    mode_file: p.mode()?,
                    mode_path: p.mode()?,
                    user: p.opt_string()?,
                    group: p.opt_string()?,
                    time_modified: p.time()?,
                    create_path: p.boolean()?,
                    sync_file: p.boolean()?,
                    sync_path: p.boolean()?,
                    atomic: p.boolean()?,
                },
            },
            CommandKind::Noop | CommandKind::Exit => return Ok(None),
        };

        Ok(Some(decoded))
    }
}

/// Positional, type-checked access to a command's parameters
struct ParamReader<'a> {
    kind: CommandKind,
    params: &'a [Param],
    index: usize,
}

impl<'a> ParamReader<'a> {
    fn new(kind: CommandKind, params: &'a [Param]) -> Result<Self> {
        if params.len() != kind.arity() {
            return Err(RepoError::fault(
                ErrorKind::Format,
                format!(
                    "{} expects {} parameters, got {}",
                    kind.name(),
                    kind.arity(),
                    params.len()
                ),
            ));
        }

        Ok(Self {
            kind,
            params,
            index: 0,
        })
    }

    fn next(&mut self) -> &'a Param {
        // arity was checked in new()
        let param = &self.params[self.index];
        self.index += 1;
        param
    }

    fn mismatch(&self, expected: &str, found: &Param) -> RepoError {
        RepoError::fault(
            ErrorKind::Format,
            format!(
                "{} parameter {} must be {}, got {}",
                self.kind.name(),
                self.index,
                expected,
                found.type_name()
            ),
        )
    }

    fn string(&mut self) -> Result<String> {
        match self.next() {
            Param::Str(s) => Ok(s.clone()),
            other => Err(self.mismatch("string", other)),
        }
    }

    fn opt_string(&mut self) -> Result<Option<String>> {
        match self.next() {
            Param::Null => Ok(None),
            Param::Str(s) => Ok(Some(s.clone())),
            other => Err(self.mismatch("string or null", other)),
        }
    }

    fn boolean(&mut self) -> Result<bool> {
        match self.next() {
            Param::Bool(b) => Ok(*b),
            other => Err(self.mismatch("bool", other)),
        }
    }

    /// A permission mode; null and zero both mean "use the default"
    fn mode(&mut self) -> Result<Option<u32>> {
        match self.next() {
            Param::Null | Param::UInt(0) => Ok(None),
            Param::UInt(n) if *n <= 0o7777 => Ok(Some(*n as u32)),
            other => Err(self.mismatch("mode", other)),
        }
    }

    /// A unix timestamp; null and zero both mean "not set"
    fn time(&mut self) -> Result<Option<i64>> {
        match self.next() {
            Param::Null | Param::UInt(0) | Param::Int(0) => Ok(None),
            Param::Int(n) => Ok(Some(*n)),
            Param::UInt(n) => i64::try_from(*n)
                .map(Some)
                .map_err(|_| self.mismatch("time", &Param::UInt(*n))),
            other => Err(self.mismatch("time", other)),
        }
    }
}
