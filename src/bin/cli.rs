//! repolink CLI Client
//!
//! Command-line interface for a remote repository, reached either by
//! spawning a remote process (typically through ssh) or over TCP.

use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::net::TcpStream;
use std::process::{Command, Stdio};

use clap::{Parser, Subcommand};
use repolink::{Config, RemoteStorage, RepoError, Result, Storage, WriteOptions};
use tracing_subscriber::{fmt, EnvFilter};

/// repolink CLI
#[derive(Parser, Debug)]
#[command(name = "repolink")]
#[command(about = "CLI for repositories served by repolink-remote")]
#[command(version)]
struct Args {
    /// Command that starts a remote on stdio, e.g. "ssh backup repolink-remote -r /repo"
    #[arg(long, conflicts_with = "connect", required_unless_present = "connect")]
    remote_cmd: Option<String>,

    /// TCP address of a listening remote
    #[arg(short, long)]
    connect: Option<String>,

    /// Host label used in error messages
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Maximum block size in bytes
    #[arg(short, long, default_value = "65536")]
    buffer_size: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check whether a file exists
    Exists {
        file: String,
    },

    /// List a path
    Ls {
        /// Regular expression entries must match
        #[arg(short, long)]
        filter: Option<String>,

        /// Path to list (repository base if omitted)
        path: Option<String>,
    },

    /// Write a file's content to stdout
    Get {
        file: String,
    },

    /// Store stdin as a file
    Put {
        file: String,
    },

    /// Remove a file
    Rm {
        file: String,
    },

    /// Create a path
    Mkdir {
        path: String,
    },

    /// Remove a path
    Rmdir {
        /// Remove contents first
        #[arg(short, long)]
        recurse: bool,

        path: String,
    },

    /// Sync a path to disk
    Sync {
        path: String,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .buffer_size(args.buffer_size)
        .remote_host(&args.host)
        .build();

    if let Err(e) = connect_and_run(&args, &config) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn connect_and_run(args: &Args, config: &Config) -> Result<()> {
    config.validate()?;

    if let Some(addr) = &args.connect {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream);
        return run(RemoteStorage::from_config(reader, writer, config), &args.command);
    }

    let remote_cmd = args
        .remote_cmd
        .as_deref()
        .ok_or_else(|| RepoError::Config("either --remote-cmd or --connect is required".into()))?;

    let mut parts = remote_cmd.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| RepoError::Config("--remote-cmd is empty".into()))?;

    tracing::debug!("Spawning remote: {}", remote_cmd);
    let mut child = Command::new(program)
        .args(parts)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()?;

    let writer = child
        .stdin
        .take()
        .ok_or_else(|| RepoError::Config("remote stdin unavailable".into()))?;
    let reader = child
        .stdout
        .take()
        .ok_or_else(|| RepoError::Config("remote stdout unavailable".into()))?;

    let result = run(
        RemoteStorage::from_config(BufReader::new(reader), BufWriter::new(writer), config),
        &args.command,
    );

    let status = child.wait()?;
    tracing::debug!("Remote exited with {}", status);
    result
}

/// Execute one subcommand, then end the session
fn run<R: BufRead, W: Write>(mut remote: RemoteStorage<R, W>, command: &Commands) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match command {
        Commands::Exists { file } => {
            writeln!(out, "{}", remote.exists(file)?)?;
        }
        Commands::Ls { filter, path } => {
            let mut names = remote
                .list(path.as_deref(), true, filter.as_deref())?
                .unwrap_or_default();
            names.sort();
            for name in names {
                writeln!(out, "{}", name)?;
            }
        }
        Commands::Get { file } => {
            if let Some(mut read) = remote.open_read(file, false)? {
                io::copy(&mut read, &mut out)?;
            }
        }
        Commands::Put { file } => {
            let mut write = remote.open_write(file, WriteOptions::default())?;
            io::copy(&mut io::stdin().lock(), &mut write)?;
            write.close()?;
        }
        Commands::Rm { file } => remote.remove(file, true)?,
        Commands::Mkdir { path } => remote.path_create(path, false, false, None)?,
        Commands::Rmdir { recurse, path } => remote.path_remove(path, true, *recurse)?,
        Commands::Sync { path } => remote.path_sync(path, false)?,
    }

    out.flush()?;
    remote.close()
}
