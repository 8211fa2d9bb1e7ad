//! repolink Remote Binary
//!
//! Serves a repository to a driver. With no `--listen` it serves exactly one
//! session over stdin/stdout, as when spawned through ssh by the client.

use std::io::{self, BufWriter};

use clap::Parser;
use repolink::network::{Server, Session};
use repolink::protocol::{Channel, Peer};
use repolink::{Config, PosixStorage, StorageDispatcher};
use tracing_subscriber::{fmt, EnvFilter};

/// repolink remote
#[derive(Parser, Debug)]
#[command(name = "repolink-remote")]
#[command(about = "Serve a backup repository over the remote storage protocol")]
#[command(version)]
struct Args {
    /// Repository base path
    #[arg(short, long, default_value = "./repo")]
    repo_path: String,

    /// Maximum block size in bytes
    #[arg(short, long, default_value = "65536")]
    buffer_size: usize,

    /// Serve TCP connections on this address instead of stdio
    #[arg(short, long)]
    listen: Option<String>,

    /// Role label reported for the client in log lines
    #[arg(long, default_value = "client")]
    name: String,
}

fn main() {
    // stdout carries the protocol, so logs go to stderr
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,repolink=debug"));

    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("repolink remote v{}", repolink::VERSION);
    tracing::info!("Repository path: {}", args.repo_path);

    let mut builder = Config::builder()
        .repo_path(&args.repo_path)
        .buffer_size(args.buffer_size);
    if let Some(listen) = &args.listen {
        builder = builder.listen_addr(listen);
    }
    let config = builder.build();

    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let result = match args.listen {
        Some(_) => Server::new(config).run(),
        None => serve_stdio(&config, &args.name),
    };

    if let Err(e) = result {
        tracing::error!("Remote error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Remote stopped");
}

/// One session over this process's stdin/stdout
fn serve_stdio(config: &Config, name: &str) -> repolink::Result<()> {
    let reader = io::stdin().lock();
    let writer = BufWriter::new(io::stdout().lock());

    let channel = Channel::new(reader, writer, config.buffer_size)
        .with_peer(Peer::new(name, "stdio"));

    let mut session = Session::new(channel)
        .named(name)
        .with_handler(StorageDispatcher::new(PosixStorage::from_config(config)));

    session.serve()
}
