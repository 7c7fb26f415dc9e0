//! ephemera - ephemeral clusters with a TTL
//!
//! Wires the state file, the task runner, the OS backstop scheduler and the
//! terminal prompt into the `new`, `status` and `destroy` commands. Every
//! command runs the expiration check first.

mod commands;
mod render;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ephemera_util::{config_path_without_env, parse_duration};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use commands::{App, destroy, new, status};

/// ephemera - ephemeral clusters that clean up after themselves
#[derive(Parser, Debug)]
#[command(name = "ephemera", version)]
#[command(about = "Ephemeral clusters that destroy themselves when their TTL runs out", long_about = None)]
struct Args {
    /// State file path (default: ./.ephemera.toml)
    #[arg(short, long, global = true, env = "EPHEMERA_CONFIG", default_value_os_t = config_path_without_env())]
    config: PathBuf,

    /// Show task output and debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Hide task output, even with --verbose
    #[arg(long, global = true)]
    silent: bool,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Kill tasks running longer than this (0 disables)
    #[arg(long, global = true, env = "EPHEMERA_TASK_TIMEOUT", default_value = "30m", value_parser = parse_timeout)]
    task_timeout: Duration,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a cluster and watch it until its TTL runs out
    New(new::NewArgs),

    /// Show the cluster's state and time remaining
    Status(status::StatusArgs),

    /// Destroy the cluster now
    Destroy(destroy::DestroyArgs),
}

fn parse_timeout(input: &str) -> Result<Duration, String> {
    parse_duration(input).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { args.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "ephemera starting"
    );

    let timeout = (!args.task_timeout.is_zero()).then_some(args.task_timeout);
    let app = App::new(args.config, timeout, args.silent || !args.verbose, args.verbose);

    match args.command {
        Command::New(new_args) => new::run(&app, new_args).await,
        Command::Status(status_args) => status::run(&app, status_args).await,
        Command::Destroy(destroy_args) => destroy::run(&app, destroy_args).await,
    }
}
