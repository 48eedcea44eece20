//! CLI argument parsing for nslock.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// nslock: run commands under a lock held in a shared namespace directory.
///
/// Contenders queue as ephemeral, sequentially numbered entries under a lock
/// path; the lowest number holds the lock.
#[derive(Parser, Debug)]
#[command(name = "nslock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (default: $NSLOCK_CONFIG, else built-in defaults).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log at debug level regardless of the configured filter.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for nslock.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the contenders under a lock path every time they change.
    ///
    /// Creates the lock path if it does not exist. Runs until interrupted.
    Watch(WatchArgs),

    /// Run a command while holding the lock.
    ///
    /// Waits for the lock (optionally bounded by a timeout), runs the command,
    /// then releases the lock. A non-zero exit status is an operation failure.
    Exec(ExecArgs),

    /// Show who holds the lock and who is waiting.
    Status(StatusArgs),
}

/// Namespace and lock path shared by every command.
#[derive(Args, Debug)]
pub struct Target {
    /// Namespace root directory (optionally prefixed with `file://`).
    pub connect: String,

    /// Lock path inside the namespace, e.g. `/locks/deploy`.
    pub lock_path: String,
}

/// Arguments for the `watch` command.
#[derive(Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub target: Target,
}

/// Arguments for the `exec` command.
#[derive(Args, Debug)]
pub struct ExecArgs {
    #[command(flatten)]
    pub target: Target,

    /// Command line to run while holding the lock (split like a shell would).
    #[arg(long = "command", short = 'c', value_name = "CMD")]
    pub cmd: String,

    /// Tag recorded in the contender entry for diagnostics.
    #[arg(long, default_value = "nslock-exec")]
    pub name: String,

    /// Give up waiting for the lock after this many milliseconds
    /// (default: `default_timeout_ms` from config, else wait indefinitely).
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,
}

/// Arguments for the `status` command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub target: Target,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
