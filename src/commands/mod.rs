//! Command implementations for nslock.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations. Every command opens its own session on the namespace
//! named by the connection string.

mod exec;
mod status;
mod watch;

use crate::cli::{Command, Target};
use nslock::config::Config;
use nslock::error::Result;
use nslock::namespace::{FsNamespace, FsOptions};

/// Dispatch a command to its implementation.
pub fn dispatch(command: Command, config: &Config) -> Result<()> {
    match command {
        Command::Watch(args) => watch::cmd_watch(args, config),
        Command::Exec(args) => exec::cmd_exec(args, config),
        Command::Status(args) => status::cmd_status(args, config),
    }
}

/// Open a namespace session for `target` using the session settings in
/// `config`.
fn connect(target: &Target, config: &Config) -> Result<FsNamespace> {
    FsNamespace::connect(&target.connect, FsOptions::from(config))
}
