//! Implementation of the `nslock watch` command.

use super::connect;
use crate::cli::WatchArgs;
use nslock::config::Config;
use nslock::error::Result;
use nslock::watcher::LockWatcher;
use tracing::info;

/// Print the lock path's children on every change until the namespace
/// reports an error.
pub(super) fn cmd_watch(args: WatchArgs, config: &Config) -> Result<()> {
    let namespace = connect(&args.target, config)?;
    let watcher = LockWatcher::new(namespace, &args.target.lock_path, &config.acl)?;

    info!(lock_path = %watcher.lock_path(), "watching lock path");
    watcher.watch()
}
