//! Implementation of the `nslock exec` command.

use super::connect;
use crate::cli::ExecArgs;
use nslock::config::Config;
use nslock::error::{ExecutorError, NsLockError, Result};
use nslock::executor::{DistributedOperationExecutor, DistributedOperationResult};
use std::process::Command;
use std::time::Duration;
use tracing::info;

/// Run the command while holding the lock.
///
/// A lock that cannot be acquired within the timeout is reported as
/// [`NsLockError::LockTimeout`]; a command that cannot be started or exits
/// unsuccessfully as [`NsLockError::OperationFailed`].
pub(super) fn cmd_exec(args: ExecArgs, config: &Config) -> Result<()> {
    let argv = parse_command(&args.cmd)?;
    let timeout = args
        .timeout_ms
        .map(Duration::from_millis)
        .or(config.default_timeout());
    let lock_path = &args.target.lock_path;

    let namespace = connect(&args.target, config)?;
    let executor = DistributedOperationExecutor::from_config(namespace, config);
    let operation = || run_command(&argv);

    let outcome = match timeout {
        Some(timeout) => executor.with_lock_timeout(&args.name, lock_path, operation, timeout),
        None => executor
            .with_lock(&args.name, lock_path, operation)
            .map(DistributedOperationResult::completed),
    }
    .map_err(into_ns_error)?;

    if outcome.is_timed_out() {
        return Err(NsLockError::LockTimeout {
            lock_path: lock_path.clone(),
            timeout_ms: timeout.map_or(0, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX)),
        });
    }
    Ok(())
}

/// Split a command line the way a POSIX shell would, without running one.
fn parse_command(command: &str) -> Result<Vec<String>> {
    let argv = shell_words::split(command).map_err(|e| {
        NsLockError::UserError(format!(
            "failed to parse command '{}': {}\n\
             Fix: check for unmatched quotes or invalid escape sequences.",
            command, e
        ))
    })?;

    if argv.is_empty() {
        return Err(NsLockError::UserError(format!(
            "command is empty after parsing: '{}'",
            command
        )));
    }
    Ok(argv)
}

fn run_command(argv: &[String]) -> Result<()> {
    let Some((program, rest)) = argv.split_first() else {
        return Err(NsLockError::UserError("command is empty".to_string()));
    };

    info!(command = %program, "running command under lock");
    let status = Command::new(program).args(rest).status().map_err(|e| {
        NsLockError::OperationFailed(format!(
            "failed to execute command '{}': {}\n\
             Fix: ensure the command is installed and in PATH.",
            program, e
        ))
    })?;

    if status.success() {
        Ok(())
    } else {
        Err(NsLockError::OperationFailed(format!(
            "command '{}' failed with {}",
            program, status
        )))
    }
}

fn into_ns_error(err: ExecutorError<NsLockError>) -> NsLockError {
    match err {
        ExecutorError::Coordination(e) | ExecutorError::Operation(e) => e,
    }
}
