//! Mutual-exclusion execution over a coordination namespace.
//!
//! Every invocation registers an ephemeral sequential contender entry under
//! the lock path. The entry with the lowest sequence number holds the lock;
//! everyone else watches the lock path and re-checks their rank whenever its
//! children change. The entry is deleted once the guarded operation finishes,
//! which wakes the next contender in line.
//!
//! # Example
//!
//! ```no_run
//! use nslock::executor::DistributedOperationExecutor;
//! use nslock::namespace::MemoryNamespace;
//!
//! let namespace = MemoryNamespace::new();
//! let executor = DistributedOperationExecutor::new(namespace.connect());
//! let value = executor
//!     .with_lock("report", "/locks/report", || Ok::<_, std::io::Error>(42))
//!     .unwrap();
//! assert_eq!(value, 42);
//! ```

mod contender;
mod operation;
mod result;


pub use contender::{ContenderInfo, ContenderMetadata, list_contenders, owner_string};
pub use operation::DistributedOperation;
pub use result::DistributedOperationResult;

use crate::config::Config;
use crate::error::{ExecutorError, NsLockError, Result};
use crate::namespace::{Acl, CreateMode, Namespace, path};
use crate::wait::WaitToken;
use contender::{ContenderGuard, rank_of};
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn};

/// Default name prefix of contender entries.
pub const DEFAULT_CONTENDER_PREFIX: &str = "lock-";

type ExecResult<T, O> = std::result::Result<T, ExecutorError<<O as DistributedOperation>::Error>>;

/// Runs operations while holding a lock backed by a namespace path.
///
/// The executor holds no lock state of its own; it may be shared by
/// reference across threads, and every call is independent.
pub struct DistributedOperationExecutor<N: Namespace> {
    namespace: N,
    default_acl: Acl,
    contender_prefix: String,
}

impl<N: Namespace> DistributedOperationExecutor<N> {
    /// An executor that creates nodes with the open ACL and the default
    /// contender prefix.
    pub fn new(namespace: N) -> Self {
        Self {
            namespace,
            default_acl: Acl::open_unsafe(),
            contender_prefix: DEFAULT_CONTENDER_PREFIX.to_string(),
        }
    }

    /// An executor that takes its ACL and contender prefix from `config`.
    pub fn from_config(namespace: N, config: &Config) -> Self {
        Self {
            namespace,
            default_acl: config.acl.clone(),
            contender_prefix: config.contender_prefix.clone(),
        }
    }

    pub fn namespace(&self) -> &N {
        &self.namespace
    }

    pub fn contender_prefix(&self) -> &str {
        &self.contender_prefix
    }

    /// Run `operation` while holding the lock at `lock_path`, waiting as long
    /// as it takes.
    ///
    /// The operation's own failure comes back as [`ExecutorError::Operation`]
    /// after the contender entry has been removed.
    pub fn with_lock<O: DistributedOperation>(
        &self,
        name: &str,
        lock_path: &str,
        operation: O,
    ) -> ExecResult<O::Output, O> {
        self.with_lock_acl(name, lock_path, &self.default_acl, operation)
    }

    /// Like [`with_lock`](Self::with_lock), but give up waiting after
    /// `timeout`.
    ///
    /// The timeout bounds only the wait; once the lock is held the operation
    /// runs to completion. A zero timeout still runs the operation if the
    /// lock is free.
    pub fn with_lock_timeout<O: DistributedOperation>(
        &self,
        name: &str,
        lock_path: &str,
        operation: O,
        timeout: Duration,
    ) -> ExecResult<DistributedOperationResult<O::Output>, O> {
        self.with_lock_acl_timeout(name, lock_path, &self.default_acl, operation, timeout)
    }

    /// Like [`with_lock`](Self::with_lock), creating nodes with `acl`.
    pub fn with_lock_acl<O: DistributedOperation>(
        &self,
        name: &str,
        lock_path: &str,
        acl: &Acl,
        operation: O,
    ) -> ExecResult<O::Output, O> {
        self.execute(name, lock_path, acl, operation, None)?
            .into_result()
            .ok_or_else(|| {
                NsLockError::Unavailable(format!("lock wait on '{}' ended without a turn", lock_path))
                    .into()
            })
    }

    /// Like [`with_lock_timeout`](Self::with_lock_timeout), creating nodes
    /// with `acl`.
    pub fn with_lock_acl_timeout<O: DistributedOperation>(
        &self,
        name: &str,
        lock_path: &str,
        acl: &Acl,
        operation: O,
        timeout: Duration,
    ) -> ExecResult<DistributedOperationResult<O::Output>, O> {
        // An unrepresentable deadline is as good as none.
        let deadline = Instant::now().checked_add(timeout);
        if deadline.is_none() {
            return self
                .with_lock_acl(name, lock_path, acl, operation)
                .map(DistributedOperationResult::completed);
        }
        self.execute(name, lock_path, acl, operation, deadline)
    }

    fn execute<O: DistributedOperation>(
        &self,
        name: &str,
        lock_path: &str,
        acl: &Acl,
        operation: O,
        deadline: Option<Instant>,
    ) -> ExecResult<DistributedOperationResult<O::Output>, O> {
        let span = info_span!("with_lock", tag = name, lock_path);
        let _enter = span.enter();

        self.namespace.ensure_path(lock_path, acl)?;

        let metadata = ContenderMetadata::new(name).to_json()?;
        let entry = self.namespace.create_node(
            &path::join(lock_path, &self.contender_prefix),
            metadata.as_bytes(),
            acl,
            CreateMode::EphemeralSequential,
        )?;
        let guard = ContenderGuard::new(&self.namespace, entry);
        debug!(entry = %guard.path(), "registered contender");

        if !self.wait_for_turn(lock_path, &guard, deadline)? {
            guard.release()?;
            info!("timed out waiting for lock");
            return Ok(DistributedOperationResult::timeout());
        }

        debug!(entry = %guard.path(), "lock acquired");
        let outcome = operation.execute();
        let released = guard.release();

        match (outcome, released) {
            (Ok(value), Ok(())) => Ok(DistributedOperationResult::completed(value)),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(op), Ok(())) => Err(ExecutorError::Operation(op)),
            (Err(op), Err(e)) => {
                warn!(error = %e, "failed to release contender entry after operation failure");
                Err(ExecutorError::Operation(op))
            }
        }
    }

    /// Block until `guard` holds the lowest rank. Returns `false` if
    /// `deadline` passes first.
    fn wait_for_turn(
        &self,
        lock_path: &str,
        guard: &ContenderGuard<'_, N>,
        deadline: Option<Instant>,
    ) -> Result<bool> {
        let token = WaitToken::new();
        loop {
            // Arm the watch before listing so no change slips in between.
            self.namespace.watch_children(lock_path, token.notifier())?;
            let children = self.namespace.list_children(lock_path)?;

            let rank = rank_of(&children, &self.contender_prefix, guard.name())
                .ok_or_else(|| NsLockError::ContenderLost(guard.path().to_string()))?;
            if rank == 0 {
                return Ok(true);
            }

            debug!(rank, "waiting for lock");
            match deadline {
                None => token.wait(),
                Some(deadline) => {
                    if !token.wait_until(deadline) {
                        return Ok(false);
                    }
                }
            }
        }
    }
}
