//! nslock: mutual-exclusion execution through ordered ephemeral entries in a
//! shared coordination namespace.
//!
//! A [`DistributedOperationExecutor`] runs a caller's operation while holding
//! a lock identified by a namespace path. Contenders register ephemeral,
//! sequentially numbered children of that path; the lowest number holds the
//! lock and the rest wait for the children to change. The namespace itself is
//! abstracted by the [`Namespace`](namespace::Namespace) trait, with an
//! in-process backend and a directory-backed one shared between processes.

pub mod config;
pub mod error;
pub mod executor;
pub mod exit_codes;
pub mod fs;
pub mod namespace;
pub mod watcher;

mod wait;

#[cfg(test)]
mod test_support;

pub use error::{ExecutorError, NsLockError, Result};
pub use executor::{DistributedOperation, DistributedOperationExecutor, DistributedOperationResult};
