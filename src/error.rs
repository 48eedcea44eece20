//! Error types for nslock.
//!
//! `NsLockError` covers everything the namespace and the CLI can report.
//! `ExecutorError` wraps it together with the caller's own operation error so
//! that a failing operation comes back to the caller unchanged.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for namespace and configuration failures.
#[derive(Error, Debug)]
pub enum NsLockError {
    /// User provided invalid arguments or configuration.
    #[error("{0}")]
    UserError(String),

    /// The node (or its parent) does not exist.
    #[error("no such node: {0}")]
    NoNode(String),

    /// A non-sequential node with this path already exists.
    #[error("node already exists: {0}")]
    NodeExists(String),

    /// The node still has children and cannot be deleted.
    #[error("node has children: {0}")]
    NotEmpty(String),

    /// Ephemeral nodes cannot have children.
    #[error("ephemeral node cannot have children: {0}")]
    EphemeralParent(String),

    /// The path is not a valid namespace path.
    #[error("invalid namespace path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// The session this handle belongs to has been closed or has expired.
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// The namespace could not serve the request.
    #[error("coordination service unavailable: {0}")]
    Unavailable(String),

    /// The contender entry vanished while its invocation was still waiting.
    #[error("contender entry disappeared while waiting: {0}")]
    ContenderLost(String),

    /// The lock could not be acquired within the allowed time.
    #[error("timed out after {timeout_ms} ms waiting for lock '{lock_path}'")]
    LockTimeout { lock_path: String, timeout_ms: u64 },

    /// The guarded command ran and failed.
    #[error("{0}")]
    OperationFailed(String),
}

impl NsLockError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            NsLockError::UserError(_) | NsLockError::InvalidPath { .. } => exit_codes::USER_ERROR,
            NsLockError::NoNode(_)
            | NsLockError::NodeExists(_)
            | NsLockError::NotEmpty(_)
            | NsLockError::EphemeralParent(_)
            | NsLockError::SessionExpired(_)
            | NsLockError::Unavailable(_)
            | NsLockError::ContenderLost(_) => exit_codes::COORDINATION_FAILURE,
            NsLockError::LockTimeout { .. } => exit_codes::LOCK_TIMEOUT,
            NsLockError::OperationFailed(_) => exit_codes::OPERATION_FAILURE,
        }
    }

    pub fn is_no_node(&self) -> bool {
        matches!(self, NsLockError::NoNode(_))
    }

    pub fn is_node_exists(&self) -> bool {
        matches!(self, NsLockError::NodeExists(_))
    }

    pub(crate) fn invalid_path(path: &str, reason: impl Into<String>) -> Self {
        NsLockError::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for nslock operations.
pub type Result<T> = std::result::Result<T, NsLockError>;

/// Failure of a `with_lock` invocation.
#[derive(Error, Debug)]
pub enum ExecutorError<E> {
    /// The namespace failed while acquiring or releasing the lock.
    #[error(transparent)]
    Coordination(#[from] NsLockError),

    /// The guarded operation failed. Cleanup has already run.
    #[error("{0}")]
    Operation(E),
}

impl<E> ExecutorError<E> {
    /// Returns the operation's own error, if that is what failed.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            ExecutorError::Operation(e) => Some(e),
            ExecutorError::Coordination(_) => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            ExecutorError::Coordination(e) => e.exit_code(),
            ExecutorError::Operation(_) => exit_codes::OPERATION_FAILURE,
        }
    }
}
