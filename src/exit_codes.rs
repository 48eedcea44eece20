//! Exit code constants for the nslock CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid config)
//! - 2: The guarded operation failed
//! - 3: Coordination failure (namespace unavailable, session expired, lost entry)
//! - 4: Lock acquisition timed out

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid config or an invalid namespace path.
pub const USER_ERROR: i32 = 1;

/// The operation run under the lock failed.
pub const OPERATION_FAILURE: i32 = 2;

/// The namespace could not be reached or rejected a request.
pub const COORDINATION_FAILURE: i32 = 3;

/// The lock was not acquired before the timeout elapsed.
pub const LOCK_TIMEOUT: i32 = 4;
