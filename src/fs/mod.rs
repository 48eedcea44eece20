//! Filesystem utilities backing the directory namespace.

pub mod atomic;

pub use atomic::{atomic_write, atomic_write_file};

use crate::error::NsLockError;
use std::io;
use std::path::Path;

/// Wrap an I/O failure as a coordination failure with the usual message shape.
pub(crate) fn io_failure(action: &str, path: &Path, e: io::Error) -> NsLockError {
    NsLockError::Unavailable(format!("failed to {} '{}': {}", action, path.display(), e))
}
