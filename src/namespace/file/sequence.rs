//! Per-directory sequence counters.
//!
//! Each node directory that has had sequential children holds a `.sequence`
//! file with the next number to hand out. Updates are serialized by a
//! `.sequence.lock` file created with `create_new` semantics, so only one
//! process can hold it at a time. A lock file older than the stale threshold
//! is assumed to belong to a crashed process and is removed.
//!
//! The lock stays held while the numbered child is published, so children
//! become visible in sequence order.

use crate::error::{NsLockError, Result};
use crate::fs::{atomic_write_file, io_failure};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};

const SEQUENCE_FILE: &str = ".sequence";
const SEQUENCE_LOCK_FILE: &str = ".sequence.lock";
const RETRY_DELAY: Duration = Duration::from_millis(1);

/// Exclusive hold on a directory's sequence counter.
///
/// The lock file is removed when the guard is dropped.
#[derive(Debug)]
struct SequenceLock {
    path: PathBuf,
}

impl SequenceLock {
    fn acquire(dir: &Path, stale_after: Duration) -> Result<Self> {
        let path = dir.join(SEQUENCE_LOCK_FILE);
        let deadline = Instant::now() + stale_after * 2;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    if let Err(e) = writeln!(file, "{}", std::process::id()) {
                        debug!(lock = %path.display(), error = %e, "failed to record lock owner pid");
                    }
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if lock_age(&path).is_some_and(|age| age > stale_after) {
                        warn!(lock = %path.display(), "breaking stale sequence lock");
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(NsLockError::Unavailable(format!(
                            "timed out waiting for sequence lock '{}'",
                            path.display()
                        )));
                    }
                    thread::sleep(RETRY_DELAY);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(NsLockError::NoNode(dir.display().to_string()));
                }
                Err(e) => return Err(io_failure("acquire sequence lock", &path, e)),
            }
        }
    }
}

impl Drop for SequenceLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!(lock = %self.path.display(), error = %e, "failed to release sequence lock");
        }
    }
}

fn lock_age(path: &Path) -> Option<Duration> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    SystemTime::now().duration_since(modified).ok()
}

/// Reserve the next sequence number for children of `dir` and hand it to
/// `publish` while the counter is still locked.
///
/// The number is consumed even if `publish` fails.
pub(super) fn with_next_sequence<T, F>(dir: &Path, stale_after: Duration, publish: F) -> Result<T>
where
    F: FnOnce(u64) -> Result<T>,
{
    let _lock = SequenceLock::acquire(dir, stale_after)?;
    let counter_path = dir.join(SEQUENCE_FILE);

    let current = match fs::read_to_string(&counter_path) {
        Ok(content) => content.trim().parse::<u64>().map_err(|e| {
            NsLockError::Unavailable(format!(
                "corrupt sequence counter '{}': {}",
                counter_path.display(),
                e
            ))
        })?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
        Err(e) => return Err(io_failure("read sequence counter", &counter_path, e)),
    };

    atomic_write_file(&counter_path, &(current + 1).to_string())?;
    publish(current)
}
