//! Contender entries: the ephemeral sequential children that queue for a lock.

use crate::error::{NsLockError, Result};
use crate::namespace::{Namespace, path};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Diagnostic data stored in every contender entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContenderMetadata {
    /// Tag supplied by the caller of `with_lock`.
    pub name: String,

    /// Owner of the entry (e.g., `user@HOST`).
    pub owner: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    pub created_at: DateTime<Utc>,
}

impl ContenderMetadata {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            owner: owner_string(),
            pid: Some(std::process::id()),
            created_at: Utc::now(),
        }
    }

    /// Parse metadata from entry data. Returns `None` for foreign payloads.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        serde_json::from_slice(data).ok()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            NsLockError::Unavailable(format!("failed to serialize contender metadata: {}", e))
        })
    }

    pub fn age(&self) -> Duration {
        Utc::now().signed_duration_since(self.created_at)
    }

    /// Format the age as a human-readable string.
    pub fn age_string(&self) -> String {
        format_age(self.age())
    }
}

fn format_age(age: Duration) -> String {
    let minutes = age.num_minutes();
    let hours = age.num_hours();
    let days = age.num_days();

    if days > 0 {
        format!("{}d {}h", days, hours % 24)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else {
        format!("{}m", minutes)
    }
}

/// `user@host` for the current process.
pub fn owner_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

/// RAII guard for a contender entry.
///
/// Dropping the guard deletes the entry. A failed deletion is logged and
/// otherwise ignored; the entry still goes away when its session ends.
pub(crate) struct ContenderGuard<'a, N: Namespace + ?Sized> {
    namespace: &'a N,
    path: String,
    released: bool,
}

impl<'a, N: Namespace + ?Sized> ContenderGuard<'a, N> {
    pub fn new(namespace: &'a N, path: String) -> Self {
        Self {
            namespace,
            path,
            released: false,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Node name of the entry within the lock path.
    pub fn name(&self) -> &str {
        path::node_name(&self.path)
    }

    /// Delete the entry now and report the outcome.
    ///
    /// An entry that is already gone counts as released.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        match self.namespace.delete_node(&self.path) {
            Ok(()) => {
                debug!(entry = %self.path, "released contender entry");
                Ok(())
            }
            Err(e) if e.is_no_node() => {
                debug!(entry = %self.path, "contender entry already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

impl<N: Namespace + ?Sized> Drop for ContenderGuard<'_, N> {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = self.namespace.delete_node(&self.path)
            && !e.is_no_node()
        {
            warn!(entry = %self.path, error = %e, "failed to remove contender entry");
        }
    }
}

/// Position of `own` among the contender entries in `children`.
///
/// Children that lack `prefix` or a sequence suffix are ignored. Returns
/// `None` when `own` is not among them.
pub(crate) fn rank_of(children: &[String], prefix: &str, own: &str) -> Option<usize> {
    let own_sequence = contender_sequence(own, prefix)?;
    let mut found = false;
    let mut ahead = 0;
    for child in children {
        let Some(sequence) = contender_sequence(child, prefix) else {
            continue;
        };
        if child == own {
            found = true;
        } else if sequence < own_sequence {
            ahead += 1;
        }
    }
    found.then_some(ahead)
}

fn contender_sequence(name: &str, prefix: &str) -> Option<u64> {
    let rest = name.strip_prefix(prefix)?;
    if rest.len() != path::SEQUENCE_DIGITS {
        return None;
    }
    path::sequence_of(rest)
}

/// A contender entry as seen by an observer.
#[derive(Debug, Clone)]
pub struct ContenderInfo {
    /// Node name of the entry.
    pub entry: String,
    pub sequence: u64,
    /// Zero for the holder.
    pub rank: usize,
    pub metadata: Option<ContenderMetadata>,
}

impl ContenderInfo {
    pub fn is_holder(&self) -> bool {
        self.rank == 0
    }
}

impl fmt::Display for ContenderInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.metadata {
            Some(meta) => write!(
                f,
                "{} (name: {}, owner: {}, age: {}",
                self.entry,
                meta.name,
                meta.owner,
                meta.age_string()
            )?,
            None => write!(f, "{} (name: ?, owner: ?, age: ?", self.entry)?,
        }
        if self.is_holder() {
            write!(f, ", HOLDER")?;
        }
        write!(f, ")")
    }
}

/// Every contender entry under `lock_path`, in lock order.
///
/// Entries deleted between listing and reading are skipped.
pub fn list_contenders<N: Namespace + ?Sized>(
    namespace: &N,
    lock_path: &str,
    prefix: &str,
) -> Result<Vec<ContenderInfo>> {
    let mut entries: Vec<(u64, String)> = namespace
        .list_children(lock_path)?
        .into_iter()
        .filter_map(|child| contender_sequence(&child, prefix).map(|seq| (seq, child)))
        .collect();
    entries.sort();

    let mut contenders = Vec::with_capacity(entries.len());
    for (sequence, entry) in entries {
        let data = match namespace.read_data(&path::join(lock_path, &entry)) {
            Ok(data) => data,
            Err(e) if e.is_no_node() => continue,
            Err(e) => return Err(e),
        };
        contenders.push(ContenderInfo {
            rank: contenders.len(),
            entry,
            sequence,
            metadata: ContenderMetadata::from_bytes(&data),
        });
    }
    Ok(contenders)
}
