//! On-disk records for nodes and sessions.

use crate::error::{NsLockError, Result};
use crate::namespace::Acl;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// Name of the record file inside each node directory.
pub(super) const NODE_RECORD: &str = ".node.json";

/// Name of the payload file inside each node directory.
pub(super) const NODE_DATA: &str = ".data";

/// Metadata stored alongside every node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct NodeRecord {
    /// Session that owns this node if it is ephemeral.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral_owner: Option<String>,

    pub acl: Acl,

    pub created_at: DateTime<Utc>,
}

impl NodeRecord {
    pub fn new(acl: &Acl, ephemeral_owner: Option<String>) -> Self {
        Self {
            ephemeral_owner,
            acl: acl.clone(),
            created_at: Utc::now(),
        }
    }

    /// Read the record of the node stored in `dir`.
    ///
    /// Returns `None` when `dir` is not (or no longer) a node.
    pub fn read(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(NODE_RECORD);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(crate::fs::io_failure("read node record", &path, e)),
        };

        serde_json::from_str(&content).map(Some).map_err(|e| {
            NsLockError::Unavailable(format!(
                "failed to parse node record '{}': {}",
                path.display(),
                e
            ))
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            NsLockError::Unavailable(format!("failed to serialize node record: {}", e))
        })
    }
}

/// Contents of a session lease file.
///
/// Liveness is judged from the file's modification time, which the owning
/// process refreshes; the contents are for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct SessionRecord {
    pub session_id: String,
    pub owner: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            owner: crate::executor::owner_string(),
            pid: std::process::id(),
            started_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            NsLockError::Unavailable(format!("failed to serialize session record: {}", e))
        })
    }
}
