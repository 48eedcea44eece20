//! Config struct definition and default implementation.

use super::types::*;
use crate::namespace::Acl;
use serde::{Deserialize, Serialize};

/// Configuration for nslock.
///
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Session settings
    // =========================================================================
    /// Milliseconds after which a session that stopped heartbeating is
    /// considered dead and its ephemeral nodes are reaped.
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    /// Milliseconds between checks of armed watches.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    // =========================================================================
    // Lock settings
    // =========================================================================
    /// How long `exec` waits for the lock when `--timeout-ms` is not given.
    /// Unset means wait indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_timeout_ms: Option<u64>,

    /// Name prefix of contender entries (default: "lock-").
    #[serde(default = "default_contender_prefix")]
    pub contender_prefix: String,

    /// ACL applied to lock paths and contender entries.
    #[serde(default = "default_acl")]
    pub acl: Acl,

    // =========================================================================
    // Logging
    // =========================================================================
    /// `tracing` filter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_timeout_ms: default_session_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            default_timeout_ms: None,
            contender_prefix: default_contender_prefix(),
            acl: default_acl(),
            log_filter: default_log_filter(),
        }
    }
}
