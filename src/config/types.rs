//! Default values for config fields.

use crate::executor::DEFAULT_CONTENDER_PREFIX;
use crate::namespace::Acl;

pub fn default_session_timeout_ms() -> u64 {
    10_000
}

pub fn default_poll_interval_ms() -> u64 {
    50
}

pub fn default_contender_prefix() -> String {
    DEFAULT_CONTENDER_PREFIX.to_string()
}

pub fn default_acl() -> Acl {
    Acl::open_unsafe()
}

pub fn default_log_filter() -> String {
    "info".to_string()
}
