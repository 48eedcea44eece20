//! Namespace path handling.
//!
//! Paths are absolute and `/`-separated. Sequential nodes carry a
//! zero-padded decimal suffix of [`SEQUENCE_DIGITS`] digits appended to the
//! requested name.

use crate::error::{NsLockError, Result};

/// The namespace root.
pub const ROOT: &str = "/";

/// Width of the sequence suffix on sequential nodes.
pub const SEQUENCE_DIGITS: usize = 10;

/// Check that `path` is an absolute namespace path.
pub fn validate(path: &str) -> Result<()> {
    if path == ROOT {
        return Ok(());
    }
    if !path.starts_with('/') {
        return Err(NsLockError::invalid_path(path, "must start with '/'"));
    }
    if path.ends_with('/') {
        return Err(NsLockError::invalid_path(path, "must not end with '/'"));
    }
    if path.contains('\0') {
        return Err(NsLockError::invalid_path(path, "must not contain NUL"));
    }
    for segment in path[1..].split('/') {
        match segment {
            "" => return Err(NsLockError::invalid_path(path, "empty segment")),
            "." | ".." => {
                return Err(NsLockError::invalid_path(
                    path,
                    "relative segments are not allowed",
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Join a parent path and a child name.
pub fn join(parent: &str, child: &str) -> String {
    if parent == ROOT {
        format!("/{}", child)
    } else {
        format!("{}/{}", parent, child)
    }
}

/// Parent of a validated path; `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last segment of a validated path; empty for the root.
pub fn node_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

/// Every non-root prefix of `path`, shallowest first, ending with `path`.
pub fn lineage(path: &str) -> Vec<&str> {
    if path == ROOT {
        return Vec::new();
    }
    let mut prefixes: Vec<&str> = path
        .match_indices('/')
        .skip(1)
        .map(|(idx, _)| &path[..idx])
        .collect();
    prefixes.push(path);
    prefixes
}

/// Append a sequence number to a requested node path.
pub fn with_sequence(path: &str, sequence: u64) -> String {
    format!("{}{:0width$}", path, sequence, width = SEQUENCE_DIGITS)
}

/// The sequence number embedded at the end of a node name, if any.
pub fn sequence_of(name: &str) -> Option<u64> {
    let suffix = name.get(name.len().checked_sub(SEQUENCE_DIGITS)?..)?;
    if !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}
