//! The coordination namespace capability.
//!
//! A namespace is a tree of nodes addressed by absolute paths. Nodes may be
//! persistent or ephemeral (bound to the session that created them), and may
//! ask the namespace to append a monotonically increasing sequence number to
//! their name. Clients observe changes through one-shot watches.
//!
//! Two backends are provided:
//! - [`MemoryNamespace`]: in-process, linearizable, with explicit sessions.
//! - [`FsNamespace`]: a directory tree shared between processes, with session
//!   leases kept alive by a heartbeat thread.

mod acl;
mod file;
mod memory;
pub mod path;

pub use acl::{Acl, AclEntry, Perms};
pub use file::{FsNamespace, FsOptions};
pub use memory::{MemoryNamespace, MemorySession};

use crate::error::Result;
use std::sync::Arc;

/// How a node is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    Persistent,
    PersistentSequential,
    /// Removed automatically when the creating session ends.
    Ephemeral,
    EphemeralSequential,
}

impl CreateMode {
    pub fn is_ephemeral(self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    pub fn is_sequential(self) -> bool {
        matches!(
            self,
            CreateMode::PersistentSequential | CreateMode::EphemeralSequential
        )
    }
}

/// Why a watch fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    /// A child was added to or removed from the watched node.
    NodeChildrenChanged,
    /// The watched node itself was deleted.
    NodeDeleted,
    /// The session that registered the watch ended.
    SessionClosed,
}

/// Notification delivered to a watch callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedEvent {
    pub kind: WatchEventKind,
    pub path: String,
}

/// One-shot watch callback.
///
/// Callbacks run on whichever thread observed the change and must not block.
pub type WatchCallback = Box<dyn FnOnce(WatchedEvent) + Send + 'static>;

/// Operations a coordination namespace offers to its clients.
///
/// Writes are visible to every client of the same namespace as soon as the
/// call returns.
pub trait Namespace: Send + Sync {
    /// Create a node and return its actual path (which differs from `path`
    /// for sequential modes).
    ///
    /// Fails with `NoNode` when the parent is missing, `NodeExists` when a
    /// non-sequential node already has this path, and `EphemeralParent` when
    /// the parent is ephemeral.
    fn create_node(&self, path: &str, data: &[u8], acl: &Acl, mode: CreateMode) -> Result<String>;

    /// Delete a node. Fails with `NoNode` if it is already gone and
    /// `NotEmpty` if it still has children.
    fn delete_node(&self, path: &str) -> Result<()>;

    fn exists(&self, path: &str) -> Result<bool>;

    /// Names (not paths) of the node's children, in no particular order.
    fn list_children(&self, path: &str) -> Result<Vec<String>>;

    fn read_data(&self, path: &str) -> Result<Vec<u8>>;

    /// Arm a one-shot watch on the node's children.
    ///
    /// The callback fires once, for the first change after registration.
    /// Register the watch before listing to avoid missing a change that lands
    /// between the two calls.
    fn watch_children(&self, path: &str, callback: WatchCallback) -> Result<()>;

    /// Create a node unless it already exists.
    ///
    /// For non-sequential modes an existing node counts as success, so
    /// concurrent callers race harmlessly.
    fn ensure_node(&self, path: &str, mode: CreateMode, acl: &Acl) -> Result<String> {
        match self.create_node(path, &[], acl, mode) {
            Err(e) if e.is_node_exists() && !mode.is_sequential() => Ok(path.to_string()),
            other => other,
        }
    }

    /// Ensure `path` and all of its ancestors exist as persistent nodes.
    fn ensure_path(&self, path: &str, acl: &Acl) -> Result<()> {
        path::validate(path)?;
        for prefix in path::lineage(path) {
            if !self.exists(prefix)? {
                self.ensure_node(prefix, CreateMode::Persistent, acl)?;
            }
        }
        Ok(())
    }
}

impl<N: Namespace + ?Sized> Namespace for Arc<N> {
    fn create_node(&self, path: &str, data: &[u8], acl: &Acl, mode: CreateMode) -> Result<String> {
        (**self).create_node(path, data, acl, mode)
    }

    fn delete_node(&self, path: &str) -> Result<()> {
        (**self).delete_node(path)
    }

    fn exists(&self, path: &str) -> Result<bool> {
        (**self).exists(path)
    }

    fn list_children(&self, path: &str) -> Result<Vec<String>> {
        (**self).list_children(path)
    }

    fn read_data(&self, path: &str) -> Result<Vec<u8>> {
        (**self).read_data(path)
    }

    fn watch_children(&self, path: &str, callback: WatchCallback) -> Result<()> {
        (**self).watch_children(path, callback)
    }
}

impl<N: Namespace + ?Sized> Namespace for &N {
    fn create_node(&self, path: &str, data: &[u8], acl: &Acl, mode: CreateMode) -> Result<String> {
        (**self).create_node(path, data, acl, mode)
    }

    fn delete_node(&self, path: &str) -> Result<()> {
        (**self).delete_node(path)
    }

    fn exists(&self, path: &str) -> Result<bool> {
        (**self).exists(path)
    }

    fn list_children(&self, path: &str) -> Result<Vec<String>> {
        (**self).list_children(path)
    }

    fn read_data(&self, path: &str) -> Result<Vec<u8>> {
        (**self).read_data(path)
    }

    fn watch_children(&self, path: &str, callback: WatchCallback) -> Result<()> {
        (**self).watch_children(path, callback)
    }
}
