//! Live view of the contenders queued under a lock path.

use crate::error::Result;
use crate::namespace::{Acl, Namespace, path};
use crate::wait::WaitToken;
use std::ops::ControlFlow;
use tracing::{debug, info};

const SEPARATOR: &str = "--------------------";

/// Prints the children of a lock path every time they change.
pub struct LockWatcher<N: Namespace> {
    namespace: N,
    lock_path: String,
}

impl<N: Namespace> LockWatcher<N> {
    /// Create a watcher, creating `lock_path` (and its ancestors) with `acl`
    /// if it does not exist yet.
    pub fn new(namespace: N, lock_path: &str, acl: &Acl) -> Result<Self> {
        path::validate(lock_path)?;
        if !namespace.exists(lock_path)? {
            namespace.ensure_path(lock_path, acl)?;
            info!(lock_path, "created lock path");
        }
        Ok(Self {
            namespace,
            lock_path: lock_path.to_string(),
        })
    }

    pub fn lock_path(&self) -> &str {
        &self.lock_path
    }

    /// Hand every snapshot of the sorted children to `on_change` until it
    /// breaks.
    ///
    /// The first snapshot is delivered immediately. Any watch notification
    /// triggers a fresh listing, so a deleted lock path or an expired session
    /// surfaces as an error from the next listing.
    pub fn watch_with<F>(&self, mut on_change: F) -> Result<()>
    where
        F: FnMut(&[String]) -> ControlFlow<()>,
    {
        let token = WaitToken::new();
        loop {
            self.namespace
                .watch_children(&self.lock_path, token.notifier())?;
            let mut children = self.namespace.list_children(&self.lock_path)?;
            children.sort();
            debug!(lock_path = %self.lock_path, count = children.len(), "children listed");

            if on_change(&children).is_break() {
                return Ok(());
            }
            token.wait();
        }
    }

    /// Print every snapshot to stdout. Returns only on a namespace error.
    pub fn watch(&self) -> Result<()> {
        self.watch_with(|children| {
            print!("{}", render_children(children));
            ControlFlow::Continue(())
        })
    }
}

/// Render one snapshot of a lock path's children.
pub fn render_children(children: &[String]) -> String {
    if children.is_empty() {
        return "No one has the lock at the moment...\n".to_string();
    }

    let mut out = String::from("Current lock nodes:\n");
    for child in children {
        out.push_str("  ");
        out.push_str(child);
        out.push('\n');
    }
    out.push_str(SEPARATOR);
    out.push('\n');
    out
}
