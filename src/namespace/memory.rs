//! In-process namespace.
//!
//! `MemoryNamespace` plays the role of the coordination server: every
//! [`MemorySession`] obtained from it sees one linearizable tree. Ephemeral
//! nodes belong to the session that created them and disappear when that
//! session is closed or dropped.
//!
//! Watch callbacks are collected while the tree lock is held and invoked
//! after it is released, on the thread that made the change.

use super::{Acl, CreateMode, Namespace, WatchCallback, WatchEventKind, WatchedEvent, path};
use crate::error::{NsLockError, Result};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// An in-process coordination namespace.
#[derive(Clone, Default)]
pub struct MemoryNamespace {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    tree: Mutex<Tree>,
    next_session: AtomicU64,
}

struct Node {
    data: Vec<u8>,
    acl: Acl,
    ephemeral_owner: Option<u64>,
    children: BTreeSet<String>,
    next_sequence: u64,
}

impl Node {
    fn new(data: &[u8], acl: &Acl, ephemeral_owner: Option<u64>) -> Self {
        Self {
            data: data.to_vec(),
            acl: acl.clone(),
            ephemeral_owner,
            children: BTreeSet::new(),
            next_sequence: 0,
        }
    }
}

struct ArmedWatch {
    session: u64,
    callback: WatchCallback,
}

type Fired = Vec<(WatchCallback, WatchedEvent)>;

struct Tree {
    nodes: HashMap<String, Node>,
    live_sessions: HashSet<u64>,
    watches: HashMap<String, Vec<ArmedWatch>>,
}

impl Default for Tree {
    fn default() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(path::ROOT.to_string(), Node::new(&[], &Acl::open_unsafe(), None));
        Self {
            nodes,
            live_sessions: HashSet::new(),
            watches: HashMap::new(),
        }
    }
}

impl Tree {
    fn check_session(&self, session: u64) -> Result<()> {
        if self.live_sessions.contains(&session) {
            Ok(())
        } else {
            Err(NsLockError::SessionExpired(format!("session {} is closed", session)))
        }
    }

    fn node(&self, node_path: &str) -> Result<&Node> {
        self.nodes
            .get(node_path)
            .ok_or_else(|| NsLockError::NoNode(node_path.to_string()))
    }

    fn trigger(&mut self, node_path: &str, kind: WatchEventKind, fired: &mut Fired) {
        if let Some(armed) = self.watches.remove(node_path) {
            for watch in armed {
                let event = WatchedEvent {
                    kind,
                    path: node_path.to_string(),
                };
                fired.push((watch.callback, event));
            }
        }
    }

    fn create(
        &mut self,
        session: u64,
        requested: &str,
        data: &[u8],
        acl: &Acl,
        mode: CreateMode,
        fired: &mut Fired,
    ) -> Result<String> {
        path::validate(requested)?;
        let parent_path = path::parent(requested)
            .ok_or_else(|| NsLockError::NodeExists(requested.to_string()))?;

        let parent = self
            .nodes
            .get_mut(parent_path)
            .ok_or_else(|| NsLockError::NoNode(parent_path.to_string()))?;
        if parent.ephemeral_owner.is_some() {
            return Err(NsLockError::EphemeralParent(parent_path.to_string()));
        }

        let actual = if mode.is_sequential() {
            let sequence = parent.next_sequence;
            parent.next_sequence += 1;
            path::with_sequence(requested, sequence)
        } else {
            requested.to_string()
        };

        if self.nodes.contains_key(&actual) {
            return Err(NsLockError::NodeExists(actual));
        }

        let owner = mode.is_ephemeral().then_some(session);
        self.nodes.insert(actual.clone(), Node::new(data, acl, owner));
        if let Some(parent) = self.nodes.get_mut(parent_path) {
            parent.children.insert(path::node_name(&actual).to_string());
        }
        self.trigger(parent_path, WatchEventKind::NodeChildrenChanged, fired);
        Ok(actual)
    }

    fn delete(&mut self, node_path: &str, fired: &mut Fired) -> Result<()> {
        path::validate(node_path)?;
        let parent_path = path::parent(node_path)
            .ok_or_else(|| NsLockError::invalid_path(node_path, "cannot delete the root"))?;

        if !self.node(node_path)?.children.is_empty() {
            return Err(NsLockError::NotEmpty(node_path.to_string()));
        }

        self.nodes.remove(node_path);
        if let Some(parent) = self.nodes.get_mut(parent_path) {
            parent.children.remove(path::node_name(node_path));
        }
        self.trigger(node_path, WatchEventKind::NodeDeleted, fired);
        self.trigger(parent_path, WatchEventKind::NodeChildrenChanged, fired);
        Ok(())
    }
}

fn deliver(fired: Fired) {
    for (callback, event) in fired {
        callback(event);
    }
}

impl MemoryNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new session against this namespace.
    pub fn connect(&self) -> MemorySession {
        let id = self.shared.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        self.shared.tree.lock().live_sessions.insert(id);
        debug!(session = id, "memory session opened");
        MemorySession {
            shared: Arc::clone(&self.shared),
            id,
        }
    }

    /// Number of sessions that have not been closed.
    pub fn live_sessions(&self) -> usize {
        self.shared.tree.lock().live_sessions.len()
    }
}

/// A client session on a [`MemoryNamespace`].
///
/// Dropping the session closes it.
pub struct MemorySession {
    shared: Arc<Shared>,
    id: u64,
}

impl MemorySession {
    /// End the session: delete its ephemeral nodes and fire its pending
    /// watches with [`WatchEventKind::SessionClosed`]. Idempotent.
    pub fn close(&self) {
        let mut fired = Fired::new();
        {
            let mut tree = self.shared.tree.lock();
            if !tree.live_sessions.remove(&self.id) {
                return;
            }

            let mut owned: Vec<String> = tree
                .nodes
                .iter()
                .filter(|(_, node)| node.ephemeral_owner == Some(self.id))
                .map(|(p, _)| p.clone())
                .collect();
            owned.sort();
            for node_path in &owned {
                if let Err(e) = tree.delete(node_path, &mut fired) {
                    debug!(path = %node_path, error = %e, "ephemeral node already gone");
                }
            }

            for (watched, armed) in tree.watches.iter_mut() {
                let (mine, others): (Vec<_>, Vec<_>) =
                    armed.drain(..).partition(|w| w.session == self.id);
                *armed = others;
                for watch in mine {
                    let event = WatchedEvent {
                        kind: WatchEventKind::SessionClosed,
                        path: watched.clone(),
                    };
                    fired.push((watch.callback, event));
                }
            }
            tree.watches.retain(|_, armed| !armed.is_empty());
            debug!(session = self.id, removed = owned.len(), "memory session closed");
        }
        deliver(fired);
    }

    /// The ACL a node was created with.
    pub fn acl(&self, path: &str) -> Result<Acl> {
        let tree = self.shared.tree.lock();
        tree.check_session(self.id)?;
        Ok(tree.node(path)?.acl.clone())
    }

    pub fn is_closed(&self) -> bool {
        !self.shared.tree.lock().live_sessions.contains(&self.id)
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.close();
    }
}

impl Namespace for MemorySession {
    fn create_node(&self, path: &str, data: &[u8], acl: &Acl, mode: CreateMode) -> Result<String> {
        let mut fired = Fired::new();
        let created = {
            let mut tree = self.shared.tree.lock();
            tree.check_session(self.id)?;
            tree.create(self.id, path, data, acl, mode, &mut fired)?
        };
        deliver(fired);
        Ok(created)
    }

    fn delete_node(&self, path: &str) -> Result<()> {
        let mut fired = Fired::new();
        {
            let mut tree = self.shared.tree.lock();
            tree.check_session(self.id)?;
            tree.delete(path, &mut fired)?;
        }
        deliver(fired);
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool> {
        path::validate(path)?;
        let tree = self.shared.tree.lock();
        tree.check_session(self.id)?;
        Ok(tree.nodes.contains_key(path))
    }

    fn list_children(&self, path: &str) -> Result<Vec<String>> {
        path::validate(path)?;
        let tree = self.shared.tree.lock();
        tree.check_session(self.id)?;
        Ok(tree.node(path)?.children.iter().cloned().collect())
    }

    fn read_data(&self, path: &str) -> Result<Vec<u8>> {
        path::validate(path)?;
        let tree = self.shared.tree.lock();
        tree.check_session(self.id)?;
        Ok(tree.node(path)?.data.clone())
    }

    fn watch_children(&self, path: &str, callback: WatchCallback) -> Result<()> {
        path::validate(path)?;
        let mut tree = self.shared.tree.lock();
        tree.check_session(self.id)?;
        tree.node(path)?;
        tree.watches
            .entry(path.to_string())
            .or_default()
            .push(ArmedWatch {
                session: self.id,
                callback,
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn recorder() -> (WatchCallback, mpsc::Receiver<WatchedEvent>) {
        let (tx, rx) = mpsc::channel();
        let callback: WatchCallback = Box::new(move |event| {
            let _ = tx.send(event);
        });
        (callback, rx)
    }

    #[test]
    fn create_requires_parent() {
        let session = MemoryNamespace::new().connect();
        let err = session
            .create_node("/missing/child", b"", &Acl::open_unsafe(), CreateMode::Persistent)
            .unwrap_err();
        assert!(matches!(err, NsLockError::NoNode(p) if p == "/missing"));
    }

    #[test]
    fn duplicate_create_fails_but_ensure_succeeds() {
        let session = MemoryNamespace::new().connect();
        let acl = Acl::open_unsafe();
        session.create_node("/locks", b"", &acl, CreateMode::Persistent).unwrap();

        let err = session
            .create_node("/locks", b"", &acl, CreateMode::Persistent)
            .unwrap_err();
        assert!(err.is_node_exists());
        assert_eq!(
            session.ensure_node("/locks", CreateMode::Persistent, &acl).unwrap(),
            "/locks"
        );
    }

    #[test]
    fn ensure_path_creates_ancestors() {
        let session = MemoryNamespace::new().connect();
        session.ensure_path("/app/locks/write", &Acl::open_unsafe()).unwrap();

        assert!(session.exists("/app").unwrap());
        assert!(session.exists("/app/locks").unwrap());
        assert_eq!(session.list_children("/app/locks").unwrap(), vec!["write"]);
    }

    #[test]
    fn sequential_names_increase_and_are_never_reused() {
        let session = MemoryNamespace::new().connect();
        let acl = Acl::open_unsafe();
        session.ensure_path("/locks", &acl).unwrap();

        let first = session
            .create_node("/locks/lock-", b"", &acl, CreateMode::EphemeralSequential)
            .unwrap();
        session.delete_node(&first).unwrap();
        let second = session
            .create_node("/locks/lock-", b"", &acl, CreateMode::EphemeralSequential)
            .unwrap();

        assert_eq!(first, "/locks/lock-0000000000");
        assert_eq!(second, "/locks/lock-0000000001");
    }

    #[test]
    fn delete_missing_node_is_no_node() {
        let session = MemoryNamespace::new().connect();
        assert!(session.delete_node("/nothing").unwrap_err().is_no_node());
    }

    #[test]
    fn delete_refuses_non_empty_node() {
        let session = MemoryNamespace::new().connect();
        session.ensure_path("/a/b", &Acl::open_unsafe()).unwrap();
        assert!(matches!(
            session.delete_node("/a").unwrap_err(),
            NsLockError::NotEmpty(_)
        ));
    }

    #[test]
    fn ephemeral_nodes_cannot_have_children() {
        let session = MemoryNamespace::new().connect();
        let acl = Acl::open_unsafe();
        session.create_node("/e", b"", &acl, CreateMode::Ephemeral).unwrap();
        let err = session
            .create_node("/e/child", b"", &acl, CreateMode::Persistent)
            .unwrap_err();
        assert!(matches!(err, NsLockError::EphemeralParent(_)));
    }

    #[test]
    fn acl_is_stored_with_node() {
        let session = MemoryNamespace::new().connect();
        session
            .create_node("/n", b"", &Acl::read_unsafe(), CreateMode::Persistent)
            .unwrap();
        assert_eq!(session.acl("/n").unwrap(), Acl::read_unsafe());
    }

    #[test]
    fn data_is_stored_with_node() {
        let session = MemoryNamespace::new().connect();
        session
            .create_node("/n", b"payload", &Acl::open_unsafe(), CreateMode::Persistent)
            .unwrap();
        assert_eq!(session.read_data("/n").unwrap(), b"payload");
    }

    #[test]
    fn watch_fires_once_on_child_change() {
        let server = MemoryNamespace::new();
        let watcher = server.connect();
        let writer = server.connect();
        let acl = Acl::open_unsafe();
        watcher.ensure_path("/locks", &acl).unwrap();

        let (callback, rx) = recorder();
        watcher.watch_children("/locks", callback).unwrap();

        writer.create_node("/locks/a", b"", &acl, CreateMode::Ephemeral).unwrap();
        writer.create_node("/locks/b", b"", &acl, CreateMode::Ephemeral).unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, WatchEventKind::NodeChildrenChanged);
        assert_eq!(event.path, "/locks");
        assert!(rx.try_recv().is_err(), "watch must fire only once");
    }

    #[test]
    fn watch_on_missing_node_fails() {
        let session = MemoryNamespace::new().connect();
        let (callback, _rx) = recorder();
        assert!(session.watch_children("/missing", callback).unwrap_err().is_no_node());
    }

    #[test]
    fn closing_session_removes_ephemerals_and_notifies_others() {
        let server = MemoryNamespace::new();
        let observer = server.connect();
        let owner = server.connect();
        let acl = Acl::open_unsafe();
        observer.ensure_path("/locks", &acl).unwrap();
        owner
            .create_node("/locks/lock-", b"", &acl, CreateMode::EphemeralSequential)
            .unwrap();
        owner.create_node("/locks/keep", b"", &acl, CreateMode::Persistent).unwrap();

        let (callback, rx) = recorder();
        observer.watch_children("/locks", callback).unwrap();
        drop(owner);

        assert_eq!(rx.try_recv().unwrap().kind, WatchEventKind::NodeChildrenChanged);
        assert_eq!(observer.list_children("/locks").unwrap(), vec!["keep"]);
        assert_eq!(server.live_sessions(), 1);
    }

    #[test]
    fn closing_session_fires_its_own_watches_and_rejects_calls() {
        let server = MemoryNamespace::new();
        let session = server.connect();
        session.ensure_path("/locks", &Acl::open_unsafe()).unwrap();

        let (callback, rx) = recorder();
        session.watch_children("/locks", callback).unwrap();
        session.close();

        assert_eq!(rx.try_recv().unwrap().kind, WatchEventKind::SessionClosed);
        assert!(session.is_closed());
        assert!(matches!(
            session.list_children("/locks").unwrap_err(),
            NsLockError::SessionExpired(_)
        ));
    }

    #[test]
    fn deleting_watched_node_reports_node_deleted() {
        let session = MemoryNamespace::new().connect();
        session.ensure_path("/locks", &Acl::open_unsafe()).unwrap();

        let (callback, rx) = recorder();
        session.watch_children("/locks", callback).unwrap();
        session.delete_node("/locks").unwrap();

        assert_eq!(rx.try_recv().unwrap().kind, WatchEventKind::NodeDeleted);
    }
}
