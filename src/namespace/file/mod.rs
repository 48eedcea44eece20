//! Directory-backed namespace shared between processes.
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   tree/                  the namespace root node "/"
//!     locks/               node "/locks"
//!       .node.json         ephemeral owner, ACL, creation time
//!       .data              node payload
//!       .sequence          next sequence number for sequential children
//!       lock-0000000003/   node "/locks/lock-0000000003"
//!   sessions/
//!     <session-id>.json    session lease, kept fresh by a heartbeat
//! ```
//!
//! Names starting with `.` are reserved for bookkeeping and never appear as
//! children. A node is built in a hidden staging directory and renamed into
//! place, so listings only ever see complete nodes. Deletion renames the node
//! aside before removing it.
//!
//! # Sessions
//!
//! Every [`FsNamespace`] is one session. A background thread refreshes the
//! session's lease file and polls armed watches. Ephemeral nodes whose owning
//! lease is missing or older than the session timeout are reaped by whichever
//! client lists their parent next.

mod record;
mod sequence;

use super::{Acl, CreateMode, Namespace, WatchCallback, WatchEventKind, WatchedEvent, path};
use crate::config::Config;
use crate::error::{NsLockError, Result};
use crate::fs::{atomic_write_file, io_failure};
use parking_lot::Mutex;
use record::{NODE_DATA, NODE_RECORD, NodeRecord, SessionRecord};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

const TREE_DIR: &str = "tree";
const SESSIONS_DIR: &str = "sessions";

/// Tuning for a directory-backed namespace session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsOptions {
    /// A session whose lease has not been refreshed for this long is expired.
    pub session_timeout: Duration,

    /// How often armed watches are re-checked.
    pub poll_interval: Duration,
}

impl Default for FsOptions {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl From<&Config> for FsOptions {
    fn from(config: &Config) -> Self {
        Self {
            session_timeout: config.session_timeout(),
            poll_interval: config.poll_interval(),
        }
    }
}

struct PendingWatch {
    path: String,
    /// Children at registration time; `None` if the node was already gone.
    snapshot: Option<BTreeSet<String>>,
    callback: WatchCallback,
}

struct FsShared {
    tree_dir: PathBuf,
    lease_path: PathBuf,
    sessions_dir: PathBuf,
    session_id: String,
    options: FsOptions,
    closed: AtomicBool,
    heartbeat_paused: AtomicBool,
    ephemerals: Mutex<BTreeSet<String>>,
    watches: Mutex<Vec<PendingWatch>>,
}

/// A session on a directory-backed namespace.
pub struct FsNamespace {
    shared: Arc<FsShared>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl FsNamespace {
    /// Open a session on the namespace rooted at `root`, creating the root
    /// layout if needed.
    pub fn open<P: AsRef<Path>>(root: P, options: FsOptions) -> Result<Self> {
        let root = root.as_ref();
        let tree_dir = root.join(TREE_DIR);
        let sessions_dir = root.join(SESSIONS_DIR);
        for dir in [&tree_dir, &sessions_dir] {
            fs::create_dir_all(dir).map_err(|e| io_failure("create namespace directory", dir, e))?;
        }

        let session_id = Uuid::new_v4().simple().to_string();
        let lease_path = sessions_dir.join(format!("{}.json", session_id));
        atomic_write_file(&lease_path, &SessionRecord::new(&session_id).to_json()?)?;

        let shared = Arc::new(FsShared {
            tree_dir,
            lease_path,
            sessions_dir,
            session_id,
            options,
            closed: AtomicBool::new(false),
            heartbeat_paused: AtomicBool::new(false),
            ephemerals: Mutex::new(BTreeSet::new()),
            watches: Mutex::new(Vec::new()),
        });

        let poller_shared = Arc::clone(&shared);
        let poller = thread::Builder::new()
            .name("nslock-fs-poller".to_string())
            .spawn(move || run_poller(poller_shared))
            .map_err(|e| io_failure("start poller for", root, e))?;

        info!(root = %root.display(), session = %shared.session_id, "opened namespace session");
        Ok(Self {
            shared,
            poller: Mutex::new(Some(poller)),
        })
    }

    /// Open a session from a connection string: a directory path, optionally
    /// prefixed with `file://`.
    pub fn connect(connect: &str, options: FsOptions) -> Result<Self> {
        let root = connect.strip_prefix("file://").unwrap_or(connect);
        if root.is_empty() {
            return Err(NsLockError::UserError(
                "connection string must name a namespace directory".to_string(),
            ));
        }
        Self::open(root, options)
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    /// End the session: delete its ephemeral nodes, drop its lease and fire
    /// pending watches with [`WatchEventKind::SessionClosed`]. Idempotent.
    pub fn close(&self) {
        self.shared.close();
        if let Some(handle) = self.poller.lock().take()
            && handle.join().is_err()
        {
            warn!("namespace poller thread panicked");
        }
    }

    /// Stop refreshing the lease, as if the process had hung.
    #[cfg(test)]
    pub(crate) fn suspend_heartbeat(&self) {
        self.shared.heartbeat_paused.store(true, Ordering::SeqCst);
    }
}

impl Drop for FsNamespace {
    fn drop(&mut self) {
        self.close();
    }
}

impl FsShared {
    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(NsLockError::SessionExpired(format!(
                "session {} is closed",
                self.session_id
            )))
        } else {
            Ok(())
        }
    }

    fn node_dir(&self, node_path: &str) -> Result<PathBuf> {
        path::validate(node_path)?;
        let mut dir = self.tree_dir.clone();
        if node_path != path::ROOT {
            for segment in node_path[1..].split('/') {
                if segment.starts_with('.') {
                    return Err(NsLockError::invalid_path(
                        node_path,
                        "segments starting with '.' are reserved",
                    ));
                }
                dir.push(segment);
            }
        }
        Ok(dir)
    }

    fn record(&self, node_path: &str) -> Result<Option<NodeRecord>> {
        if node_path == path::ROOT {
            return Ok(Some(NodeRecord::new(&Acl::open_unsafe(), None)));
        }
        NodeRecord::read(&self.node_dir(node_path)?)
    }

    fn is_node(&self, node_path: &str) -> Result<bool> {
        if node_path == path::ROOT {
            return Ok(true);
        }
        Ok(self.node_dir(node_path)?.join(NODE_RECORD).is_file())
    }

    fn session_alive(&self, session_id: &str) -> bool {
        if session_id == self.session_id {
            return !self.closed.load(Ordering::SeqCst);
        }
        let lease = self.sessions_dir.join(format!("{}.json", session_id));
        match fs::metadata(&lease).and_then(|m| m.modified()) {
            Ok(modified) => SystemTime::now()
                .duration_since(modified)
                .map(|age| age < self.options.session_timeout)
                .unwrap_or(true),
            Err(e) => e.kind() != io::ErrorKind::NotFound,
        }
    }

    /// Sorted child names, reaping ephemeral children of expired sessions.
    fn children(&self, node_path: &str) -> Result<BTreeSet<String>> {
        let dir = self.node_dir(node_path)?;
        let entries = fs::read_dir(&dir).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                NsLockError::NoNode(node_path.to_string())
            } else {
                io_failure("list children of", &dir, e)
            }
        })?;

        let mut names = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_failure("read directory entry in", &dir, e))?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let Some(record) = NodeRecord::read(&entry.path())? else {
                continue;
            };
            if let Some(owner) = &record.ephemeral_owner
                && !self.session_alive(owner)
            {
                self.reap(&path::join(node_path, &name), owner);
                continue;
            }
            names.insert(name);
        }
        Ok(names)
    }

    fn reap(&self, node_path: &str, owner: &str) {
        match self.remove_node(node_path) {
            Ok(()) => info!(path = %node_path, session = %owner, "reaped node of expired session"),
            Err(e) if e.is_no_node() => {}
            Err(e) => warn!(path = %node_path, error = %e, "failed to reap expired node"),
        }
    }

    /// Move the node directory aside and delete it.
    fn remove_node(&self, node_path: &str) -> Result<()> {
        let tomb = self.move_aside(node_path)?;
        self.purge(node_path, &tomb);
        Ok(())
    }

    /// Like [`remove_node`](Self::remove_node), but put the node back and
    /// fail with `NotEmpty` if it turns out to have children once it is out
    /// of reach of concurrent creates.
    fn remove_empty_node(&self, node_path: &str) -> Result<()> {
        let tomb = self.move_aside(node_path)?;
        if has_node_entries(&tomb)? {
            let dir = self.node_dir(node_path)?;
            return match fs::rename(&tomb, &dir) {
                Ok(()) => Err(NsLockError::NotEmpty(node_path.to_string())),
                Err(e) => {
                    warn!(path = %node_path, tomb = %tomb.display(), error = %e, "failed to restore non-empty node");
                    Err(io_failure("restore node", &dir, e))
                }
            };
        }
        self.purge(node_path, &tomb);
        Ok(())
    }

    fn move_aside(&self, node_path: &str) -> Result<PathBuf> {
        let dir = self.node_dir(node_path)?;
        let parent = dir
            .parent()
            .ok_or_else(|| NsLockError::invalid_path(node_path, "cannot delete the root"))?;
        let tomb = parent.join(format!(".deleted-{}", Uuid::new_v4().simple()));

        fs::rename(&dir, &tomb).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                NsLockError::NoNode(node_path.to_string())
            } else {
                io_failure("delete node", &dir, e)
            }
        })?;
        Ok(tomb)
    }

    fn purge(&self, node_path: &str, tomb: &Path) {
        if let Err(e) = fs::remove_dir_all(tomb) {
            debug!(path = %tomb.display(), error = %e, "leaving deleted node behind");
        }
        self.ephemerals.lock().remove(node_path);
    }

    fn poll_watches(&self) {
        let mut fired = Vec::new();
        {
            let mut watches = self.watches.lock();
            let pending = std::mem::take(&mut *watches);
            for watch in pending {
                let current = match self.is_node(&watch.path) {
                    Ok(true) => match self.children(&watch.path) {
                        Ok(children) => Some(children),
                        Err(e) if e.is_no_node() => None,
                        Err(e) => {
                            warn!(path = %watch.path, error = %e, "failed to poll watch");
                            watches.push(watch);
                            continue;
                        }
                    },
                    Ok(false) => None,
                    Err(e) => {
                        warn!(path = %watch.path, error = %e, "failed to poll watch");
                        watches.push(watch);
                        continue;
                    }
                };

                if current == watch.snapshot {
                    watches.push(watch);
                    continue;
                }
                let kind = if current.is_some() {
                    WatchEventKind::NodeChildrenChanged
                } else {
                    WatchEventKind::NodeDeleted
                };
                fired.push((
                    watch.callback,
                    WatchedEvent {
                        kind,
                        path: watch.path,
                    },
                ));
            }
        }

        for (callback, event) in fired {
            callback(event);
        }
    }

    fn heartbeat(&self) {
        if self.heartbeat_paused.load(Ordering::SeqCst) {
            return;
        }
        let touched = fs::File::options()
            .write(true)
            .open(&self.lease_path)
            .and_then(|file| file.set_modified(SystemTime::now()));
        match touched {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(session = %self.session_id, "session lease vanished, rewriting it");
                let rewritten = SessionRecord::new(&self.session_id)
                    .to_json()
                    .and_then(|json| atomic_write_file(&self.lease_path, &json));
                if let Err(e) = rewritten {
                    warn!(session = %self.session_id, error = %e, "failed to rewrite session lease");
                }
            }
            Err(e) => warn!(session = %self.session_id, error = %e, "failed to refresh session lease"),
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let owned = std::mem::take(&mut *self.ephemerals.lock());
        for node_path in owned.iter().rev() {
            match self.remove_node(node_path) {
                Ok(()) => {}
                Err(e) if e.is_no_node() => {}
                Err(e) => warn!(path = %node_path, error = %e, "failed to remove ephemeral node"),
            }
        }

        if let Err(e) = fs::remove_file(&self.lease_path)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!(session = %self.session_id, error = %e, "failed to remove session lease");
        }

        let pending = std::mem::take(&mut *self.watches.lock());
        for watch in pending {
            (watch.callback)(WatchedEvent {
                kind: WatchEventKind::SessionClosed,
                path: watch.path,
            });
        }
        info!(session = %self.session_id, removed = owned.len(), "closed namespace session");
    }
}

/// Whether `dir` holds any published child node.
fn has_node_entries(dir: &Path) -> Result<bool> {
    let entries = fs::read_dir(dir).map_err(|e| io_failure("read directory", dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_failure("read directory entry in", dir, e))?;
        let is_hidden = entry.file_name().to_str().is_none_or(|name| name.starts_with('.'));
        if !is_hidden && NodeRecord::read(&entry.path())?.is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

fn run_poller(shared: Arc<FsShared>) {
    let heartbeat_every = shared.options.session_timeout / 3;
    let mut last_beat = Instant::now();

    while !shared.closed.load(Ordering::SeqCst) {
        thread::sleep(shared.options.poll_interval);
        if shared.closed.load(Ordering::SeqCst) {
            break;
        }
        if last_beat.elapsed() >= heartbeat_every {
            shared.heartbeat();
            last_beat = Instant::now();
        }
        shared.poll_watches();
    }
}

impl Namespace for FsNamespace {
    fn create_node(&self, node_path: &str, data: &[u8], acl: &Acl, mode: CreateMode) -> Result<String> {
        let shared = &self.shared;
        shared.check_open()?;
        let dir = shared.node_dir(node_path)?;
        let parent_path = path::parent(node_path)
            .ok_or_else(|| NsLockError::NodeExists(node_path.to_string()))?;
        let parent_dir = dir
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| NsLockError::NodeExists(node_path.to_string()))?;

        let parent = shared
            .record(parent_path)?
            .ok_or_else(|| NsLockError::NoNode(parent_path.to_string()))?;
        if parent.ephemeral_owner.is_some() {
            return Err(NsLockError::EphemeralParent(parent_path.to_string()));
        }

        let owner = mode.is_ephemeral().then(|| shared.session_id.clone());
        let record = NodeRecord::new(acl, owner);
        let staging = parent_dir.join(format!(".staging-{}", Uuid::new_v4().simple()));
        let staged = fs::create_dir(&staging)
            .and_then(|()| fs::write(staging.join(NODE_DATA), data))
            .map_err(|e| io_failure("stage node", &staging, e))
            .and_then(|()| record.to_json())
            .and_then(|json| {
                fs::write(staging.join(NODE_RECORD), json)
                    .map_err(|e| io_failure("stage node", &staging, e))
            });
        if let Err(e) = staged {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        let publish = |actual: String| -> Result<String> {
            let target = parent_dir.join(path::node_name(&actual));
            match fs::rename(&staging, &target) {
                Ok(()) => Ok(actual),
                Err(e) => Err(match e.kind() {
                    io::ErrorKind::AlreadyExists | io::ErrorKind::DirectoryNotEmpty => {
                        NsLockError::NodeExists(actual)
                    }
                    io::ErrorKind::NotFound => NsLockError::NoNode(parent_path.to_string()),
                    _ => io_failure("create node", &target, e),
                }),
            }
        };
        let created = if mode.is_sequential() {
            sequence::with_next_sequence(&parent_dir, shared.options.session_timeout, |sequence| {
                publish(path::with_sequence(node_path, sequence))
            })
        } else {
            publish(node_path.to_string())
        };
        let actual = match created {
            Ok(actual) => actual,
            Err(e) => {
                let _ = fs::remove_dir_all(&staging);
                return Err(e);
            }
        };

        if mode.is_ephemeral() {
            shared.ephemerals.lock().insert(actual.clone());
        }
        debug!(path = %actual, ?mode, "created node");
        shared.poll_watches();
        Ok(actual)
    }

    fn delete_node(&self, node_path: &str) -> Result<()> {
        let shared = &self.shared;
        shared.check_open()?;
        if node_path == path::ROOT {
            return Err(NsLockError::invalid_path(node_path, "cannot delete the root"));
        }
        if !shared.is_node(node_path)? {
            return Err(NsLockError::NoNode(node_path.to_string()));
        }
        if !shared.children(node_path)?.is_empty() {
            return Err(NsLockError::NotEmpty(node_path.to_string()));
        }

        shared.remove_empty_node(node_path)?;
        debug!(path = %node_path, "deleted node");
        shared.poll_watches();
        Ok(())
    }

    fn exists(&self, node_path: &str) -> Result<bool> {
        self.shared.check_open()?;
        self.shared.is_node(node_path)
    }

    fn list_children(&self, node_path: &str) -> Result<Vec<String>> {
        let shared = &self.shared;
        shared.check_open()?;
        if !shared.is_node(node_path)? {
            return Err(NsLockError::NoNode(node_path.to_string()));
        }
        Ok(shared.children(node_path)?.into_iter().collect())
    }

    fn read_data(&self, node_path: &str) -> Result<Vec<u8>> {
        let shared = &self.shared;
        shared.check_open()?;
        if node_path == path::ROOT {
            return Ok(Vec::new());
        }
        let data_path = shared.node_dir(node_path)?.join(NODE_DATA);
        fs::read(&data_path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                NsLockError::NoNode(node_path.to_string())
            } else {
                io_failure("read node data", &data_path, e)
            }
        })
    }

    fn watch_children(&self, node_path: &str, callback: WatchCallback) -> Result<()> {
        let shared = &self.shared;
        shared.check_open()?;
        if !shared.is_node(node_path)? {
            return Err(NsLockError::NoNode(node_path.to_string()));
        }
        let snapshot = shared.children(node_path)?;
        shared.watches.lock().push(PendingWatch {
            path: node_path.to_string(),
            snapshot: Some(snapshot),
            callback,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests;
