use super::*;
use crate::test_support::fast_fs_options as fast_options;
use std::sync::mpsc;
use tempfile::TempDir;

fn recorder() -> (WatchCallback, mpsc::Receiver<WatchedEvent>) {
    let (tx, rx) = mpsc::channel();
    let callback: WatchCallback = Box::new(move |event| {
        let _ = tx.send(event);
    });
    (callback, rx)
}

#[test]
fn open_creates_layout_and_lease() {
    let temp = TempDir::new().unwrap();
    let ns = FsNamespace::open(temp.path(), fast_options()).unwrap();

    assert!(temp.path().join(TREE_DIR).is_dir());
    let lease = temp
        .path()
        .join(SESSIONS_DIR)
        .join(format!("{}.json", ns.session_id()));
    assert!(lease.is_file());

    ns.close();
    assert!(!lease.exists());
}

#[test]
fn connect_accepts_file_scheme_and_rejects_empty() {
    let temp = TempDir::new().unwrap();
    let connect = format!("file://{}", temp.path().display());
    let ns = FsNamespace::connect(&connect, fast_options()).unwrap();
    assert!(ns.exists("/").unwrap());

    let err = FsNamespace::connect("file://", fast_options()).err().unwrap();
    assert!(matches!(err, NsLockError::UserError(_)));
}

#[test]
fn create_list_read_and_delete() {
    let temp = TempDir::new().unwrap();
    let ns = FsNamespace::open(temp.path(), fast_options()).unwrap();
    let acl = Acl::open_unsafe();

    ns.ensure_path("/app/locks", &acl).unwrap();
    let created = ns
        .create_node("/app/locks/alpha", b"payload", &acl, CreateMode::Persistent)
        .unwrap();
    assert_eq!(created, "/app/locks/alpha");
    assert_eq!(ns.list_children("/app/locks").unwrap(), vec!["alpha"]);
    assert_eq!(ns.read_data("/app/locks/alpha").unwrap(), b"payload");

    let err = ns.delete_node("/app/locks").unwrap_err();
    assert!(matches!(err, NsLockError::NotEmpty(_)));

    ns.delete_node("/app/locks/alpha").unwrap();
    assert!(ns.list_children("/app/locks").unwrap().is_empty());
    assert!(ns.delete_node("/app/locks/alpha").unwrap_err().is_no_node());
}

#[test]
fn create_requires_parent_and_rejects_duplicates() {
    let temp = TempDir::new().unwrap();
    let ns = FsNamespace::open(temp.path(), fast_options()).unwrap();
    let acl = Acl::open_unsafe();

    let err = ns
        .create_node("/missing/child", &[], &acl, CreateMode::Persistent)
        .unwrap_err();
    assert!(err.is_no_node());

    ns.create_node("/node", &[], &acl, CreateMode::Persistent)
        .unwrap();
    let err = ns
        .create_node("/node", &[], &acl, CreateMode::Persistent)
        .unwrap_err();
    assert!(err.is_node_exists());
    assert_eq!(
        ns.ensure_node("/node", CreateMode::Persistent, &acl).unwrap(),
        "/node"
    );
}

#[test]
fn reserved_names_are_rejected() {
    let temp = TempDir::new().unwrap();
    let ns = FsNamespace::open(temp.path(), fast_options()).unwrap();

    let err = ns
        .create_node("/.sequence", &[], &Acl::open_unsafe(), CreateMode::Persistent)
        .unwrap_err();
    assert!(matches!(err, NsLockError::InvalidPath { .. }));
}

#[test]
fn sequential_names_are_shared_across_sessions() {
    let temp = TempDir::new().unwrap();
    let a = FsNamespace::open(temp.path(), fast_options()).unwrap();
    let b = FsNamespace::open(temp.path(), fast_options()).unwrap();
    let acl = Acl::open_unsafe();
    a.ensure_path("/locks", &acl).unwrap();

    let first = a
        .create_node("/locks/lock-", &[], &acl, CreateMode::EphemeralSequential)
        .unwrap();
    let second = b
        .create_node("/locks/lock-", &[], &acl, CreateMode::EphemeralSequential)
        .unwrap();

    assert_eq!(first, "/locks/lock-0000000000");
    assert_eq!(second, "/locks/lock-0000000001");
    assert_eq!(
        b.list_children("/locks").unwrap(),
        vec!["lock-0000000000", "lock-0000000001"]
    );
}

#[test]
fn ephemeral_nodes_cannot_have_children() {
    let temp = TempDir::new().unwrap();
    let ns = FsNamespace::open(temp.path(), fast_options()).unwrap();
    let acl = Acl::open_unsafe();

    ns.create_node("/eph", &[], &acl, CreateMode::Ephemeral)
        .unwrap();
    let err = ns
        .create_node("/eph/child", &[], &acl, CreateMode::Persistent)
        .unwrap_err();
    assert!(matches!(err, NsLockError::EphemeralParent(_)));
}

#[test]
fn closing_session_removes_its_ephemerals() {
    let temp = TempDir::new().unwrap();
    let a = FsNamespace::open(temp.path(), fast_options()).unwrap();
    let b = FsNamespace::open(temp.path(), fast_options()).unwrap();
    let acl = Acl::open_unsafe();
    a.ensure_path("/locks", &acl).unwrap();
    a.create_node("/locks/held", &[], &acl, CreateMode::Ephemeral)
        .unwrap();
    a.create_node("/locks/kept", &[], &acl, CreateMode::Persistent)
        .unwrap();

    a.close();
    a.close();

    assert_eq!(b.list_children("/locks").unwrap(), vec!["kept"]);
    let err = a.exists("/locks").unwrap_err();
    assert!(matches!(err, NsLockError::SessionExpired(_)));
}

#[test]
fn watch_fires_on_change_from_another_session() {
    let temp = TempDir::new().unwrap();
    let watcher = FsNamespace::open(temp.path(), fast_options()).unwrap();
    let writer = FsNamespace::open(temp.path(), fast_options()).unwrap();
    let acl = Acl::open_unsafe();
    watcher.ensure_path("/locks", &acl).unwrap();

    let (callback, events) = recorder();
    watcher.watch_children("/locks", callback).unwrap();
    writer
        .create_node("/locks/entry", &[], &acl, CreateMode::Persistent)
        .unwrap();

    let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(event.kind, WatchEventKind::NodeChildrenChanged);
    assert_eq!(event.path, "/locks");

    writer.delete_node("/locks/entry").unwrap();
    assert!(events.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn watch_reports_deleted_node() {
    let temp = TempDir::new().unwrap();
    let ns = FsNamespace::open(temp.path(), fast_options()).unwrap();
    let acl = Acl::open_unsafe();
    ns.ensure_path("/gone", &acl).unwrap();

    let (callback, events) = recorder();
    ns.watch_children("/gone", callback).unwrap();
    ns.delete_node("/gone").unwrap();

    let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(event.kind, WatchEventKind::NodeDeleted);
}

#[test]
fn closing_session_fires_pending_watches() {
    let temp = TempDir::new().unwrap();
    let ns = FsNamespace::open(temp.path(), fast_options()).unwrap();
    ns.ensure_path("/locks", &Acl::open_unsafe()).unwrap();

    let (callback, events) = recorder();
    ns.watch_children("/locks", callback).unwrap();
    ns.close();

    let event = events.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(event.kind, WatchEventKind::SessionClosed);
    assert_eq!(event.path, "/locks");
}

#[test]
fn expired_session_nodes_are_reaped() {
    let temp = TempDir::new().unwrap();
    let stalled = FsNamespace::open(temp.path(), fast_options()).unwrap();
    let survivor = FsNamespace::open(temp.path(), fast_options()).unwrap();
    let acl = Acl::open_unsafe();
    stalled.ensure_path("/locks", &acl).unwrap();
    stalled
        .create_node("/locks/lock-", &[], &acl, CreateMode::EphemeralSequential)
        .unwrap();
    assert_eq!(survivor.list_children("/locks").unwrap().len(), 1);

    stalled.suspend_heartbeat();
    thread::sleep(fast_options().session_timeout + Duration::from_millis(200));

    assert!(survivor.list_children("/locks").unwrap().is_empty());
}

#[test]
fn live_session_nodes_survive_past_timeout() {
    let temp = TempDir::new().unwrap();
    let owner = FsNamespace::open(temp.path(), fast_options()).unwrap();
    let observer = FsNamespace::open(temp.path(), fast_options()).unwrap();
    let acl = Acl::open_unsafe();
    owner.ensure_path("/locks", &acl).unwrap();
    owner
        .create_node("/locks/held", &[], &acl, CreateMode::Ephemeral)
        .unwrap();

    thread::sleep(fast_options().session_timeout * 2);

    assert_eq!(observer.list_children("/locks").unwrap(), vec!["held"]);
}

#[test]
fn reserved_sequence_is_published_before_later_ones() {
    let temp = TempDir::new().unwrap();
    let early = FsNamespace::open(temp.path(), fast_options()).unwrap();
    let late = FsNamespace::open(temp.path(), fast_options()).unwrap();
    let acl = Acl::open_unsafe();
    early.ensure_path("/locks", &acl).unwrap();
    let dir = early.shared.node_dir("/locks").unwrap();
    let (done_tx, done_rx) = mpsc::channel();

    thread::scope(|s| {
        let created = super::sequence::with_next_sequence(
            &dir,
            fast_options().session_timeout,
            |sequence| {
                let (late, acl) = (&late, &acl);
                s.spawn(move || {
                    let entry = late
                        .create_node("/locks/lock-", &[], acl, CreateMode::EphemeralSequential)
                        .unwrap();
                    done_tx.send(entry).unwrap();
                });

                // The later contender cannot publish while this number is unpublished.
                assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());
                assert!(late.list_children("/locks").unwrap().is_empty());

                early.create_node(
                    &path::with_sequence("/locks/lock-", sequence),
                    &[],
                    &acl,
                    CreateMode::Ephemeral,
                )
            },
        )
        .unwrap();
        assert_eq!(created, "/locks/lock-0000000000");
    });

    assert_eq!(
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        "/locks/lock-0000000001"
    );
    assert_eq!(
        early.list_children("/locks").unwrap(),
        vec!["lock-0000000000", "lock-0000000001"]
    );
}

#[test]
fn removal_restores_node_that_gained_children() {
    let temp = TempDir::new().unwrap();
    let remover = FsNamespace::open(temp.path(), fast_options()).unwrap();
    let creator = FsNamespace::open(temp.path(), fast_options()).unwrap();
    let acl = Acl::open_unsafe();
    remover.ensure_path("/locks", &acl).unwrap();
    assert!(remover.list_children("/locks").unwrap().is_empty());

    // A contender arrives after the emptiness check has passed.
    creator
        .create_node("/locks/lock-", &[], &acl, CreateMode::EphemeralSequential)
        .unwrap();
    let err = remover.shared.remove_empty_node("/locks").unwrap_err();

    assert!(matches!(err, NsLockError::NotEmpty(_)));
    assert_eq!(
        creator.list_children("/locks").unwrap(),
        vec!["lock-0000000000"]
    );

    creator.delete_node("/locks/lock-0000000000").unwrap();
    remover.delete_node("/locks").unwrap();
    assert!(!remover.exists("/locks").unwrap());
    let leftovers: Vec<_> = fs::read_dir(temp.path().join(TREE_DIR))
        .unwrap()
        .filter_map(|entry| entry.unwrap().file_name().into_string().ok())
        .filter(|name| name.starts_with(".deleted-"))
        .collect();
    assert!(leftovers.is_empty());
}
