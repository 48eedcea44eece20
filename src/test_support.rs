use crate::namespace::{FsOptions, Namespace};
use std::thread;
use std::time::{Duration, Instant};

/// Session options that make lease expiry observable within a test.
pub(crate) fn fast_fs_options() -> FsOptions {
    FsOptions {
        session_timeout: Duration::from_millis(400),
        poll_interval: Duration::from_millis(10),
    }
}

/// Poll until `path` has exactly `count` children and return them sorted.
///
/// A missing node counts as having no children. Panics after `timeout`.
pub(crate) fn wait_for_children<N: Namespace + ?Sized>(
    namespace: &N,
    path: &str,
    count: usize,
    timeout: Duration,
) -> Vec<String> {
    let deadline = Instant::now() + timeout;
    loop {
        let mut children = match namespace.list_children(path) {
            Ok(children) => children,
            Err(e) if e.is_no_node() => Vec::new(),
            Err(e) => panic!("failed to list children of {}: {}", path, e),
        };
        if children.len() == count {
            children.sort();
            return children;
        }
        assert!(
            Instant::now() < deadline,
            "expected {} children under {}, found {:?}",
            count,
            path,
            children
        );
        thread::sleep(Duration::from_millis(5));
    }
}
