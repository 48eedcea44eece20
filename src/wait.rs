//! One-shot wake-up signal bridging watch callbacks to blocked threads.

use crate::namespace::WatchCallback;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Instant;

#[derive(Default)]
struct Signal {
    fired: Mutex<bool>,
    cond: Condvar,
}

/// A binary semaphore: any number of notifiers may fire it, and a waiter
/// consumes the pending notification when it wakes.
#[derive(Clone, Default)]
pub(crate) struct WaitToken {
    signal: Arc<Signal>,
}

impl WaitToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A watch callback that fires this token.
    pub fn notifier(&self) -> WatchCallback {
        let signal = Arc::clone(&self.signal);
        Box::new(move |_event| {
            *signal.fired.lock() = true;
            signal.cond.notify_all();
        })
    }

    /// Block until the token is fired.
    pub fn wait(&self) {
        let mut fired = self.signal.fired.lock();
        while !*fired {
            self.signal.cond.wait(&mut fired);
        }
        *fired = false;
    }

    /// Block until the token is fired or `deadline` passes.
    ///
    /// Returns `true` if woken by a notification.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut fired = self.signal.fired.lock();
        while !*fired {
            if self
                .signal
                .cond
                .wait_until(&mut fired, deadline)
                .timed_out()
            {
                break;
            }
        }
        std::mem::replace(&mut *fired, false)
    }
}
