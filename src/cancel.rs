//! Cooperative cancellation of in-flight statement execution.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// A cloneable token that aborts a running execution when fired.
///
/// A token fired before execution begins fails the call immediately; a token
/// fired while the driver is executing makes a watcher thread issue the
/// driver's cancel entry exactly once. Firing is sticky and idempotent.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    shared: Arc<TokenShared>,
}

#[derive(Debug, Default)]
struct TokenShared {
    fired: Mutex<bool>,
    signal: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the token. Wakes any watcher currently waiting on it.
    pub fn fire(&self) {
        let mut fired = self.shared.fired.lock().unwrap();
        *fired = true;
        self.shared.signal.notify_all();
    }

    pub fn is_fired(&self) -> bool {
        *self.shared.fired.lock().unwrap()
    }

    /// Blocks until either the token fires (returns `true`) or `done` is set
    /// (returns `false`). `done` setters must call [`Self::wake`] afterwards.
    pub(crate) fn wait_fired_or(&self, done: &AtomicBool) -> bool {
        let mut fired = self.shared.fired.lock().unwrap();
        loop {
            if *fired {
                return true;
            }
            if done.load(Ordering::Acquire) {
                return false;
            }
            fired = self.shared.signal.wait(fired).unwrap();
        }
    }

    /// Wakes waiting watchers without firing, so they can observe a
    /// completion flag.
    pub(crate) fn wake(&self) {
        let _guard = self.shared.fired.lock().unwrap();
        self.shared.signal.notify_all();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn firing_is_sticky_and_visible_to_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_fired());
        token.fire();
        assert!(clone.is_fired());
        token.fire();
        assert!(token.is_fired());
    }

    #[test]
    fn watcher_observes_fire() {
        let token = CancelToken::new();
        let done = Arc::new(AtomicBool::new(false));
        let watcher = {
            let token = token.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || token.wait_fired_or(&done))
        };
        thread::sleep(Duration::from_millis(10));
        token.fire();
        assert!(watcher.join().unwrap());
    }

    #[test]
    fn watcher_exits_on_completion() {
        let token = CancelToken::new();
        let done = Arc::new(AtomicBool::new(false));
        let watcher = {
            let token = token.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || token.wait_fired_or(&done))
        };
        thread::sleep(Duration::from_millis(10));
        done.store(true, Ordering::Release);
        token.wake();
        assert!(!watcher.join().unwrap());
    }
}
