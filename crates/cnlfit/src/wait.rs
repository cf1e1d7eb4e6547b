//! Force-close handshake between a closing controller and its adapter.
//!
//! The controller arms the waiter while holding the registry mutex, drops
//! the mutex and waits; the adapter's close releases it. Release may happen
//! before the controller reaches `wait`, so the signal is latched.

use std::sync::{Condvar, Mutex};

pub struct CloseWaiter {
    released: Mutex<bool>,
    cv: Condvar,
}

impl CloseWaiter {
    pub fn new() -> Self {
        Self { released: Mutex::new(false), cv: Condvar::new() }
    }

    /// Clear any stale release before a new handshake.
    pub fn arm(&self) {
        *self.released.lock().unwrap_or_else(|e| e.into_inner()) = false;
    }

    /// Block until `release` has been called since the last `arm`.
    pub fn wait(&self) {
        let mut released = self.released.lock().unwrap_or_else(|e| e.into_inner());
        while !*released {
            released = self.cv.wait(released).unwrap_or_else(|e| e.into_inner());
        }
    }

    pub fn release(&self) {
        {
            let mut released = self.released.lock().unwrap_or_else(|e| e.into_inner());
            *released = true;
        }
        self.cv.notify_all();
    }
}

impl Default for CloseWaiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn release_before_wait_is_latched() {
        let w = CloseWaiter::new();
        w.arm();
        w.release();
        w.wait();
    }

    #[test]
    fn wait_blocks_until_release() {
        let w = Arc::new(CloseWaiter::new());
        w.arm();
        let w2 = Arc::clone(&w);
        let h = thread::spawn(move || w2.wait());
        thread::sleep(Duration::from_millis(30));
        assert!(!h.is_finished());
        w.release();
        h.join().unwrap();
    }
}
