//! Condvar waker (non-Linux fallback)
//!
//! Same contract as the eventfd waker: a counter that `notify` bumps,
//! `wait` observes and `drain` resets.

use cnlfit_core::error::Result;
use cnlfit_core::notifier::Notifier;

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

pub struct CondvarWaker {
    pending: Mutex<u64>,
    cv: Condvar,
}

impl CondvarWaker {
    pub fn new() -> Result<Self> {
        Ok(Self { pending: Mutex::new(0), cv: Condvar::new() })
    }

    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        while *pending == 0 {
            match deadline {
                None => {
                    pending = self.cv.wait(pending).unwrap_or_else(|e| e.into_inner());
                }
                Some(d) => {
                    let left = d.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return false;
                    }
                    pending = self
                        .cv
                        .wait_timeout(pending, left)
                        .map(|(g, _)| g)
                        .unwrap_or_else(|e| e.into_inner().0);
                }
            }
        }
        true
    }

    pub fn drain(&self) -> u64 {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl Notifier for CondvarWaker {
    fn notify(&self) -> Result<()> {
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            *pending = pending.saturating_add(1);
        }
        self.cv.notify_all();
        Ok(())
    }
}
