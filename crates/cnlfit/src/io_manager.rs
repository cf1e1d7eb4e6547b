//! Per-endpoint event queue with wake-up plumbing.
//!
//! Each controller and each adapter owns one `IoManager`. Producers
//! (transport callbacks, port transitions, data completions) enqueue
//! containers; the client pops them with get-event.
//!
//! The queue lock covers list operations only. The notifier is cloned out of
//! its slot and invoked after every lock is dropped, so a notifier may call
//! straight back into the dispatcher.

use cnlfit_core::notifier::Notifier;
use cnlfit_core::{fit_trace, fit_warn};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::pool::Container;

pub struct IoManager {
    queue: Mutex<VecDeque<Container>>,
    stopped: AtomicBool,
    notifier: Mutex<Option<Arc<dyn Notifier>>>,
}

impl IoManager {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            stopped: AtomicBool::new(false),
            notifier: Mutex::new(None),
        }
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<Container>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current_notifier(&self) -> Option<Arc<dyn Notifier>> {
        self.notifier.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Prepare for a fresh open: drop stale events, clear the stop flag and
    /// install the new notifier.
    pub fn reset(&self, notifier: Option<Arc<dyn Notifier>>) {
        self.purge();
        self.stopped.store(false, Ordering::SeqCst);
        *self.notifier.lock().unwrap_or_else(|e| e.into_inner()) = notifier;
    }

    /// Append and wake the endpoint.
    pub(crate) fn enqueue(&self, container: Container) {
        self.push_deferred(container);
        self.notify();
    }

    /// Append without waking. The caller must `notify()` once its own locks
    /// are released.
    pub(crate) fn push_deferred(&self, container: Container) {
        fit_trace!("enqueue slot {}", container.slot());
        self.queue().push_back(container);
    }

    pub fn notify(&self) {
        if let Some(n) = self.current_notifier() {
            if let Err(e) = n.notify() {
                fit_warn!("endpoint notifier failed: {}", e);
            }
        }
    }

    pub(crate) fn dequeue(&self) -> Option<Container> {
        self.queue().pop_front()
    }

    /// Set the stop flag. Only the first call after a reset wakes the
    /// endpoint; returns whether this call did the transition.
    pub fn stop(&self) -> bool {
        let first = !self.stopped.swap(true, Ordering::SeqCst);
        if first {
            self.notify();
        }
        first
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.queue().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue().is_empty()
    }

    /// Drop everything queued. Containers go back to the pool after the
    /// queue lock is released.
    pub fn purge(&self) -> usize {
        let drained: Vec<Container> = self.queue().drain(..).collect();
        drained.len()
    }

    pub fn detach_notifier(&self) {
        self.notifier.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

impl Default for IoManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{AllocPolicy, ContainerPool, Payload};
    use cnlfit_core::event::PortEvent;
    use cnlfit_core::id::RequestId;
    use cnlfit_core::transport::Direction;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, Arc<dyn Notifier>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let n: Arc<dyn Notifier> = Arc::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        (hits, n)
    }

    #[test]
    fn fifo_order() {
        let pool = ContainerPool::new(8, AllocPolicy::Fail);
        let io = IoManager::new();
        for id in 1..=3u64 {
            io.enqueue(
                pool.alloc(Payload::Data { direction: Direction::Send, request_id: RequestId(id) })
                    .unwrap(),
            );
        }
        let mut seen = Vec::new();
        while let Some(c) = io.dequeue() {
            if let Payload::Data { request_id, .. } = c.payload() {
                seen.push(request_id.0);
            }
        }
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn notifies_on_enqueue_not_on_deferred_push() {
        let pool = ContainerPool::new(4, AllocPolicy::Fail);
        let io = IoManager::new();
        let (hits, n) = counter();
        io.reset(Some(n));

        io.enqueue(pool.alloc(Payload::Port(PortEvent::Suspended)).unwrap());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        io.push_deferred(pool.alloc(Payload::Port(PortEvent::Suspended)).unwrap());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        io.notify();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(io.len(), 2);
    }

    #[test]
    fn stop_is_idempotent() {
        let pool = ContainerPool::new(4, AllocPolicy::Fail);
        let io = IoManager::new();
        let (hits, n) = counter();
        io.reset(Some(n));
        io.enqueue(pool.alloc(Payload::Port(PortEvent::SuspendRequested)).unwrap());

        assert!(io.stop());
        assert!(!io.stop());
        assert!(io.is_stopped());
        // one enqueue + one stop
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(io.len(), 1);

        // stopped queues still drain
        assert!(io.dequeue().is_some());
        assert!(io.dequeue().is_none());
    }

    #[test]
    fn reset_clears_stop_and_queue() {
        let pool = ContainerPool::new(4, AllocPolicy::Fail);
        let io = IoManager::new();
        io.enqueue(pool.alloc(Payload::Empty).unwrap());
        io.stop();

        io.reset(None);
        assert!(!io.is_stopped());
        assert!(io.is_empty());
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn notifier_may_reenter_queue() {
        let io = Arc::new(IoManager::new());
        let pool = ContainerPool::new(2, AllocPolicy::Fail);
        let io2 = Arc::clone(&io);
        let seen = Arc::new(AtomicUsize::new(0));
        let s2 = Arc::clone(&seen);
        io.reset(Some(Arc::new(move || {
            s2.store(io2.len(), Ordering::SeqCst);
        })));
        io.enqueue(pool.alloc(Payload::Empty).unwrap());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
