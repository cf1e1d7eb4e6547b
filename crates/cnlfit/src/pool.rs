//! `ContainerPool`: fixed-capacity pool of request/event containers.
//!
//! Every queued event and every in-flight transport request occupies one
//! container. Free slot indices live in a lock-free `ArrayQueue`; a
//! `Container` hands its slot back when dropped, so a container that is
//! dequeued, translated and discarded is freed on every path.
//!
//! Exhaustion either fails the allocation (`AllocPolicy::Fail`) or parks the
//! caller until a container is returned (`AllocPolicy::WaitForever`).

use cnlfit_core::error::{FitError, Result};
use cnlfit_core::event::{PortEvent, TransportEvent};
use cnlfit_core::fit_warn;
use cnlfit_core::id::RequestId;
use cnlfit_core::transport::{DataOutcome, Direction, TransportRequest};

use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// Behaviour of `alloc` when no container is free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocPolicy {
    /// Return `ResourceExhausted`.
    #[default]
    Fail,
    /// Block until another container is dropped.
    WaitForever,
}

/// What a container currently carries.
#[derive(Debug)]
pub(crate) enum Payload {
    Empty,
    /// Synchronous transport request record.
    Request(TransportRequest),
    /// In-flight data request, owned by the transport's completion sink.
    Data { direction: Direction, request_id: RequestId },
    /// Finished data request waiting in an endpoint queue.
    Completion { direction: Direction, request_id: RequestId, outcome: DataOutcome },
    Event(TransportEvent),
    Port(PortEvent),
}

struct PoolInner {
    free: ArrayQueue<u32>,
    capacity: usize,
    in_use: AtomicUsize,
    high_water: AtomicUsize,
    policy: AllocPolicy,
    /// Parking for `WaitForever` allocations.
    gate: Mutex<()>,
    returned: Condvar,
    waiters: AtomicUsize,
}

impl PoolInner {
    fn take_slot(&self) -> Option<u32> {
        let slot = self.free.pop()?;
        let used = self.in_use.fetch_add(1, Ordering::Relaxed) + 1;
        self.high_water.fetch_max(used, Ordering::Relaxed);
        Some(slot)
    }

    fn release(&self, slot: u32) {
        self.in_use.fetch_sub(1, Ordering::Relaxed);
        // Capacity equals the number of slots, so the push cannot fail.
        let _ = self.free.push(slot);
        if self.waiters.load(Ordering::SeqCst) > 0 {
            let _g = self.gate.lock().unwrap_or_else(|e| e.into_inner());
            self.returned.notify_one();
        }
    }

    fn wait_for_slot(&self) -> u32 {
        self.waiters.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.gate.lock().unwrap_or_else(|e| e.into_inner());
        let slot = loop {
            if let Some(slot) = self.take_slot() {
                break slot;
            }
            guard = self.returned.wait(guard).unwrap_or_else(|e| e.into_inner());
        };
        drop(guard);
        self.waiters.fetch_sub(1, Ordering::SeqCst);
        slot
    }
}

/// Shared handle to the pool. Clones refer to the same containers.
#[derive(Clone)]
pub struct ContainerPool {
    inner: Arc<PoolInner>,
}

impl ContainerPool {
    pub fn new(capacity: usize, policy: AllocPolicy) -> Self {
        let capacity = capacity.max(1);
        let free = ArrayQueue::new(capacity);
        for slot in 0..capacity as u32 {
            let _ = free.push(slot);
        }
        Self {
            inner: Arc::new(PoolInner {
                free,
                capacity,
                in_use: AtomicUsize::new(0),
                high_water: AtomicUsize::new(0),
                policy,
                gate: Mutex::new(()),
                returned: Condvar::new(),
                waiters: AtomicUsize::new(0),
            }),
        }
    }

    /// Allocate according to the configured policy.
    pub(crate) fn alloc(&self, payload: Payload) -> Result<Container> {
        let slot = match self.inner.take_slot() {
            Some(slot) => slot,
            None if self.inner.policy == AllocPolicy::WaitForever => self.inner.wait_for_slot(),
            None => {
                fit_warn!("container pool exhausted ({} in use)", self.inner.capacity);
                return Err(FitError::ResourceExhausted);
            }
        };
        Ok(self.wrap(slot, payload))
    }

    /// Allocate without ever blocking, whatever the policy.
    ///
    /// Used where the caller holds the registry mutex.
    pub(crate) fn try_alloc(&self, payload: Payload) -> Result<Container> {
        match self.inner.take_slot() {
            Some(slot) => Ok(self.wrap(slot, payload)),
            None => {
                fit_warn!("container pool exhausted ({} in use)", self.inner.capacity);
                Err(FitError::ResourceExhausted)
            }
        }
    }

    fn wrap(&self, slot: u32, payload: Payload) -> Container {
        Container { slot, payload, pool: Arc::clone(&self.inner) }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn in_use(&self) -> usize {
        self.inner.in_use.load(Ordering::Relaxed)
    }

    pub fn available(&self) -> usize {
        self.inner.free.len()
    }

    /// Largest `in_use` ever observed.
    pub fn high_water(&self) -> usize {
        self.inner.high_water.load(Ordering::Relaxed)
    }
}

/// One pooled container. Returns its slot on drop.
pub struct Container {
    slot: u32,
    payload: Payload,
    pool: Arc<PoolInner>,
}

impl Container {
    pub(crate) fn slot(&self) -> u32 {
        self.slot
    }

    pub(crate) fn payload(&self) -> &Payload {
        &self.payload
    }

    pub(crate) fn set(&mut self, payload: Payload) {
        self.payload = payload;
    }

    pub(crate) fn take(&mut self) -> Payload {
        std::mem::replace(&mut self.payload, Payload::Empty)
    }

    pub(crate) fn request_mut(&mut self) -> Option<&mut TransportRequest> {
        match &mut self.payload {
            Payload::Request(req) => Some(req),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("slot", &self.slot)
            .field("payload", &self.payload)
            .finish()
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        self.pool.release(self.slot);
    }
}
