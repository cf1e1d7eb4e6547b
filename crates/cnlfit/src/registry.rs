//! `SessionRegistry`: owner of every controller session.
//!
//! Composes the pieces into the surface seen by the two outer layers:
//!
//! - transport registration side: `register`, `unregister`
//! - character-device side: `open`, `close`, `has_event`, `dispatch`
//!
//! A fixed-capacity slot table sits behind one mutex. A session's id is its
//! slot index.

use cnlfit_core::command::EndpointType;
use cnlfit_core::error::{FitError, Result};
use cnlfit_core::id::{DeviceHandle, SessionId};
use cnlfit_core::notifier::Notifier;
use cnlfit_core::state::{AdapterState, ControllerState};
use cnlfit_core::transport::CnlTransport;
use cnlfit_core::{fit_debug, fit_info, fit_warn};

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::adapter::close_adapter;
use crate::config::FitConfig;
use crate::controller::{close_controller, ControllerSession};
use crate::io_manager::IoManager;
use crate::pool::ContainerPool;

/// The registry's slot table. Holding a `&SlotTable` proves the registry
/// mutex is held; state setters require one.
pub(crate) struct SlotTable {
    slots: Vec<Option<Arc<ControllerSession>>>,
}

impl SlotTable {
    fn new(capacity: usize) -> Self {
        Self { slots: (0..capacity).map(|_| None).collect() }
    }

    pub(crate) fn get(&self, sid: SessionId) -> Option<&Arc<ControllerSession>> {
        self.slots.get(sid.as_usize()).and_then(|s| s.as_ref())
    }

    fn find_device(&self, device: DeviceHandle) -> Option<&Arc<ControllerSession>> {
        self.slots.iter().flatten().find(|s| s.device == device)
    }

    fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.is_none())
    }

    /// Clear the slot holding exactly `session`.
    pub(crate) fn remove(&mut self, session: &Arc<ControllerSession>) -> bool {
        match self.slots.get_mut(session.id.as_usize()) {
            Some(slot) if slot.as_ref().is_some_and(|s| Arc::ptr_eq(s, session)) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    fn live(&self) -> impl Iterator<Item = &Arc<ControllerSession>> {
        self.slots.iter().flatten()
    }
}

pub(crate) fn lock_table(table: &Mutex<SlotTable>) -> MutexGuard<'_, SlotTable> {
    table.lock().unwrap_or_else(|e| e.into_inner())
}

/// Client handle to an open controller or adapter endpoint.
///
/// Each open of an endpoint starts a new generation; the handle is only
/// honoured while its generation is the endpoint's current one. Dropping a
/// handle that was never passed to `SessionRegistry::close` closes it.
pub struct Endpoint {
    kind: EndpointType,
    session: Arc<ControllerSession>,
    generation: u64,
    table: Arc<Mutex<SlotTable>>,
    closed: bool,
}

impl Endpoint {
    pub(crate) fn new(
        kind: EndpointType,
        session: Arc<ControllerSession>,
        generation: u64,
        table: Arc<Mutex<SlotTable>>,
    ) -> Self {
        Self { kind, session, generation, table, closed: false }
    }

    pub fn kind(&self) -> EndpointType {
        self.kind
    }

    pub fn session_id(&self) -> SessionId {
        self.session.id
    }

    pub fn controller_state(&self) -> ControllerState {
        self.session.state()
    }

    pub fn adapter_state(&self) -> AdapterState {
        self.session.adapter.state()
    }

    /// False once this open has ended, even if the endpoint was reopened
    /// through another handle.
    pub fn is_current(&self) -> bool {
        self.session.generation(self.kind) == self.generation
    }

    pub(crate) fn session(&self) -> &Arc<ControllerSession> {
        &self.session
    }

    pub(crate) fn io(&self) -> &IoManager {
        self.session.io_for(self.kind)
    }

    /// Lock of the registry that issued this handle.
    pub(crate) fn lock_table(&self) -> MutexGuard<'_, SlotTable> {
        lock_table(&self.table)
    }

    fn shut(&mut self) -> Result<()> {
        if self.closed {
            return Err(FitError::InvalidState);
        }
        self.closed = true;
        match self.kind {
            EndpointType::Controller => close_controller(self),
            EndpointType::Adapter => close_adapter(self),
        }
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.shut() {
            fit_debug!("{}: dropped {} endpoint not closed: {}", self.session.id, self.kind, e);
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("kind", &self.kind)
            .field("session", &self.session.id)
            .field("generation", &self.generation)
            .finish()
    }
}

pub struct SessionRegistry {
    table: Arc<Mutex<SlotTable>>,
    pool: ContainerPool,
    config: FitConfig,
}

impl SessionRegistry {
    pub fn new(config: FitConfig) -> Self {
        let config = config.sanitized();
        Self {
            table: Arc::new(Mutex::new(SlotTable::new(config.max_sessions))),
            pool: ContainerPool::new(config.pool_size, config.pool_policy),
            config,
        }
    }

    /// Registry configured from `CNLFIT_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(FitConfig::from_env())
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SlotTable> {
        lock_table(&self.table)
    }

    /// Handle for a newly opened endpoint of `session`.
    pub(crate) fn endpoint(
        &self,
        kind: EndpointType,
        session: Arc<ControllerSession>,
        generation: u64,
    ) -> Endpoint {
        Endpoint::new(kind, session, generation, Arc::clone(&self.table))
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    pub fn pool(&self) -> &ContainerPool {
        &self.pool
    }

    /// Number of occupied slots, `Gone` sessions included.
    pub fn session_count(&self) -> usize {
        self.lock().live().count()
    }

    pub fn controller_state(&self, sid: SessionId) -> Option<ControllerState> {
        self.lock().get(sid).map(|s| s.state())
    }

    pub fn adapter_state(&self, sid: SessionId) -> Option<AdapterState> {
        self.lock().get(sid).map(|s| s.adapter.state())
    }

    // ── Transport registration side ──

    /// Create a `Ready` session for a newly attached transport device.
    pub fn register(&self, device: DeviceHandle, ops: Arc<dyn CnlTransport>) -> Result<SessionId> {
        let mut table = self.lock();
        if table.find_device(device).is_some() {
            fit_warn!("{:?} already registered", device);
            return Err(FitError::InvalidState);
        }
        let slot = match table.free_slot() {
            Some(slot) => slot,
            None => {
                fit_warn!("session table full ({} slots)", self.config.max_sessions);
                return Err(FitError::ResourceExhausted);
            }
        };
        let sid = SessionId::new(slot as u32);
        table.slots[slot] = Some(Arc::new(ControllerSession::new(sid, device, ops, self.pool.clone())));
        drop(table);

        fit_info!("{}: registered {:?}", sid, device);
        Ok(sid)
    }

    /// Detach a transport device. An open session is only marked `Gone`; the
    /// controller's close frees it.
    pub fn unregister(&self, device: DeviceHandle) -> Result<()> {
        let mut table = self.lock();
        let session = Arc::clone(table.find_device(device).ok_or(FitError::NotFound)?);
        match session.state() {
            ControllerState::Ready => {
                table.remove(&session);
                drop(table);
                fit_info!("{}: unregistered", session.id);
            }
            ControllerState::Active => {
                session.set_state(&table, ControllerState::Gone);
                drop(table);
                fit_info!("{}: unregistered while open, marked gone", session.id);
                session.io.notify();
                session.adapter.io.notify();
            }
            ControllerState::Gone => return Err(FitError::InvalidState),
        }
        Ok(())
    }

    // ── Character-device side ──

    pub fn open(
        &self,
        kind: EndpointType,
        sid: SessionId,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Result<Endpoint> {
        match kind {
            EndpointType::Controller => self.open_controller(sid, notifier),
            EndpointType::Adapter => self.open_adapter(sid, notifier),
        }
    }

    /// End the open `endpoint` stands for. A handle whose open was already
    /// ended elsewhere gets `InvalidState` and touches nothing.
    pub fn close(&self, mut endpoint: Endpoint) -> Result<()> {
        endpoint.shut()
    }

    /// Poll support.
    ///
    /// `Ok` when an event is queued, `InvalidState` when nothing more will
    /// arrive (stale handle, stopped, gone, or adapter being force-closed),
    /// otherwise
    /// `NotFound`.
    pub fn has_event(&self, endpoint: &Endpoint) -> Result<()> {
        if !endpoint.is_current() {
            return Err(FitError::InvalidState);
        }
        let io = endpoint.io();
        if !io.is_empty() {
            return Ok(());
        }
        let session = endpoint.session();
        let force_closing = endpoint.kind() == EndpointType::Adapter
            && session.adapter.state() == AdapterState::ForceClose;
        if io.is_stopped() || session.state() == ControllerState::Gone || force_closing {
            Err(FitError::InvalidState)
        } else {
            Err(FitError::NotFound)
        }
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        let table = self.lock();
        let open = table.live().filter(|s| s.state().is_open()).count();
        if open > 0 {
            fit_warn!("registry dropped with {} open session(s)", open);
        }
    }
}
