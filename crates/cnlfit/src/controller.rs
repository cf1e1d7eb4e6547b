//! Controller session: one per registered transport device.
//!
//! A session is created `Ready` by registration, becomes `Active` when the
//! client opens the controller endpoint, and is marked `Gone` when the
//! transport unregisters it while open. The adapter port lives inside the
//! session as a plain field.
//!
//! State words are atomics so pollers can read them without the registry
//! mutex; every write goes through `set_state`, which demands a reference
//! to the locked slot table.

use cnlfit_core::command::EndpointType;
use cnlfit_core::error::{FitError, Result};
use cnlfit_core::event::TransportEvent;
use cnlfit_core::id::{CnlHandle, DeviceHandle, SessionId, Uid};
use cnlfit_core::notifier::Notifier;
use cnlfit_core::request::FitRequest;
use cnlfit_core::state::{AdapterState, ControllerState};
use cnlfit_core::transport::{CnlTransport, EventSink};
use cnlfit_core::{fit_debug, fit_info, fit_warn};

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::adapter::AdapterPort;
use crate::io_manager::IoManager;
use crate::pool::{ContainerPool, Payload};
use crate::dispatcher::execute;
use crate::registry::{Endpoint, SessionRegistry, SlotTable};
use crate::wait::CloseWaiter;

pub(crate) struct ControllerSession {
    pub(crate) id: SessionId,
    pub(crate) device: DeviceHandle,
    pub(crate) transport: Arc<dyn CnlTransport>,
    pub(crate) pool: ContainerPool,
    state: AtomicU8,
    /// Set while an open is in the transport with the registry mutex released.
    opening: AtomicBool,
    /// Bumped on every controller open and close.
    generation: AtomicU64,
    cnl: Mutex<Option<CnlHandle>>,
    /// Peer from the latest connect/accept indication.
    peer: Mutex<Option<Uid>>,
    pub(crate) io: IoManager,
    pub(crate) adapter: AdapterPort,
    pub(crate) close_wait: CloseWaiter,
}

impl ControllerSession {
    pub(crate) fn new(
        id: SessionId,
        device: DeviceHandle,
        transport: Arc<dyn CnlTransport>,
        pool: ContainerPool,
    ) -> Self {
        Self {
            id,
            device,
            transport,
            pool,
            state: AtomicU8::new(ControllerState::Ready as u8),
            opening: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            cnl: Mutex::new(None),
            peer: Mutex::new(None),
            io: IoManager::new(),
            adapter: AdapterPort::new(),
            close_wait: CloseWaiter::new(),
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> ControllerState {
        ControllerState::from(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn set_state(&self, _held: &SlotTable, state: ControllerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn set_opening(&self, _held: &SlotTable, opening: bool) {
        self.opening.store(opening, Ordering::Release);
    }

    /// Current open generation of the given endpoint.
    pub(crate) fn generation(&self, kind: EndpointType) -> u64 {
        match kind {
            EndpointType::Controller => self.generation.load(Ordering::Acquire),
            EndpointType::Adapter => self.adapter.generation(),
        }
    }

    /// Start a new generation of the given endpoint; handles from earlier
    /// ones go stale.
    pub(crate) fn next_generation(&self, held: &SlotTable, kind: EndpointType) -> u64 {
        match kind {
            EndpointType::Controller => self.generation.fetch_add(1, Ordering::AcqRel) + 1,
            EndpointType::Adapter => self.adapter.next_generation(held),
        }
    }

    pub(crate) fn cnl_handle(&self) -> Option<CnlHandle> {
        *self.cnl.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_cnl_handle(&self, handle: CnlHandle) {
        *self.cnl.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    fn take_cnl_handle(&self) -> Option<CnlHandle> {
        self.cnl.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    pub(crate) fn remember_peer(&self, uid: Uid) {
        *self.peer.lock().unwrap_or_else(|e| e.into_inner()) = Some(uid);
    }

    pub(crate) fn peer(&self) -> Option<Uid> {
        *self.peer.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue of the given endpoint of this session.
    pub(crate) fn io_for(&self, kind: EndpointType) -> &IoManager {
        match kind {
            EndpointType::Controller => &self.io,
            EndpointType::Adapter => &self.adapter.io,
        }
    }
}

/// Event sink handed to the transport on open.
///
/// Holds the session weakly; events for a freed session are dropped.
struct SessionEvents {
    session: Weak<ControllerSession>,
}

impl EventSink for SessionEvents {
    fn on_event(&self, event: TransportEvent) {
        let session = match self.session.upgrade() {
            Some(s) => s,
            None => {
                fit_debug!("event for freed session dropped: {:?}", event);
                return;
            }
        };
        match session.pool.alloc(Payload::Event(event)) {
            Ok(container) => session.io.enqueue(container),
            Err(e) => fit_warn!("{}: transport event dropped: {}", session.id, e),
        }
    }
}

impl SessionRegistry {
    pub(crate) fn open_controller(
        &self,
        sid: SessionId,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Result<Endpoint> {
        let session = {
            let table = self.lock();
            let session = table.get(sid).ok_or(FitError::NotFound)?;
            if session.state() != ControllerState::Ready || session.opening.load(Ordering::Acquire) {
                return Err(FitError::InvalidState);
            }
            session.set_opening(&table, true);
            Arc::clone(session)
        };

        let sink: Arc<dyn EventSink> = Arc::new(SessionEvents { session: Arc::downgrade(&session) });
        let opened = session.transport.open(sink);

        let table = self.lock();
        session.set_opening(&table, false);
        let handle = match opened {
            Ok(handle) => handle,
            Err(e) => {
                drop(table);
                fit_debug!("{}: transport open failed: {}", sid, e);
                return Err(e);
            }
        };
        // Unregistration may have freed the session while the transport ran.
        if !table.get(sid).is_some_and(|s| Arc::ptr_eq(s, &session)) {
            drop(table);
            fit_debug!("{}: unregistered during open, closing {:?}", sid, handle);
            session.transport.close(handle);
            return Err(FitError::NotFound);
        }
        session.io.reset(notifier);
        session.set_cnl_handle(handle);
        session.set_state(&table, ControllerState::Active);
        let generation = session.next_generation(&table, EndpointType::Controller);
        drop(table);

        fit_info!("{}: controller open ({:?})", sid, session.device);
        Ok(self.endpoint(EndpointType::Controller, session, generation))
    }
}

pub(crate) fn close_controller(endpoint: &Endpoint) -> Result<()> {
    let session = endpoint.session();
    {
        let _table = endpoint.lock_table();
        if !endpoint.is_current() || !session.state().is_open() {
            return Err(FitError::InvalidState);
        }
    }

    // Give the transport a chance to quiesce; the outcome does not gate the
    // state transition.
    let mut quiesce = FitRequest::close();
    if let Err(e) = execute(endpoint, &mut quiesce) {
        fit_debug!("{}: internal close request: {}", session.id, e);
    }

    let mut table = endpoint.lock_table();
    if session.adapter.state().blocks_controller_close() {
        session.close_wait.arm();
        session.adapter.set_state(&table, AdapterState::ForceClose);
        drop(table);

        fit_info!("{}: waiting for adapter to close", session.id);
        session.adapter.io.notify();
        session.close_wait.wait();

        table = endpoint.lock_table();
        session.adapter.set_state(&table, AdapterState::Disabled);
        session.adapter.io.purge();
        session.adapter.io.detach_notifier();
    }

    let freed = match session.state() {
        ControllerState::Active => {
            session.set_state(&table, ControllerState::Ready);
            false
        }
        ControllerState::Gone => {
            if !table.remove(session) {
                return Err(FitError::InvalidState);
            }
            true
        }
        ControllerState::Ready => return Err(FitError::InvalidState),
    };
    session.next_generation(&table, EndpointType::Controller);
    drop(table);

    if let Some(handle) = session.take_cnl_handle() {
        session.transport.close(handle);
    }
    session.io.purge();
    session.io.detach_notifier();

    if freed {
        fit_info!("{}: controller closed, session freed", session.id);
    } else {
        fit_info!("{}: controller closed", session.id);
    }
    Ok(())
}
