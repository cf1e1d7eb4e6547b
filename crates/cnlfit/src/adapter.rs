//! Adapter port: the secondary endpoint nested in every controller session.
//!
//! ```text
//!   DISABLED --enable-port--> READY --open--> ACTIVE
//!      ^                        ^               |
//!      |                        +----close------+
//!      |                                        | disable-port
//!      +------suspend-confirm / close------ SUSPENDING
//!
//!   ACTIVE/SUSPENDING --controller close--> FORCE_CLOSE --> DISABLED
//! ```
//!
//! All transitions run under the registry mutex. Port events are pushed
//! while the mutex is held and the target queue is notified after it is
//! released.

use cnlfit_core::command::EndpointType;
use cnlfit_core::error::{FitError, Result};
use cnlfit_core::event::PortEvent;
use cnlfit_core::id::SessionId;
use cnlfit_core::notifier::Notifier;
use cnlfit_core::state::{AdapterState, ControllerState};
use cnlfit_core::{fit_debug, fit_info, fit_warn};

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crate::controller::ControllerSession;
use crate::io_manager::IoManager;
use crate::pool::Payload;
use crate::registry::{Endpoint, SessionRegistry, SlotTable};

pub(crate) struct AdapterPort {
    state: AtomicU8,
    generation: AtomicU64,
    pub(crate) io: IoManager,
}

impl AdapterPort {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(AdapterState::Disabled as u8),
            generation: AtomicU64::new(0),
            io: IoManager::new(),
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> AdapterState {
        AdapterState::from(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn set_state(&self, _held: &SlotTable, state: AdapterState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn next_generation(&self, _held: &SlotTable) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// `Suspending` → `Disabled`, with a `Suspended` port event pushed (not yet
/// notified) on the controller queue.
fn confirm_suspend(session: &ControllerSession, held: &SlotTable) -> Result<()> {
    if session.adapter.state() != AdapterState::Suspending {
        return Err(FitError::InvalidState);
    }
    let container = session.pool.try_alloc(Payload::Port(PortEvent::Suspended))?;
    session.io.push_deferred(container);
    session.adapter.set_state(held, AdapterState::Disabled);
    Ok(())
}

impl SessionRegistry {
    pub(crate) fn open_adapter(
        &self,
        sid: SessionId,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Result<Endpoint> {
        let table = self.lock();
        let session = table.get(sid).ok_or(FitError::NotFound)?;
        if session.state() != ControllerState::Active || session.adapter.state() != AdapterState::Ready {
            fit_debug!(
                "{}: adapter open refused (controller {}, adapter {})",
                sid,
                session.state(),
                session.adapter.state()
            );
            return Err(FitError::InvalidState);
        }
        session.adapter.io.reset(notifier);
        session.adapter.set_state(&table, AdapterState::Active);
        let generation = session.adapter.next_generation(&table);
        let session = Arc::clone(session);
        drop(table);

        fit_info!("{}: adapter open", sid);
        Ok(self.endpoint(EndpointType::Adapter, session, generation))
    }
}

pub(crate) fn close_adapter(endpoint: &Endpoint) -> Result<()> {
    let session = endpoint.session();
    let table = endpoint.lock_table();
    if !endpoint.is_current() {
        return Err(FitError::InvalidState);
    }
    let mut notify_controller = false;
    match session.adapter.state() {
        AdapterState::ForceClose => {
            session.adapter.next_generation(&table);
            drop(table);
            fit_info!("{}: adapter closed under force-close", session.id);
            session.close_wait.release();
            return Ok(());
        }
        AdapterState::Active => session.adapter.set_state(&table, AdapterState::Ready),
        AdapterState::Suspending => match confirm_suspend(session, &table) {
            Ok(()) => notify_controller = true,
            Err(e) => {
                fit_warn!("{}: suspend confirmation lost on close: {}", session.id, e);
                session.adapter.set_state(&table, AdapterState::Disabled);
            }
        },
        AdapterState::Disabled | AdapterState::Ready => return Err(FitError::InvalidState),
    }
    session.adapter.next_generation(&table);
    drop(table);

    session.adapter.io.purge();
    session.adapter.io.detach_notifier();
    if notify_controller {
        session.io.notify();
    }
    fit_info!("{}: adapter closed ({})", session.id, session.adapter.state());
    Ok(())
}

pub(crate) fn enable_port(endpoint: &Endpoint) -> Result<()> {
    let session = endpoint.session();
    let table = endpoint.lock_table();
    if session.adapter.state() != AdapterState::Disabled {
        return Err(FitError::InvalidState);
    }
    session.adapter.set_state(&table, AdapterState::Ready);
    drop(table);
    fit_info!("{}: port enabled", session.id);
    Ok(())
}

/// From `Ready` the port is disabled at once and the controller hears
/// `Suspended`; from `Active` the adapter is asked to suspend and must
/// answer with suspend-confirm.
pub(crate) fn disable_port(endpoint: &Endpoint) -> Result<()> {
    let session = endpoint.session();
    let table = endpoint.lock_table();
    let target = match session.adapter.state() {
        AdapterState::Ready => {
            let container = session.pool.try_alloc(Payload::Port(PortEvent::Suspended))?;
            session.io.push_deferred(container);
            session.adapter.set_state(&table, AdapterState::Disabled);
            &session.io
        }
        AdapterState::Active => {
            let container = session.pool.try_alloc(Payload::Port(PortEvent::SuspendRequested))?;
            session.adapter.io.push_deferred(container);
            session.adapter.set_state(&table, AdapterState::Suspending);
            &session.adapter.io
        }
        _ => return Err(FitError::InvalidState),
    };
    drop(table);

    target.notify();
    fit_info!("{}: port disable -> {}", session.id, session.adapter.state());
    Ok(())
}

pub(crate) fn suspend_confirm(endpoint: &Endpoint) -> Result<()> {
    let session = endpoint.session();
    let table = endpoint.lock_table();
    confirm_suspend(session, &table)?;
    drop(table);

    session.io.notify();
    fit_info!("{}: suspend confirmed", session.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FitConfig;
    use crate::loopback::LoopbackTransport;
    use cnlfit_core::event::FitEvent;
    use cnlfit_core::id::DeviceHandle;
    use cnlfit_core::request::FitRequest;
    use std::sync::atomic::AtomicUsize;

    struct Fixture {
        reg: SessionRegistry,
        lo: Arc<LoopbackTransport>,
        sid: SessionId,
        ctl: Endpoint,
    }

    fn active_controller(ctl_notifier: Option<Arc<dyn Notifier>>) -> Fixture {
        let reg = SessionRegistry::new(FitConfig::default());
        let lo = Arc::new(LoopbackTransport::new());
        let sid = reg.register(DeviceHandle(9), lo.clone()).unwrap();
        let ctl = reg.open(EndpointType::Controller, sid, ctl_notifier).unwrap();
        Fixture { reg, lo, sid, ctl }
    }

    fn counter() -> (Arc<AtomicUsize>, Arc<dyn Notifier>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let n: Arc<dyn Notifier> = Arc::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        (hits, n)
    }

    fn next_event(reg: &SessionRegistry, ep: &Endpoint) -> Result<FitEvent> {
        let mut req = FitRequest::get_event();
        reg.dispatch(ep, &mut req)?;
        req.take_event().ok_or(FitError::NotFound)
    }

    #[test]
    fn adapter_open_needs_active_parent_and_ready_port() {
        let reg = SessionRegistry::new(FitConfig::default());
        let lo = Arc::new(LoopbackTransport::new());
        let sid = reg.register(DeviceHandle(9), lo).unwrap();

        // controller not open
        assert_eq!(reg.open(EndpointType::Adapter, sid, None).unwrap_err(), FitError::InvalidState);

        let ctl = reg.open(EndpointType::Controller, sid, None).unwrap();
        // port still disabled
        assert_eq!(reg.open(EndpointType::Adapter, sid, None).unwrap_err(), FitError::InvalidState);

        reg.dispatch(&ctl, &mut FitRequest::EnablePort).unwrap();
        let adp = reg.open(EndpointType::Adapter, sid, None).unwrap();
        assert_eq!(adp.adapter_state(), AdapterState::Active);
        assert_eq!(reg.open(EndpointType::Adapter, sid, None).unwrap_err(), FitError::InvalidState);
    }

    #[test]
    fn enable_port_only_from_disabled() {
        let f = active_controller(None);
        f.reg.dispatch(&f.ctl, &mut FitRequest::EnablePort).unwrap();
        assert_eq!(
            f.reg.dispatch(&f.ctl, &mut FitRequest::EnablePort).unwrap_err(),
            FitError::InvalidState
        );
    }

    #[test]
    fn disable_ready_port_reports_on_controller_queue() {
        let (hits, n) = counter();
        let f = active_controller(Some(n));
        f.reg.dispatch(&f.ctl, &mut FitRequest::EnablePort).unwrap();
        f.lo.clear_calls();

        f.reg.dispatch(&f.ctl, &mut FitRequest::DisablePort).unwrap();
        assert_eq!(f.ctl.adapter_state(), AdapterState::Disabled);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(f.lo.calls().is_empty());

        assert_eq!(next_event(&f.reg, &f.ctl).unwrap(), FitEvent::Port(PortEvent::Suspended));
        assert_eq!(next_event(&f.reg, &f.ctl).unwrap_err(), FitError::NotFound);
    }

    #[test]
    fn disable_disabled_port_is_invalid() {
        let f = active_controller(None);
        assert_eq!(
            f.reg.dispatch(&f.ctl, &mut FitRequest::DisablePort).unwrap_err(),
            FitError::InvalidState
        );
    }

    #[test]
    fn disable_active_port_suspends_via_adapter_queue() {
        let (ctl_hits, ctl_n) = counter();
        let (adp_hits, adp_n) = counter();
        let f = active_controller(Some(ctl_n));
        f.reg.dispatch(&f.ctl, &mut FitRequest::EnablePort).unwrap();
        let adp = f.reg.open(EndpointType::Adapter, f.sid, Some(adp_n)).unwrap();

        f.reg.dispatch(&f.ctl, &mut FitRequest::DisablePort).unwrap();
        assert_eq!(adp.adapter_state(), AdapterState::Suspending);
        assert_eq!(adp_hits.load(Ordering::SeqCst), 1);
        assert_eq!(ctl_hits.load(Ordering::SeqCst), 0);
        assert_eq!(next_event(&f.reg, &adp).unwrap(), FitEvent::Port(PortEvent::SuspendRequested));

        f.reg.dispatch(&adp, &mut FitRequest::SuspendConfirm).unwrap();
        assert_eq!(adp.adapter_state(), AdapterState::Disabled);
        assert_eq!(ctl_hits.load(Ordering::SeqCst), 1);
        assert_eq!(next_event(&f.reg, &f.ctl).unwrap(), FitEvent::Port(PortEvent::Suspended));

        assert_eq!(
            f.reg.dispatch(&adp, &mut FitRequest::SuspendConfirm).unwrap_err(),
            FitError::InvalidState
        );
    }

    #[test]
    fn closing_suspending_adapter_confirms_locally() {
        let f = active_controller(None);
        f.reg.dispatch(&f.ctl, &mut FitRequest::EnablePort).unwrap();
        let adp = f.reg.open(EndpointType::Adapter, f.sid, None).unwrap();
        f.reg.dispatch(&f.ctl, &mut FitRequest::DisablePort).unwrap();

        f.reg.close(adp).unwrap();
        assert_eq!(f.ctl.adapter_state(), AdapterState::Disabled);
        assert_eq!(next_event(&f.reg, &f.ctl).unwrap(), FitEvent::Port(PortEvent::Suspended));
        // adapter queue purged
        assert!(f.ctl.session().adapter.io.is_empty());
    }

    #[test]
    fn close_active_adapter_returns_to_ready() {
        let f = active_controller(None);
        f.reg.dispatch(&f.ctl, &mut FitRequest::EnablePort).unwrap();
        let adp = f.reg.open(EndpointType::Adapter, f.sid, None).unwrap();
        f.reg.close(adp).unwrap();
        assert_eq!(f.ctl.adapter_state(), AdapterState::Ready);

        // and can be reopened
        assert!(f.reg.open(EndpointType::Adapter, f.sid, None).is_ok());
    }

    #[test]
    fn dropped_adapter_handle_closes_port() {
        let (hits, n) = counter();
        let f = active_controller(Some(n));
        f.reg.dispatch(&f.ctl, &mut FitRequest::EnablePort).unwrap();
        let adp = f.reg.open(EndpointType::Adapter, f.sid, None).unwrap();
        f.reg.dispatch(&f.ctl, &mut FitRequest::DisablePort).unwrap();

        drop(adp);
        assert_eq!(f.ctl.adapter_state(), AdapterState::Disabled);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn superseded_adapter_handle_cannot_close_new_open() {
        let f = active_controller(None);
        f.reg.dispatch(&f.ctl, &mut FitRequest::EnablePort).unwrap();
        let old = f.reg.open(EndpointType::Adapter, f.sid, None).unwrap();
        f.reg.dispatch(&f.ctl, &mut FitRequest::DisablePort).unwrap();
        f.reg.dispatch(&old, &mut FitRequest::SuspendConfirm).unwrap();
        f.reg.dispatch(&f.ctl, &mut FitRequest::EnablePort).unwrap();

        let new = f.reg.open(EndpointType::Adapter, f.sid, None).unwrap();
        let old_debug = format!("{:?}", old);
        assert_eq!(f.reg.close(old).unwrap_err(), FitError::InvalidState);
        assert_eq!(new.adapter_state(), AdapterState::Active);
        assert!(new.is_current());
        assert_ne!(old_debug, format!("{:?}", new));

        f.reg.close(new).unwrap();
        assert_eq!(f.ctl.adapter_state(), AdapterState::Ready);
    }

    #[test]
    fn controller_close_after_adapter_close_does_not_wait() {
        let f = active_controller(None);
        f.reg.dispatch(&f.ctl, &mut FitRequest::EnablePort).unwrap();
        let adp = f.reg.open(EndpointType::Adapter, f.sid, None).unwrap();

        f.reg.close(adp).unwrap();
        let Fixture { reg, sid, ctl, .. } = f;
        reg.close(ctl).unwrap();
        assert_eq!(reg.controller_state(sid), Some(ControllerState::Ready));
        assert_eq!(reg.adapter_state(sid), Some(AdapterState::Ready));
    }
}
