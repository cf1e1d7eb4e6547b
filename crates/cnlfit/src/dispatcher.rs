//! Command dispatch for open endpoints.
//!
//! ```text
//!   dispatch(endpoint, request)
//!     ├─ permission table ──────────── BadParameter on mismatch
//!     ├─ handle generation ─────────── InvalidState once the open ended
//!     ├─ init/connect/accept/...  ──── blocking transport request
//!     ├─ send/receive ──────────────── async submit + completion sink
//!     ├─ cancel ────────────────────── transport cancel, status in reply
//!     ├─ get-event / stop-event ────── endpoint queue
//!     └─ port commands ─────────────── adapter state machine
//! ```

use cnlfit_core::command::EndpointType;
use cnlfit_core::error::{FitError, Result};
use cnlfit_core::request::{DataArgs, FitRequest};
use cnlfit_core::transport::{
    CnlStatus, CompletionSink, DataOutcome, DataRequest, Direction, RequestKind, TransportRequest,
};
use cnlfit_core::{fit_debug, fit_trace, fit_warn};

use std::sync::{Arc, Weak};

use crate::adapter::{disable_port, enable_port, suspend_confirm};
use crate::controller::ControllerSession;
use crate::pool::{Container, Payload};
use crate::registry::{Endpoint, SessionRegistry};
use crate::translate::translate;

impl SessionRegistry {
    /// Execute one client command on `endpoint`. Out-fields are written back
    /// into `req`.
    pub fn dispatch(&self, endpoint: &Endpoint, req: &mut FitRequest) -> Result<()> {
        execute(endpoint, req)
    }
}

/// Dispatch path shared by clients and the controller's internal close.
pub(crate) fn execute(endpoint: &Endpoint, req: &mut FitRequest) -> Result<()> {
    let cmd = req.command();
    if !cmd.permitted_on(endpoint.kind()) {
        fit_debug!("{:?} refused on {} endpoint", cmd, endpoint.kind());
        return Err(FitError::BadParameter);
    }
    if !endpoint.is_current() {
        fit_debug!("{}: {:?} on stale {} handle", endpoint.session_id(), cmd, endpoint.kind());
        return Err(FitError::InvalidState);
    }
    fit_trace!("{}: {:?} on {}", endpoint.session_id(), cmd, endpoint.kind());

    let session = endpoint.session();
    if cmd.is_transport_request() {
        return transport_request(session, req);
    }

    match req {
        FitRequest::EnablePort => enable_port(endpoint),
        FitRequest::DisablePort => disable_port(endpoint),
        FitRequest::SuspendConfirm => suspend_confirm(endpoint),
        FitRequest::GetAdapterId { adapter_id } => {
            *adapter_id = session.id.as_u32();
            Ok(())
        }
        // Obsolete; kept for client compatibility.
        FitRequest::SyncReceive => Ok(()),
        FitRequest::StopEvent => {
            endpoint.io().stop();
            Ok(())
        }
        FitRequest::GetEvent { event } => {
            let container = endpoint.io().dequeue().ok_or(FitError::NotFound)?;
            *event = Some(translate(session, container));
            Ok(())
        }
        FitRequest::SendData(args) => submit_data(endpoint, Direction::Send, args),
        FitRequest::ReceiveData(args) => submit_data(endpoint, Direction::Receive, args),
        FitRequest::Cancel { request_id, status } => {
            let handle = session.cnl_handle().ok_or(FitError::InvalidState)?;
            // The outcome is reported in `status` only; dispatch succeeds.
            *status = match session.transport.cancel(handle, *request_id) {
                Ok(()) => CnlStatus::SUCCESS,
                Err(e) => {
                    fit_debug!("{}: cancel {:?}: {}", session.id, request_id, e);
                    CnlStatus::FAILURE
                }
            };
            Ok(())
        }
        other => {
            fit_warn!("{:?} reached the dispatcher unhandled", other.command());
            Err(FitError::BadParameter)
        }
    }
}

/// Run one blocking transport request and copy the results back.
///
/// Returns the transport call's own result; the CNL status travels in the
/// request.
fn transport_request(session: &ControllerSession, req: &mut FitRequest) -> Result<()> {
    let handle = session.cnl_handle().ok_or(FitError::InvalidState)?;
    let kind = match req {
        FitRequest::Init { .. } => RequestKind::Init,
        FitRequest::Close { .. } => RequestKind::Close,
        FitRequest::Connect { params, .. } => RequestKind::Connect { params: *params },
        FitRequest::WaitConnect { params, .. } => RequestKind::WaitConnect { params: *params },
        FitRequest::Accept { params, .. } => RequestKind::Accept {
            uid: session.peer().ok_or(FitError::InvalidState)?,
            params: *params,
        },
        FitRequest::Confirm { params, .. } => RequestKind::Confirm {
            uid: session.peer().ok_or(FitError::InvalidState)?,
            params: *params,
        },
        FitRequest::Release { .. } => RequestKind::Release,
        FitRequest::PowerSave { settings, .. } => RequestKind::PowerSave { settings: *settings },
        FitRequest::GetStats { stats, .. } => RequestKind::GetStats { stats: *stats },
        _ => return Err(FitError::BadParameter),
    };

    let mut container = session.pool.alloc(Payload::Request(TransportRequest::new(kind)))?;
    let record = container.request_mut().ok_or(FitError::BadParameter)?;
    let result = session.transport.request(handle, record);
    if let Err(e) = &result {
        fit_debug!("{}: transport request {:?} failed: {}", session.id, record.kind, e);
    }
    write_back(req, record);
    result
}

fn write_back(req: &mut FitRequest, record: &TransportRequest) {
    match (req, record.kind) {
        (FitRequest::Init { status }, _)
        | (FitRequest::Close { status }, _)
        | (FitRequest::Release { status }, _) => *status = record.status,
        (FitRequest::Connect { params, status }, RequestKind::Connect { params: out })
        | (FitRequest::WaitConnect { params, status }, RequestKind::WaitConnect { params: out }) => {
            *params = out;
            *status = record.status;
        }
        (FitRequest::Accept { params, peer, status }, RequestKind::Accept { uid, params: out })
        | (FitRequest::Confirm { params, peer, status }, RequestKind::Confirm { uid, params: out }) => {
            *params = out;
            *peer = uid;
            *status = record.status;
        }
        (FitRequest::PowerSave { settings, status }, RequestKind::PowerSave { settings: out }) => {
            *settings = out;
            *status = record.status;
        }
        (FitRequest::GetStats { stats, status }, RequestKind::GetStats { stats: out }) => {
            *stats = out;
            *status = record.status;
        }
        _ => {}
    }
}

fn submit_data(endpoint: &Endpoint, direction: Direction, args: &mut DataArgs) -> Result<()> {
    let session = endpoint.session();
    let handle = session.cnl_handle().ok_or(FitError::InvalidState)?;
    if direction == Direction::Send && args.buffer.len() < args.length {
        return Err(FitError::BadParameter);
    }

    let container = session.pool.alloc(Payload::Data { direction, request_id: args.request_id })?;
    let request = DataRequest {
        direction,
        request_id: args.request_id,
        profile_id: args.profile_id,
        fragmented: args.fragmented,
        length: args.length,
        buffer: std::mem::take(&mut args.buffer),
    };
    let done = Box::new(DataCompletion {
        container,
        session: Arc::downgrade(session),
        endpoint: endpoint.kind(),
    });
    // On rejection the transport drops `done`, freeing the container.
    session.transport.submit(handle, request, done).map_err(|e| {
        fit_debug!("{}: submit {:?} {:?} rejected: {}", session.id, direction, args.request_id, e);
        e
    })
}

/// One-shot completion for an in-flight data request. Re-tags its container
/// as a completion and queues it on the issuing endpoint.
struct DataCompletion {
    container: Container,
    session: Weak<ControllerSession>,
    endpoint: EndpointType,
}

impl CompletionSink for DataCompletion {
    fn complete(self: Box<Self>, outcome: DataOutcome) {
        let DataCompletion { mut container, session, endpoint } = *self;
        let session = match session.upgrade() {
            Some(s) => s,
            None => return,
        };
        let (direction, request_id) = match container.payload() {
            Payload::Data { direction, request_id } => (*direction, *request_id),
            other => {
                fit_warn!("{}: completion on {:?}", session.id, other);
                return;
            }
        };
        container.set(Payload::Completion { direction, request_id, outcome });
        session.io_for(endpoint).enqueue(container);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FitConfig;
    use crate::loopback::{LoopbackCall, LoopbackTransport};
    use crate::pool::AllocPolicy;
    use cnlfit_core::command::Command;
    use cnlfit_core::event::{FitEvent, TransportEvent};
    use cnlfit_core::id::{DeviceHandle, RequestId, SessionId, Uid};
    use cnlfit_core::notifier::Notifier;
    use cnlfit_core::transport::{LinkStats, PowerSave, ProtocolParams};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Fixture {
        reg: SessionRegistry,
        lo: Arc<LoopbackTransport>,
        sid: SessionId,
        ctl: Endpoint,
    }

    fn open_with(config: FitConfig, notifier: Option<Arc<dyn Notifier>>) -> Fixture {
        let reg = SessionRegistry::new(config);
        let lo = Arc::new(LoopbackTransport::new());
        let sid = reg.register(DeviceHandle(3), lo.clone()).unwrap();
        let ctl = reg.open(EndpointType::Controller, sid, notifier).unwrap();
        Fixture { reg, lo, sid, ctl }
    }

    fn open() -> Fixture {
        open_with(FitConfig::default(), None)
    }

    fn with_adapter(f: &Fixture) -> Endpoint {
        f.reg.dispatch(&f.ctl, &mut FitRequest::EnablePort).unwrap();
        f.reg.open(EndpointType::Adapter, f.sid, None).unwrap()
    }

    fn next_event(f: &Fixture, ep: &Endpoint) -> Result<FitEvent> {
        let mut req = FitRequest::get_event();
        f.reg.dispatch(ep, &mut req)?;
        req.take_event().ok_or(FitError::NotFound)
    }

    fn sample_for(cmd: Command) -> FitRequest {
        match cmd {
            Command::Init => FitRequest::init(),
            Command::Close => FitRequest::close(),
            Command::Connect => FitRequest::connect(ProtocolParams::default()),
            Command::WaitConnect => FitRequest::wait_connect(),
            Command::Accept => FitRequest::accept(ProtocolParams::default()),
            Command::Confirm => FitRequest::confirm(ProtocolParams::default()),
            Command::Release => FitRequest::release(),
            Command::EnablePort => FitRequest::EnablePort,
            Command::DisablePort => FitRequest::DisablePort,
            Command::GetStats => FitRequest::get_stats(),
            Command::PowerSave => FitRequest::power_save(PowerSave::default()),
            Command::SuspendConfirm => FitRequest::SuspendConfirm,
            Command::GetAdapterId => FitRequest::GetAdapterId { adapter_id: 0 },
            Command::GetEvent => FitRequest::get_event(),
            Command::SyncReceive => FitRequest::SyncReceive,
            Command::StopEvent => FitRequest::StopEvent,
            Command::SendData => FitRequest::send(RequestId(1), 0, vec![0]),
            Command::ReceiveData => FitRequest::receive(RequestId(1), 0, 4),
            Command::Cancel => FitRequest::cancel(RequestId(1)),
        }
    }

    #[test]
    fn permission_table_enforced() {
        let f = open();
        let adp = with_adapter(&f);
        for cmd in Command::ALL {
            for ep in [&f.ctl, &adp] {
                if cmd.permitted_on(ep.kind()) {
                    continue;
                }
                let mut req = sample_for(cmd);
                assert_eq!(f.reg.dispatch(ep, &mut req).unwrap_err(), FitError::BadParameter, "{:?}", cmd);
            }
        }
    }

    #[test]
    fn request_returns_transport_result_and_status() {
        let f = open();
        f.lo.set_request_status(CnlStatus::REJECTED);
        let mut req = FitRequest::connect(ProtocolParams::default());
        assert!(f.reg.dispatch(&f.ctl, &mut req).is_ok());
        assert_eq!(req.status(), Some(CnlStatus::REJECTED));

        f.lo.fail_next_request(FitError::SystemError(110));
        let mut req = FitRequest::init();
        assert_eq!(f.reg.dispatch(&f.ctl, &mut req).unwrap_err(), FitError::SystemError(110));
        assert_eq!(f.reg.pool().in_use(), 0);
    }

    #[test]
    fn get_stats_copies_out_fields() {
        let f = open();
        let stats = LinkStats { tx_frames: 4, rx_frames: 9, link_quality: 77, ..LinkStats::default() };
        f.lo.set_stats(stats);
        let mut req = FitRequest::get_stats();
        f.reg.dispatch(&f.ctl, &mut req).unwrap();
        assert!(matches!(req, FitRequest::GetStats { stats: s, .. } if s == stats));
    }

    #[test]
    fn accept_uses_remembered_peer() {
        let f = open();
        let mut req = FitRequest::accept(ProtocolParams::default());
        assert_eq!(f.reg.dispatch(&f.ctl, &mut req).unwrap_err(), FitError::InvalidState);

        let uid = Uid([9, 8, 7, 6, 5, 4, 3, 2]);
        f.lo.raise(TransportEvent::ConnectInd { uid, params: ProtocolParams::default() });
        next_event(&f, &f.ctl).unwrap();

        let mut req = FitRequest::accept(ProtocolParams::default());
        f.reg.dispatch(&f.ctl, &mut req).unwrap();
        assert!(matches!(req, FitRequest::Accept { peer, .. } if peer == uid));
        assert!(f.lo.calls().iter().any(
            |c| matches!(c, LoopbackCall::Request(RequestKind::Accept { uid: u, .. }) if *u == uid)
        ));
    }

    #[test]
    fn superseded_adapter_handle_is_refused() {
        let f = open();
        let old = with_adapter(&f);
        f.reg.dispatch(&f.ctl, &mut FitRequest::DisablePort).unwrap();
        f.reg.dispatch(&old, &mut FitRequest::SuspendConfirm).unwrap();
        f.reg.dispatch(&f.ctl, &mut FitRequest::EnablePort).unwrap();
        let new = f.reg.open(EndpointType::Adapter, f.sid, None).unwrap();
        assert!(!old.is_current());
        f.lo.clear_calls();

        for mut req in [
            FitRequest::send(RequestId(1), 0, vec![1]),
            FitRequest::StopEvent,
            FitRequest::get_event(),
            FitRequest::cancel(RequestId(1)),
        ] {
            assert_eq!(f.reg.dispatch(&old, &mut req).unwrap_err(), FitError::InvalidState);
        }
        assert!(f.lo.calls().is_empty());
        assert_eq!(f.reg.has_event(&old).unwrap_err(), FitError::InvalidState);

        // permission check still comes first
        assert_eq!(f.reg.dispatch(&old, &mut FitRequest::init()).unwrap_err(), FitError::BadParameter);

        assert!(new.is_current());
        f.reg.dispatch(&new, &mut FitRequest::send(RequestId(2), 0, vec![1])).unwrap();
        assert_eq!(f.lo.pending_count(), 1);
    }

    #[test]
    fn send_completes_on_issuing_endpoint() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let n: Arc<dyn Notifier> = Arc::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let f = open_with(FitConfig::default(), Some(n));

        f.reg.dispatch(&f.ctl, &mut FitRequest::send(RequestId(11), 1, vec![1, 2, 3])).unwrap();
        assert_eq!(f.lo.pending_count(), 1);
        assert_eq!(f.reg.pool().in_use(), 1);
        assert_eq!(next_event(&f, &f.ctl).unwrap_err(), FitError::NotFound);

        assert!(f.lo.complete_next(CnlStatus::SUCCESS));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        match next_event(&f, &f.ctl).unwrap() {
            FitEvent::DataComplete { direction, request_id, status, length, .. } => {
                assert_eq!(direction, Direction::Send);
                assert_eq!(request_id, RequestId(11));
                assert_eq!(status, CnlStatus::SUCCESS);
                assert_eq!(length, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(f.reg.pool().in_use(), 0);
    }

    #[test]
    fn receive_on_adapter_completes_on_adapter() {
        let f = open();
        let adp = with_adapter(&f);
        f.lo.queue_rx(vec![5, 6]);
        f.reg.dispatch(&adp, &mut FitRequest::receive(RequestId(2), 0, 8)).unwrap();
        assert!(f.lo.complete(RequestId(2), CnlStatus::SUCCESS));

        assert_eq!(next_event(&f, &f.ctl).unwrap_err(), FitError::NotFound);
        match next_event(&f, &adp).unwrap() {
            FitEvent::DataComplete { direction, buffer, length, .. } => {
                assert_eq!(direction, Direction::Receive);
                assert_eq!(buffer, vec![5, 6]);
                assert_eq!(length, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn short_send_buffer_is_bad_parameter() {
        let f = open();
        let mut req = FitRequest::send(RequestId(1), 0, vec![1]);
        if let FitRequest::SendData(args) = &mut req {
            args.length = 4;
        }
        assert_eq!(f.reg.dispatch(&f.ctl, &mut req).unwrap_err(), FitError::BadParameter);
        assert!(f.lo.calls().iter().all(|c| !matches!(c, LoopbackCall::Submit { .. })));
    }

    #[test]
    fn rejected_submit_frees_container() {
        let f = open();
        f.lo.fail_next_submit(FitError::SystemError(16));
        assert_eq!(
            f.reg.dispatch(&f.ctl, &mut FitRequest::send(RequestId(1), 0, vec![1])).unwrap_err(),
            FitError::SystemError(16)
        );
        assert_eq!(f.reg.pool().in_use(), 0);
    }

    #[test]
    fn exhausted_pool_refuses_submit() {
        let f = open_with(FitConfig::new().pool_size(1).pool_policy(AllocPolicy::Fail), None);
        f.reg.dispatch(&f.ctl, &mut FitRequest::send(RequestId(1), 0, vec![1])).unwrap();
        assert_eq!(
            f.reg.dispatch(&f.ctl, &mut FitRequest::send(RequestId(2), 0, vec![1])).unwrap_err(),
            FitError::ResourceExhausted
        );
    }

    #[test]
    fn cancel_reports_status_and_always_succeeds() {
        let f = open();
        f.reg.dispatch(&f.ctl, &mut FitRequest::send(RequestId(7), 0, vec![1])).unwrap();

        let mut req = FitRequest::cancel(RequestId(7));
        assert!(f.reg.dispatch(&f.ctl, &mut req).is_ok());
        assert_eq!(req.status(), Some(CnlStatus::SUCCESS));
        match next_event(&f, &f.ctl).unwrap() {
            FitEvent::DataComplete { status, .. } => assert_eq!(status, CnlStatus::CANCELLED),
            other => panic!("unexpected {:?}", other),
        }

        // Transport-level cancel failure only shows in the status field;
        // dispatch still returns Ok.
        let mut req = FitRequest::cancel(RequestId(99));
        assert!(f.reg.dispatch(&f.ctl, &mut req).is_ok());
        assert_eq!(req.status(), Some(CnlStatus::FAILURE));
    }

    #[test]
    fn get_event_fifo_and_stop() {
        let f = open();
        for kind in 1..=3 {
            f.lo.raise(TransportEvent::Other { kind });
        }
        f.lo.raise(TransportEvent::Error { status: CnlStatus::TIMEOUT });

        f.reg.dispatch(&f.ctl, &mut FitRequest::StopEvent).unwrap();
        f.reg.dispatch(&f.ctl, &mut FitRequest::StopEvent).unwrap();

        for _ in 0..3 {
            assert_eq!(next_event(&f, &f.ctl).unwrap(), FitEvent::Unknown);
        }
        assert_eq!(next_event(&f, &f.ctl).unwrap(), FitEvent::ErrorInd { status: CnlStatus::TIMEOUT });
        assert_eq!(next_event(&f, &f.ctl).unwrap_err(), FitError::NotFound);
    }

    #[test]
    fn notifier_may_dispatch_get_event() {
        let reg = Arc::new(SessionRegistry::new(FitConfig::default()));
        let lo = Arc::new(LoopbackTransport::new());
        let sid = reg.register(DeviceHandle(3), lo.clone()).unwrap();

        let slot: Arc<Mutex<Option<Endpoint>>> = Arc::new(Mutex::new(None));
        let seen: Arc<Mutex<Vec<FitEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let (weak, slot2, seen2) = (Arc::downgrade(&reg), Arc::clone(&slot), Arc::clone(&seen));
        let n: Arc<dyn Notifier> = Arc::new(move || {
            let reg = match weak.upgrade() {
                Some(reg) => reg,
                None => return,
            };
            let held = slot2.lock().unwrap();
            if let Some(ep) = held.as_ref() {
                let mut req = FitRequest::get_event();
                if reg.dispatch(ep, &mut req).is_ok() {
                    seen2.lock().unwrap().extend(req.take_event());
                }
            }
        });
        let ep = reg.open(EndpointType::Controller, sid, Some(n)).unwrap();
        *slot.lock().unwrap() = Some(ep);

        // from inside a transport event
        assert!(lo.raise(TransportEvent::Other { kind: 5 }));
        assert_eq!(seen.lock().unwrap().as_slice(), &[FitEvent::Unknown]);

        // from inside a data completion
        {
            let held = slot.lock().unwrap();
            let ep = held.as_ref().unwrap();
            reg.dispatch(ep, &mut FitRequest::send(RequestId(21), 0, vec![1, 2])).unwrap();
        }
        assert!(lo.complete_next(CnlStatus::SUCCESS));
        {
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 2);
            assert!(matches!(
                seen[1],
                FitEvent::DataComplete { request_id: RequestId(21), status: CnlStatus::SUCCESS, .. }
            ));
        }
        assert_eq!(reg.pool().in_use(), 0);

        let ep = slot.lock().unwrap().take().unwrap();
        reg.close(ep).unwrap();
    }

    #[test]
    fn adapter_id_and_sync_receive() {
        let f = open();
        let adp = with_adapter(&f);
        let mut req = FitRequest::GetAdapterId { adapter_id: 99 };
        f.reg.dispatch(&adp, &mut req).unwrap();
        assert!(matches!(req, FitRequest::GetAdapterId { adapter_id } if adapter_id == f.sid.as_u32()));
        assert!(f.reg.dispatch(&adp, &mut FitRequest::SyncReceive).is_ok());
    }
}
