//! cnlfit End-to-End Smoke Test
//!
//! Drives a `SessionRegistry` against the loopback transport:
//!   Part A: Controller open, connect, connect-indication
//!   Part B: Adapter open ordering
//!   Part C: Controller close force-closes an active adapter
//!   Part D: Port disable without a transport call
//!   Part E: Unregister while open, deferred teardown
//!   Part F: Data path: send, receive, cancel
//!
//! Run: ./target/release/cnlfit-smoke
//! Exit status is non-zero if any check fails.

use cnlfit::loopback::{LoopbackCall, LoopbackTransport};
use cnlfit::{Endpoint, FitConfig, PollWaker, SessionRegistry};

use cnlfit_core::event::{FitEvent, PortEvent, TransportEvent};
use cnlfit_core::id::{DeviceHandle, RequestId, SessionId, Uid};
use cnlfit_core::notifier::Notifier;
use cnlfit_core::state::{AdapterState, ControllerState};
use cnlfit_core::transport::{CnlStatus, Direction, ProtocolParams};
use cnlfit_core::{EndpointType, FitError, FitRequest};

use std::sync::Arc;
use std::thread;
use std::time::Duration;

// ── Test harness ──

struct TestRunner {
    total: usize,
    passed: usize,
    failed: usize,
}

const LINE: &str = "────────────────────────────────────────────────────────────";

impl TestRunner {
    fn new() -> Self {
        Self { total: 0, passed: 0, failed: 0 }
    }

    fn section(&self, name: &str) {
        println!("\n{}", LINE);
        println!("  {}", name);
        println!("{}", LINE);
    }

    fn pass(&mut self, name: &str) {
        self.total += 1;
        self.passed += 1;
        println!("  [{:2}] {:<52} PASS", self.total, name);
    }

    fn fail(&mut self, name: &str, reason: &str) {
        self.total += 1;
        self.failed += 1;
        println!("  [{:2}] {:<52} FAIL: {}", self.total, name, reason);
    }

    fn check(&mut self, name: &str, ok: bool, reason: &str) {
        if ok { self.pass(name); } else { self.fail(name, reason); }
    }

    fn expect<T: std::fmt::Debug + PartialEq>(&mut self, name: &str, got: T, want: T) {
        if got == want {
            self.pass(name);
        } else {
            self.fail(name, &format!("got {:?}, want {:?}", got, want));
        }
    }

    fn summary(&self) {
        println!("\n{}", LINE);
        println!(
            "  Total: {}  Passed: {}  Failed: {}",
            self.total, self.passed, self.failed
        );
        println!("{}", LINE);
    }
}

/// One registered device on the loopback transport.
struct Rig {
    reg: Arc<SessionRegistry>,
    lo: Arc<LoopbackTransport>,
    device: DeviceHandle,
    sid: SessionId,
}

fn rig(device: u64) -> Option<Rig> {
    let reg = Arc::new(SessionRegistry::new(FitConfig::from_env()));
    let lo = Arc::new(LoopbackTransport::new());
    let device = DeviceHandle(device);
    let sid = reg.register(device, lo.clone()).ok()?;
    Some(Rig { reg, lo, device, sid })
}

fn get_event(reg: &SessionRegistry, ep: &Endpoint) -> Result<FitEvent, FitError> {
    let mut req = FitRequest::get_event();
    reg.dispatch(ep, &mut req)?;
    req.take_event().ok_or(FitError::NotFound)
}

// ════════════════════════════════════════════════════════════
// Part A: Controller session
// ════════════════════════════════════════════════════════════

fn test_controller(t: &mut TestRunner) {
    t.section("Part A: Controller open / connect / indication");

    let r = match rig(1) {
        Some(r) => r,
        None => return t.fail("register", "registry refused device"),
    };
    t.pass("register device");

    let waker = match PollWaker::new() {
        Ok(w) => Arc::new(w),
        Err(e) => return t.fail("create poll waker", &e.to_string()),
    };
    let notifier: Arc<dyn Notifier> = waker.clone();

    let ctl = match r.reg.open(EndpointType::Controller, r.sid, Some(notifier)) {
        Ok(ep) => ep,
        Err(e) => return t.fail("open controller", &e.to_string()),
    };
    t.expect("controller ACTIVE after open", ctl.controller_state(), ControllerState::Active);
    t.expect(
        "second open rejected",
        r.reg.open(EndpointType::Controller, r.sid, None).err(),
        Some(FitError::InvalidState),
    );

    let mut connect = FitRequest::connect(ProtocolParams::default());
    let res = r.reg.dispatch(&ctl, &mut connect);
    t.check("connect request", res.is_ok() && connect.status() == Some(CnlStatus::SUCCESS), "transport refused");

    let peer = Uid([0x02, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77]);
    r.lo.raise(TransportEvent::ConnectInd { uid: peer, params: ProtocolParams::default() });
    t.check("poller woken", waker.wait(Some(Duration::from_millis(500))), "no wake-up");
    waker.drain();
    t.check("has_event reports data", r.reg.has_event(&ctl).is_ok(), "queue empty");

    match get_event(&r.reg, &ctl) {
        Ok(FitEvent::ConnectInd { uid, .. }) => t.expect("connect-indication peer UID", uid, peer),
        other => t.fail("connect-indication", &format!("{:?}", other)),
    }

    let mut accept = FitRequest::accept(ProtocolParams::default());
    let res = r.reg.dispatch(&ctl, &mut accept);
    t.check(
        "accept uses remembered peer",
        res.is_ok() && matches!(accept, FitRequest::Accept { peer: p, .. } if p == peer),
        "peer not carried",
    );

    t.check("close controller", r.reg.close(ctl).is_ok(), "close failed");
    t.expect("controller READY after close", r.reg.controller_state(r.sid), Some(ControllerState::Ready));
}

// ════════════════════════════════════════════════════════════
// Part B: Adapter ordering
// ════════════════════════════════════════════════════════════

fn test_adapter_order(t: &mut TestRunner) {
    t.section("Part B: Adapter open requires ACTIVE controller");

    let r = match rig(2) {
        Some(r) => r,
        None => return t.fail("register", "registry refused device"),
    };
    t.expect(
        "adapter before controller",
        r.reg.open(EndpointType::Adapter, r.sid, None).err(),
        Some(FitError::InvalidState),
    );

    let ctl = match r.reg.open(EndpointType::Controller, r.sid, None) {
        Ok(ep) => ep,
        Err(e) => return t.fail("open controller", &e.to_string()),
    };
    t.expect(
        "adapter with port disabled",
        r.reg.open(EndpointType::Adapter, r.sid, None).err(),
        Some(FitError::InvalidState),
    );
    t.check("enable port", r.reg.dispatch(&ctl, &mut FitRequest::EnablePort).is_ok(), "refused");
    let adp = r.reg.open(EndpointType::Adapter, r.sid, None);
    t.check("adapter open after enable", adp.is_ok(), "refused");
    if let Ok(adp) = adp {
        let mut id = FitRequest::GetAdapterId { adapter_id: u32::MAX };
        let _ = r.reg.dispatch(&adp, &mut id);
        t.check(
            "adapter id is session id",
            matches!(id, FitRequest::GetAdapterId { adapter_id } if adapter_id == r.sid.as_u32()),
            "mismatch",
        );
        t.expect(
            "controller command on adapter",
            r.reg.dispatch(&adp, &mut FitRequest::init()).err(),
            Some(FitError::BadParameter),
        );
        let _ = r.reg.close(adp);
    }
    let _ = r.reg.close(ctl);
}

// ════════════════════════════════════════════════════════════
// Part C: Force close
// ════════════════════════════════════════════════════════════

fn test_force_close(t: &mut TestRunner) {
    t.section("Part C: Controller close force-closes adapter");

    let r = match rig(3) {
        Some(r) => r,
        None => return t.fail("register", "registry refused device"),
    };
    let ctl = match r.reg.open(EndpointType::Controller, r.sid, None) {
        Ok(ep) => ep,
        Err(e) => return t.fail("open controller", &e.to_string()),
    };
    let _ = r.reg.dispatch(&ctl, &mut FitRequest::EnablePort);
    let adp = match r.reg.open(EndpointType::Adapter, r.sid, None) {
        Ok(ep) => ep,
        Err(e) => return t.fail("open adapter", &e.to_string()),
    };

    let (reg, sid) = (Arc::clone(&r.reg), r.sid);
    let closer = thread::spawn(move || {
        let res = reg.close(ctl);
        (res, reg.controller_state(sid))
    });

    let mut saw_force = false;
    for _ in 0..200 {
        if adp.adapter_state() == AdapterState::ForceClose {
            saw_force = true;
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    t.check("adapter enters FORCE_CLOSE", saw_force, "state never changed");
    thread::sleep(Duration::from_millis(20));
    t.check("controller close blocks", !closer.is_finished(), "close returned early");
    t.expect("adapter poll reports hang-up", r.reg.has_event(&adp).err(), Some(FitError::InvalidState));

    t.check("adapter close", r.reg.close(adp).is_ok(), "close failed");
    match closer.join() {
        Ok((res, state)) => {
            t.check("controller close completes", res.is_ok(), "close failed");
            t.expect("controller READY", state, Some(ControllerState::Ready));
        }
        Err(_) => t.fail("controller close completes", "closer panicked"),
    }
    t.expect("adapter DISABLED", r.reg.adapter_state(r.sid), Some(AdapterState::Disabled));
}

// ════════════════════════════════════════════════════════════
// Part D: Port disable
// ════════════════════════════════════════════════════════════

fn test_port_disable(t: &mut TestRunner) {
    t.section("Part D: Disable READY port");

    let r = match rig(4) {
        Some(r) => r,
        None => return t.fail("register", "registry refused device"),
    };
    let ctl = match r.reg.open(EndpointType::Controller, r.sid, None) {
        Ok(ep) => ep,
        Err(e) => return t.fail("open controller", &e.to_string()),
    };
    let _ = r.reg.dispatch(&ctl, &mut FitRequest::EnablePort);
    r.lo.clear_calls();

    t.check("disable port", r.reg.dispatch(&ctl, &mut FitRequest::DisablePort).is_ok(), "refused");
    t.expect("adapter DISABLED", ctl.adapter_state(), AdapterState::Disabled);
    t.expect("no transport call", r.lo.calls(), Vec::new());
    t.expect("port-suspended event", get_event(&r.reg, &ctl).ok(), Some(FitEvent::Port(PortEvent::Suspended)));
    t.expect("exactly one event", get_event(&r.reg, &ctl).err(), Some(FitError::NotFound));
    let _ = r.reg.close(ctl);
}

// ════════════════════════════════════════════════════════════
// Part E: Unregister while active
// ════════════════════════════════════════════════════════════

fn test_unregister(t: &mut TestRunner) {
    t.section("Part E: Unregister ACTIVE session");

    let r = match rig(5) {
        Some(r) => r,
        None => return t.fail("register", "registry refused device"),
    };
    let ctl = match r.reg.open(EndpointType::Controller, r.sid, None) {
        Ok(ep) => ep,
        Err(e) => return t.fail("open controller", &e.to_string()),
    };

    t.check("unregister", r.reg.unregister(r.device).is_ok(), "refused");
    t.expect("session GONE", ctl.controller_state(), ControllerState::Gone);
    t.expect("double unregister", r.reg.unregister(r.device).err(), Some(FitError::InvalidState));
    t.check("close frees session", r.reg.close(ctl).is_ok(), "close failed");
    t.expect("slot cleared", r.reg.session_count(), 0);
    t.expect(
        "reopen after teardown",
        r.reg.open(EndpointType::Controller, r.sid, None).err(),
        Some(FitError::NotFound),
    );
}

// ════════════════════════════════════════════════════════════
// Part F: Data path
// ════════════════════════════════════════════════════════════

fn test_data_path(t: &mut TestRunner) {
    t.section("Part F: Send / receive / cancel");

    let r = match rig(6) {
        Some(r) => r,
        None => return t.fail("register", "registry refused device"),
    };
    let ctl = match r.reg.open(EndpointType::Controller, r.sid, None) {
        Ok(ep) => ep,
        Err(e) => return t.fail("open controller", &e.to_string()),
    };

    let sent = r.reg.dispatch(&ctl, &mut FitRequest::send(RequestId(1), 0, b"hello".to_vec()));
    t.check("send submitted", sent.is_ok(), "refused");
    r.lo.queue_rx(b"world".to_vec());
    let recv = r.reg.dispatch(&ctl, &mut FitRequest::receive(RequestId(2), 0, 16));
    t.check("receive submitted", recv.is_ok(), "refused");
    t.expect("two in flight", r.lo.pending_count(), 2);

    r.lo.complete(RequestId(2), CnlStatus::SUCCESS);
    r.lo.complete(RequestId(1), CnlStatus::SUCCESS);
    match get_event(&r.reg, &ctl) {
        Ok(FitEvent::DataComplete { direction: Direction::Receive, buffer, .. }) => {
            t.expect("receive completes first", buffer, b"world".to_vec())
        }
        other => t.fail("receive completes first", &format!("{:?}", other)),
    }
    match get_event(&r.reg, &ctl) {
        Ok(FitEvent::DataComplete { direction: Direction::Send, length, .. }) => {
            t.expect("send length", length, 5)
        }
        other => t.fail("send completion", &format!("{:?}", other)),
    }

    let _ = r.reg.dispatch(&ctl, &mut FitRequest::send(RequestId(3), 0, vec![0; 4]));
    let mut cancel = FitRequest::cancel(RequestId(3));
    let res = r.reg.dispatch(&ctl, &mut cancel);
    t.check("cancel dispatched", res.is_ok() && cancel.status() == Some(CnlStatus::SUCCESS), "cancel failed");
    t.check(
        "transport saw cancel",
        r.lo.calls().contains(&LoopbackCall::Cancel(RequestId(3))),
        "not forwarded",
    );
    match get_event(&r.reg, &ctl) {
        Ok(FitEvent::DataComplete { status, .. }) => t.expect("cancelled completion", status, CnlStatus::CANCELLED),
        other => t.fail("cancelled completion", &format!("{:?}", other)),
    }

    let _ = r.reg.close(ctl);
    t.expect("pool fully returned", r.reg.pool().in_use(), 0);
}

fn main() {
    println!("cnlfit smoke test");
    let mut t = TestRunner::new();

    test_controller(&mut t);
    test_adapter_order(&mut t);
    test_force_close(&mut t);
    test_port_disable(&mut t);
    test_unregister(&mut t);
    test_data_path(&mut t);

    t.summary();
    if t.failed > 0 {
        std::process::exit(1);
    }
}
