//! `LoopbackTransport`: in-process `CnlTransport` for tests and the smoke
//! binary.
//!
//! Synchronous requests are answered from scripted state. Data requests are
//! parked until the caller completes them with `complete_next`/`complete`.
//! Events are injected with `raise`. Every call is recorded.
//! `before_next_open` runs a closure inside the next `open`, while the
//! caller is blocked in the transport.
//!
//! Callbacks into the fitting layer run after the loopback's own lock is
//! released.

use cnlfit_core::error::{FitError, Result};
use cnlfit_core::event::TransportEvent;
use cnlfit_core::id::{CnlHandle, RequestId};
use cnlfit_core::transport::{
    CnlStatus, CnlTransport, CompletionSink, DataOutcome, DataRequest, Direction, EventSink,
    LinkStats, RequestKind, TransportRequest,
};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// One recorded transport call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopbackCall {
    Open(CnlHandle),
    Close(CnlHandle),
    Request(RequestKind),
    Submit { direction: Direction, request_id: RequestId },
    Cancel(RequestId),
}

#[derive(Default)]
struct Faults {
    open: Option<FitError>,
    request: Option<FitError>,
    submit: Option<FitError>,
}

struct Pending {
    request: DataRequest,
    done: Box<dyn CompletionSink>,
}

type OpenHook = Box<dyn FnOnce() + Send>;

struct LoopState {
    sink: Option<Arc<dyn EventSink>>,
    open_hook: Option<OpenHook>,
    open: Option<CnlHandle>,
    faults: Faults,
    request_status: CnlStatus,
    stats: LinkStats,
    rx_frames: VecDeque<Vec<u8>>,
    pending: VecDeque<Pending>,
    calls: Vec<LoopbackCall>,
}

pub struct LoopbackTransport {
    state: Mutex<LoopState>,
    next_handle: AtomicU64,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LoopState {
                sink: None,
                open_hook: None,
                open: None,
                faults: Faults::default(),
                request_status: CnlStatus::SUCCESS,
                stats: LinkStats::default(),
                rx_frames: VecDeque::new(),
                pending: VecDeque::new(),
                calls: Vec::new(),
            }),
            next_handle: AtomicU64::new(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_handle(st: &LoopState, handle: CnlHandle) -> Result<()> {
        if st.open == Some(handle) {
            Ok(())
        } else {
            Err(FitError::InvalidState)
        }
    }

    // ── Scripting ──

    pub fn fail_next_open(&self, err: FitError) {
        self.state().faults.open = Some(err);
    }

    pub fn fail_next_request(&self, err: FitError) {
        self.state().faults.request = Some(err);
    }

    pub fn fail_next_submit(&self, err: FitError) {
        self.state().faults.submit = Some(err);
    }

    /// CNL status written into every later synchronous request.
    pub fn set_request_status(&self, status: CnlStatus) {
        self.state().request_status = status;
    }

    pub fn set_stats(&self, stats: LinkStats) {
        self.state().stats = stats;
    }

    /// Run `hook` at the start of the next `open`, outside the loopback lock.
    pub fn before_next_open<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.state().open_hook = Some(Box::new(hook));
    }

    /// Frame handed to the next completed receive.
    pub fn queue_rx(&self, frame: Vec<u8>) {
        self.state().rx_frames.push_back(frame);
    }

    // ── Driving ──

    /// Deliver `event` to the open session's sink. False when closed.
    pub fn raise(&self, event: TransportEvent) -> bool {
        let sink = self.state().sink.clone();
        match sink {
            Some(sink) => {
                sink.on_event(event);
                true
            }
            None => false,
        }
    }

    /// Complete the oldest in-flight data request.
    pub fn complete_next(&self, status: CnlStatus) -> bool {
        let pending = self.state().pending.pop_front();
        self.finish(pending, status)
    }

    pub fn complete(&self, request_id: RequestId, status: CnlStatus) -> bool {
        let pending = self.take_pending(request_id);
        self.finish(pending, status)
    }

    fn take_pending(&self, request_id: RequestId) -> Option<Pending> {
        let mut st = self.state();
        let idx = st.pending.iter().position(|p| p.request.request_id == request_id)?;
        st.pending.remove(idx)
    }

    fn finish(&self, pending: Option<Pending>, status: CnlStatus) -> bool {
        let Pending { request, done } = match pending {
            Some(p) => p,
            None => return false,
        };
        let outcome = match request.direction {
            Direction::Send => DataOutcome { status, length: request.length, buffer: Vec::new() },
            Direction::Receive if status.is_success() => {
                let mut frame = self.state().rx_frames.pop_front().unwrap_or_default();
                frame.truncate(request.length);
                DataOutcome { status, length: frame.len(), buffer: frame }
            }
            Direction::Receive => DataOutcome { status, length: 0, buffer: Vec::new() },
        };
        done.complete(outcome);
        true
    }

    // ── Inspection ──

    pub fn is_open(&self) -> bool {
        self.state().open.is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    pub fn calls(&self) -> Vec<LoopbackCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl CnlTransport for LoopbackTransport {
    fn open(&self, sink: Arc<dyn EventSink>) -> Result<CnlHandle> {
        let hook = self.state().open_hook.take();
        if let Some(hook) = hook {
            hook();
        }
        let mut st = self.state();
        if let Some(err) = st.faults.open.take() {
            return Err(err);
        }
        let handle = CnlHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        st.calls.push(LoopbackCall::Open(handle));
        st.open = Some(handle);
        st.sink = Some(sink);
        Ok(handle)
    }

    fn close(&self, handle: CnlHandle) {
        let abandoned: Vec<Pending> = {
            let mut st = self.state();
            st.calls.push(LoopbackCall::Close(handle));
            if st.open != Some(handle) {
                return;
            }
            st.open = None;
            st.sink = None;
            st.pending.drain(..).collect()
        };
        // Sinks (and their containers) are dropped without completing.
        drop(abandoned);
    }

    fn request(&self, handle: CnlHandle, req: &mut TransportRequest) -> Result<()> {
        let mut st = self.state();
        Self::check_handle(&st, handle)?;
        st.calls.push(LoopbackCall::Request(req.kind));
        if let Some(err) = st.faults.request.take() {
            return Err(err);
        }
        if let RequestKind::GetStats { stats } = &mut req.kind {
            *stats = st.stats;
        }
        req.status = st.request_status;
        Ok(())
    }

    fn submit(&self, handle: CnlHandle, req: DataRequest, done: Box<dyn CompletionSink>) -> Result<()> {
        let mut st = self.state();
        Self::check_handle(&st, handle)?;
        st.calls.push(LoopbackCall::Submit { direction: req.direction, request_id: req.request_id });
        if let Some(err) = st.faults.submit.take() {
            return Err(err);
        }
        st.pending.push_back(Pending { request: req, done });
        Ok(())
    }

    fn cancel(&self, handle: CnlHandle, request_id: RequestId) -> Result<()> {
        {
            let mut st = self.state();
            Self::check_handle(&st, handle)?;
            st.calls.push(LoopbackCall::Cancel(request_id));
        }
        let pending = self.take_pending(request_id).ok_or(FitError::NotFound)?;
        self.finish(Some(pending), CnlStatus::CANCELLED);
        Ok(())
    }
}
