//! CNL transport operations interface.
//!
//! The fitting layer never implements the wireless protocol; it drives a
//! `CnlTransport` supplied at registration time.
//!
//! # Contract
//!
//! - `request()` blocks until the transport has finished the request and
//!   written its CNL status (and any out-fields) into the record.
//! - `submit()` returns as soon as the data request is queued. On `Ok` the
//!   transport owns the `CompletionSink` and must call `complete()` exactly
//!   once. On `Err` it must drop the sink without completing it.
//! - `EventSink::on_event()` may be called from any thread, at any time
//!   between `open()` and the return of `close()`.

use std::sync::Arc;

use crate::error::Result;
use crate::event::TransportEvent;
use crate::id::{CnlHandle, RequestId, Uid};

/// Result code of a CNL request, as reported by the transport.
///
/// Independent from the `Result` of the operation that carried it: a request
/// may be executed successfully and still report a failing CNL status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct CnlStatus(pub i32);

impl CnlStatus {
    pub const SUCCESS: Self = Self(0);
    pub const FAILURE: Self = Self(-1);
    pub const TIMEOUT: Self = Self(-2);
    pub const CANCELLED: Self = Self(-3);
    pub const REJECTED: Self = Self(-4);

    #[inline]
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }
}

/// Length of the opaque protocol parameter block.
pub const PROTOCOL_PARAMS_LEN: usize = 16;

/// Upper-layer protocol parameters exchanged during connection setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtocolParams(pub [u8; PROTOCOL_PARAMS_LEN]);

/// Power-save settings requested from, or reported by, the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PowerSave {
    pub enable: bool,
    /// Dormant period in milliseconds.
    pub dormant_period: u32,
    /// Awake period in milliseconds.
    pub awake_period: u32,
}

/// Link counters returned by a get-stats request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStats {
    pub tx_frames: u32,
    pub rx_frames: u32,
    pub tx_errors: u32,
    pub rx_errors: u32,
    pub retries: u32,
    pub link_quality: u8,
}

/// Kind-specific fields of a synchronous request.
///
/// Fields are in/out: the transport may overwrite them with its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Init,
    Close,
    Connect { params: ProtocolParams },
    WaitConnect { params: ProtocolParams },
    Accept { uid: Uid, params: ProtocolParams },
    Confirm { uid: Uid, params: ProtocolParams },
    Release,
    PowerSave { settings: PowerSave },
    GetStats { stats: LinkStats },
}

/// A synchronous transport request record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportRequest {
    pub kind: RequestKind,
    /// Written by the transport.
    pub status: CnlStatus,
}

impl TransportRequest {
    pub fn new(kind: RequestKind) -> Self {
        Self { kind, status: CnlStatus::SUCCESS }
    }
}

/// Direction of a data request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Send,
    Receive,
}

/// An asynchronous data request record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRequest {
    pub direction: Direction,
    pub request_id: RequestId,
    pub profile_id: u8,
    /// More fragments of the same SDU follow.
    pub fragmented: bool,
    /// Bytes to send, or receive capacity.
    pub length: usize,
    /// Payload for a send; empty buffer of `length` capacity for a receive.
    pub buffer: Vec<u8>,
}

/// What the transport reports when a data request finishes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataOutcome {
    pub status: CnlStatus,
    /// Bytes actually transferred.
    pub length: usize,
    /// The request's buffer, handed back (filled, for a receive).
    pub buffer: Vec<u8>,
}

/// One-shot completion target of an in-flight data request.
pub trait CompletionSink: Send {
    /// Deliver the outcome. Consumes the sink: a request completes once.
    fn complete(self: Box<Self>, outcome: DataOutcome);
}

/// Receiver of unsolicited transport events for one opened session.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: TransportEvent);
}

/// Operations table of a CNL transport device.
pub trait CnlTransport: Send + Sync {
    /// Open the device; events flow to `sink` until `close()` returns.
    fn open(&self, sink: Arc<dyn EventSink>) -> Result<CnlHandle>;

    /// Close a handle obtained from `open()`.
    fn close(&self, handle: CnlHandle);

    /// Execute a request synchronously.
    fn request(&self, handle: CnlHandle, req: &mut TransportRequest) -> Result<()>;

    /// Queue a data request; completion arrives through `done`.
    fn submit(&self, handle: CnlHandle, req: DataRequest, done: Box<dyn CompletionSink>) -> Result<()>;

    /// Ask the transport to abandon an in-flight data request.
    fn cancel(&self, handle: CnlHandle, request_id: RequestId) -> Result<()>;
}
