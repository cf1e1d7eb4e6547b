//! Event types.
//!
//! `TransportEvent` is what the transport raises; `FitEvent` is what a client
//! reads back with get-event. The translation between the two lives in
//! `cnlfit::translate`.

use crate::id::{RequestId, Uid, UID_LEN};
use crate::transport::{CnlStatus, Direction, ProtocolParams, PROTOCOL_PARAMS_LEN};

/// Which side initiated a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CauseOrigin {
    Local,
    Remote,
}

/// Reason attached to a release indication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseCause {
    pub origin: CauseOrigin,
    pub code: u8,
}

/// Unsolicited event raised by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Error { status: CnlStatus },
    ConnectInd { uid: Uid, params: ProtocolParams },
    AcceptInd { uid: Uid, params: ProtocolParams },
    AcceptCfm { uid: Uid, params: ProtocolParams },
    ReleaseInd { cause: ReleaseCause, params: ProtocolParams },
    PowerSaveInd { dormant_period: u32, awake_period: u32 },
    /// Any event type the fitting layer does not know.
    Other { kind: u32 },
}

/// Events synthesized by the adapter port state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PortEvent {
    /// Port disable requested while the adapter is active (adapter queue).
    SuspendRequested = 1,
    /// Port is now disabled (controller queue).
    Suspended = 2,
}

/// Event as delivered to a client by get-event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FitEvent {
    DataComplete {
        direction: Direction,
        request_id: RequestId,
        status: CnlStatus,
        length: usize,
        /// Filled buffer of a receive; the original buffer of a send.
        buffer: Vec<u8>,
    },
    ErrorInd { status: CnlStatus },
    ConnectInd { uid: Uid, params: ProtocolParams },
    AcceptInd { uid: Uid, params: ProtocolParams },
    AcceptCfm { uid: Uid },
    ReleaseInd { cause: ReleaseCause, params: ProtocolParams },
    PowerSaveInd { dormant_period: u32, awake_period: u32 },
    Unknown,
    Port(PortEvent),
}

impl FitEvent {
    /// Bytes of event payload the ioctl layer copies out after the type word.
    pub fn payload_len(&self) -> usize {
        match self {
            FitEvent::DataComplete { .. } => 8 + 4 + 4, // request id, status, length
            FitEvent::ErrorInd { .. } => 4,
            FitEvent::ConnectInd { .. } | FitEvent::AcceptInd { .. } => UID_LEN + PROTOCOL_PARAMS_LEN,
            FitEvent::AcceptCfm { .. } => UID_LEN,
            FitEvent::ReleaseInd { .. } => 2 + PROTOCOL_PARAMS_LEN,
            FitEvent::PowerSaveInd { .. } => 8,
            FitEvent::Unknown => 0,
            FitEvent::Port(_) => 4,
        }
    }
}
