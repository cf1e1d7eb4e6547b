//! Per-command argument records.
//!
//! A `FitRequest` is both the input and the output of a dispatch: fields
//! documented as "out" are overwritten before `dispatch()` returns.

use crate::command::Command;
use crate::event::FitEvent;
use crate::id::{RequestId, Uid};
use crate::transport::{CnlStatus, LinkStats, PowerSave, ProtocolParams};

/// Arguments of send-data / receive-data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataArgs {
    pub request_id: RequestId,
    pub profile_id: u8,
    pub fragmented: bool,
    /// Bytes to send, or receive capacity.
    pub length: usize,
    /// Moved into the transport by the dispatch; comes back in the completion event.
    pub buffer: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FitRequest {
    Init { status: CnlStatus },
    Close { status: CnlStatus },
    Connect { params: ProtocolParams, status: CnlStatus },
    /// `params` is in/out: the transport reports the initiator's parameters.
    WaitConnect { params: ProtocolParams, status: CnlStatus },
    /// `peer` is out: the remembered UID the accept was sent to.
    Accept { params: ProtocolParams, peer: Uid, status: CnlStatus },
    /// `peer` is out: the remembered UID the confirm was sent to.
    Confirm { params: ProtocolParams, peer: Uid, status: CnlStatus },
    Release { status: CnlStatus },
    EnablePort,
    DisablePort,
    GetStats { stats: LinkStats, status: CnlStatus },
    PowerSave { settings: PowerSave, status: CnlStatus },
    SuspendConfirm,
    GetAdapterId { adapter_id: u32 },
    GetEvent { event: Option<FitEvent> },
    SyncReceive,
    StopEvent,
    SendData(DataArgs),
    ReceiveData(DataArgs),
    /// `status` is out: whether the transport accepted the cancel.
    Cancel { request_id: RequestId, status: CnlStatus },
}

impl FitRequest {
    pub fn command(&self) -> Command {
        match self {
            FitRequest::Init { .. } => Command::Init,
            FitRequest::Close { .. } => Command::Close,
            FitRequest::Connect { .. } => Command::Connect,
            FitRequest::WaitConnect { .. } => Command::WaitConnect,
            FitRequest::Accept { .. } => Command::Accept,
            FitRequest::Confirm { .. } => Command::Confirm,
            FitRequest::Release { .. } => Command::Release,
            FitRequest::EnablePort => Command::EnablePort,
            FitRequest::DisablePort => Command::DisablePort,
            FitRequest::GetStats { .. } => Command::GetStats,
            FitRequest::PowerSave { .. } => Command::PowerSave,
            FitRequest::SuspendConfirm => Command::SuspendConfirm,
            FitRequest::GetAdapterId { .. } => Command::GetAdapterId,
            FitRequest::GetEvent { .. } => Command::GetEvent,
            FitRequest::SyncReceive => Command::SyncReceive,
            FitRequest::StopEvent => Command::StopEvent,
            FitRequest::SendData(_) => Command::SendData,
            FitRequest::ReceiveData(_) => Command::ReceiveData,
            FitRequest::Cancel { .. } => Command::Cancel,
        }
    }

    /// CNL status written by the last dispatch, for commands that carry one.
    pub fn status(&self) -> Option<CnlStatus> {
        match self {
            FitRequest::Init { status }
            | FitRequest::Close { status }
            | FitRequest::Connect { status, .. }
            | FitRequest::WaitConnect { status, .. }
            | FitRequest::Accept { status, .. }
            | FitRequest::Confirm { status, .. }
            | FitRequest::Release { status }
            | FitRequest::GetStats { status, .. }
            | FitRequest::PowerSave { status, .. }
            | FitRequest::Cancel { status, .. } => Some(*status),
            _ => None,
        }
    }

    // ── Constructors ──

    pub fn init() -> Self {
        FitRequest::Init { status: CnlStatus::SUCCESS }
    }

    pub fn close() -> Self {
        FitRequest::Close { status: CnlStatus::SUCCESS }
    }

    pub fn connect(params: ProtocolParams) -> Self {
        FitRequest::Connect { params, status: CnlStatus::SUCCESS }
    }

    pub fn wait_connect() -> Self {
        FitRequest::WaitConnect { params: ProtocolParams::default(), status: CnlStatus::SUCCESS }
    }

    pub fn accept(params: ProtocolParams) -> Self {
        FitRequest::Accept { params, peer: Uid::default(), status: CnlStatus::SUCCESS }
    }

    pub fn confirm(params: ProtocolParams) -> Self {
        FitRequest::Confirm { params, peer: Uid::default(), status: CnlStatus::SUCCESS }
    }

    pub fn release() -> Self {
        FitRequest::Release { status: CnlStatus::SUCCESS }
    }

    pub fn get_stats() -> Self {
        FitRequest::GetStats { stats: LinkStats::default(), status: CnlStatus::SUCCESS }
    }

    pub fn power_save(settings: PowerSave) -> Self {
        FitRequest::PowerSave { settings, status: CnlStatus::SUCCESS }
    }

    pub fn get_event() -> Self {
        FitRequest::GetEvent { event: None }
    }

    pub fn send(request_id: RequestId, profile_id: u8, data: Vec<u8>) -> Self {
        FitRequest::SendData(DataArgs {
            request_id,
            profile_id,
            fragmented: false,
            length: data.len(),
            buffer: data,
        })
    }

    pub fn receive(request_id: RequestId, profile_id: u8, capacity: usize) -> Self {
        FitRequest::ReceiveData(DataArgs {
            request_id,
            profile_id,
            fragmented: false,
            length: capacity,
            buffer: Vec::with_capacity(capacity),
        })
    }

    pub fn cancel(request_id: RequestId) -> Self {
        FitRequest::Cancel { request_id, status: CnlStatus::SUCCESS }
    }

    /// Take the event out of a completed get-event.
    pub fn take_event(&mut self) -> Option<FitEvent> {
        match self {
            FitRequest::GetEvent { event } => event.take(),
            _ => None,
        }
    }
}
