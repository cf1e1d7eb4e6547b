//! Command vocabulary and endpoint permission table.
//!
//! Every command belongs to exactly one scope. A command may be dispatched on
//! an endpoint only when its scope admits that endpoint type; lookup is a
//! match, so it costs nothing to query per dispatch.

use core::fmt;

/// Which of the two access paths of a session a client holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointType {
    /// Primary path: connect/accept/data
    Controller,
    /// Secondary path layered on an active controller
    Adapter,
}

impl fmt::Display for EndpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointType::Controller => write!(f, "controller"),
            EndpointType::Adapter => write!(f, "adapter"),
        }
    }
}

/// Which endpoint types may issue a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    ControllerOnly,
    AdapterOnly,
    Common,
}

impl CommandScope {
    #[inline]
    pub const fn admits(&self, endpoint: EndpointType) -> bool {
        match self {
            CommandScope::ControllerOnly => matches!(endpoint, EndpointType::Controller),
            CommandScope::AdapterOnly => matches!(endpoint, EndpointType::Adapter),
            CommandScope::Common => true,
        }
    }
}

/// The fixed command vocabulary of the fitting layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Init,
    Close,
    Connect,
    WaitConnect,
    Accept,
    Confirm,
    Release,
    EnablePort,
    DisablePort,
    GetStats,
    PowerSave,
    SuspendConfirm,
    GetAdapterId,
    GetEvent,
    /// Obsolete; accepted and ignored.
    SyncReceive,
    StopEvent,
    SendData,
    ReceiveData,
    Cancel,
}

impl Command {
    pub const ALL: [Command; 19] = [
        Command::Init,
        Command::Close,
        Command::Connect,
        Command::WaitConnect,
        Command::Accept,
        Command::Confirm,
        Command::Release,
        Command::EnablePort,
        Command::DisablePort,
        Command::GetStats,
        Command::PowerSave,
        Command::SuspendConfirm,
        Command::GetAdapterId,
        Command::GetEvent,
        Command::SyncReceive,
        Command::StopEvent,
        Command::SendData,
        Command::ReceiveData,
        Command::Cancel,
    ];

    /// Permission table lookup.
    pub const fn scope(&self) -> CommandScope {
        match self {
            Command::Init
            | Command::Close
            | Command::Connect
            | Command::WaitConnect
            | Command::Accept
            | Command::Confirm
            | Command::Release
            | Command::EnablePort
            | Command::DisablePort
            | Command::GetStats
            | Command::PowerSave => CommandScope::ControllerOnly,

            Command::SuspendConfirm | Command::GetAdapterId => CommandScope::AdapterOnly,

            Command::GetEvent
            | Command::SyncReceive
            | Command::StopEvent
            | Command::SendData
            | Command::ReceiveData
            | Command::Cancel => CommandScope::Common,
        }
    }

    #[inline]
    pub const fn permitted_on(&self, endpoint: EndpointType) -> bool {
        self.scope().admits(endpoint)
    }

    /// Commands executed as one blocking transport request.
    pub const fn is_transport_request(&self) -> bool {
        matches!(
            self,
            Command::Init
                | Command::Close
                | Command::Connect
                | Command::WaitConnect
                | Command::Accept
                | Command::Confirm
                | Command::Release
                | Command::PowerSave
                | Command::GetStats
        )
    }
}
