//! Controller and adapter lifecycle states.
//!
//! Both are stored as `AtomicU8` inside the session so readers never need the
//! registry mutex; writers always hold it.

use core::fmt;

/// Lifecycle of a controller session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControllerState {
    /// Registered by the transport, not opened by a client
    Ready = 0,

    /// Opened; the transport handle is live
    Active = 1,

    /// Unregistered by the transport while active; freed on close
    Gone = 2,
}

impl ControllerState {
    /// Whether the session still has to be closed by its client
    #[inline]
    pub const fn is_open(&self) -> bool {
        matches!(self, ControllerState::Active | ControllerState::Gone)
    }
}

impl From<u8> for ControllerState {
    fn from(v: u8) -> Self {
        match v {
            1 => ControllerState::Active,
            2 => ControllerState::Gone,
            _ => ControllerState::Ready,
        }
    }
}

impl From<ControllerState> for u8 {
    fn from(state: ControllerState) -> u8 {
        state as u8
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerState::Ready => write!(f, "READY"),
            ControllerState::Active => write!(f, "ACTIVE"),
            ControllerState::Gone => write!(f, "GONE"),
        }
    }
}

/// Lifecycle of the adapter port layered on a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AdapterState {
    /// Port disabled (initial)
    Disabled = 0,

    /// Port enabled, adapter endpoint not opened
    Ready = 1,

    /// Adapter endpoint opened
    Active = 2,

    /// Disable requested while active; waiting for suspend-confirm
    Suspending = 3,

    /// Controller is closing and waits for the adapter endpoint to close
    ForceClose = 4,
}

impl AdapterState {
    /// Whether a controller close has to wait for the adapter endpoint
    #[inline]
    pub const fn blocks_controller_close(&self) -> bool {
        matches!(self, AdapterState::Active | AdapterState::Suspending)
    }
}

impl From<u8> for AdapterState {
    fn from(v: u8) -> Self {
        match v {
            1 => AdapterState::Ready,
            2 => AdapterState::Active,
            3 => AdapterState::Suspending,
            4 => AdapterState::ForceClose,
            _ => AdapterState::Disabled,
        }
    }
}

impl From<AdapterState> for u8 {
    fn from(state: AdapterState) -> u8 {
        state as u8
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterState::Disabled => write!(f, "DISABLED"),
            AdapterState::Ready => write!(f, "READY"),
            AdapterState::Active => write!(f, "ACTIVE"),
            AdapterState::Suspending => write!(f, "SUSPENDING"),
            AdapterState::ForceClose => write!(f, "FORCE_CLOSE"),
        }
    }
}
