//! Identifiers shared between the fitting layer, its clients and the transport.

use core::fmt;

/// Index of a controller session in the session registry.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SessionId(u32);

impl SessionId {
    #[inline]
    pub const fn new(slot: u32) -> Self {
        SessionId(slot)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Get as usize for slot indexing
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-chosen identifier of an asynchronous data request.
///
/// Must be unique among the outstanding requests of one endpoint; the
/// completion event carries it back unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct RequestId(pub u64);

/// Opaque handle the transport registers a device under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct DeviceHandle(pub u64);

/// Handle returned by the transport's `open`, valid until its `close`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct CnlHandle(pub u64);

/// Length of a CNL unique identifier in bytes.
pub const UID_LEN: usize = 8;

/// Unique identifier of a CNL peer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Uid(pub [u8; UID_LEN]);

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({})", self)
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}
