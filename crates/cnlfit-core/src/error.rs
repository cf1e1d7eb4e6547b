//! Fitting layer error kinds.
//!
//! Every state-machine violation and resource failure is a returned value;
//! nothing panics across the public API.

use std::fmt;

/// Errors returned by registry, session and dispatch operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitError {
    /// Session, slot or queued event absent.
    NotFound,
    /// Operation not valid in the current lifecycle state.
    InvalidState,
    /// Command not valid for the endpoint type, or malformed argument.
    BadParameter,
    /// Container pool or registry slots exhausted.
    ResourceExhausted,
    /// Transport or OS primitive failure, with its raw code.
    SystemError(i32),
}

impl FitError {
    /// Negative errno-style code handed back to user space by the ioctl layer.
    pub fn code(&self) -> i32 {
        match self {
            Self::NotFound => -2,           // ENOENT
            Self::InvalidState => -77,      // EBADFD
            Self::BadParameter => -22,      // EINVAL
            Self::ResourceExhausted => -12, // ENOMEM
            Self::SystemError(e) if *e < 0 => *e,
            Self::SystemError(e) if *e > 0 => -*e,
            Self::SystemError(_) => -5, // EIO
        }
    }
}

impl fmt::Display for FitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::InvalidState => write!(f, "invalid state"),
            Self::BadParameter => write!(f, "bad parameter"),
            Self::ResourceExhausted => write!(f, "resource exhausted"),
            Self::SystemError(e) => write!(f, "system error: {}", e),
        }
    }
}

impl std::error::Error for FitError {}

pub type Result<T> = std::result::Result<T, FitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_kind() {
        assert_eq!(FitError::InvalidState.to_string(), "invalid state");
        assert_eq!(FitError::SystemError(5).to_string(), "system error: 5");
    }

    #[test]
    fn codes_are_negative() {
        assert_eq!(FitError::NotFound.code(), -2);
        assert_eq!(FitError::BadParameter.code(), -22);
        assert_eq!(FitError::SystemError(110).code(), -110);
        assert_eq!(FitError::SystemError(-71).code(), -71);
        assert_eq!(FitError::SystemError(0).code(), -5);
    }
}
