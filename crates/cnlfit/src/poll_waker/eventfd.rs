//! eventfd-backed waker (Linux)
//!
//! The eventfd counter accumulates notifications; `drain()` reads and
//! resets it. Created `EFD_NONBLOCK | EFD_CLOEXEC`.

use cnlfit_core::error::{FitError, Result};
use cnlfit_core::notifier::Notifier;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::eventfd::{EfdFlags, EventFd};
use std::os::fd::{AsFd, BorrowedFd};
use std::time::{Duration, Instant};

fn os_err(e: Errno) -> FitError {
    FitError::SystemError(e as i32)
}

pub struct EventFdWaker {
    fd: EventFd,
}

impl EventFdWaker {
    pub fn new() -> Result<Self> {
        let fd = EventFd::from_value_and_flags(0, EfdFlags::EFD_NONBLOCK | EfdFlags::EFD_CLOEXEC)
            .map_err(os_err)?;
        Ok(Self { fd })
    }

    /// Block until readable or `timeout` passes (`None` waits forever).
    /// Returns `true` when readable. Does not consume the notification.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let slice = match deadline {
                None => PollTimeout::NONE,
                Some(d) => {
                    let left = d.saturating_duration_since(Instant::now());
                    PollTimeout::from(left.as_millis().min(u16::MAX as u128) as u16)
                }
            };
            let mut fds = [PollFd::new(self.fd.as_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, slice) {
                Ok(n) if n > 0 => return true,
                Ok(_) | Err(Errno::EINTR) => {}
                Err(_) => return false,
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return false;
            }
        }
    }

    /// Consume pending notifications; returns how many had accumulated.
    pub fn drain(&self) -> u64 {
        self.fd.read().unwrap_or(0)
    }
}

impl AsFd for EventFdWaker {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl Notifier for EventFdWaker {
    fn notify(&self) -> Result<()> {
        match self.fd.write(1) {
            Ok(_) => Ok(()),
            // Counter saturated: a wake-up is already pending.
            Err(Errno::EAGAIN) => Ok(()),
            Err(e) => Err(os_err(e)),
        }
    }
}
