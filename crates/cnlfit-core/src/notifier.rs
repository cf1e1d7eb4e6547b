//! Endpoint wake-up abstraction.
//!
//! A `Notifier` is registered by the client when it opens an endpoint and is
//! invoked whenever an event lands in that endpoint's queue, and once when
//! the queue is stopped.
//!
//! # Implementors
//!
//! - `PollWaker` (cnlfit): eventfd on Linux, condvar elsewhere. The
//!   character-device poll path waits on it.
//! - Any `Fn() + Send + Sync` closure.

use crate::error::Result;

/// Wakes whoever waits on an endpoint.
///
/// **Contract:**
/// - `notify()` must NEVER block.
/// - It is never called with a queue lock or the registry mutex held, so it
///   may dispatch further commands itself.
/// - Several calls before the waiter wakes may coalesce into one wake-up.
pub trait Notifier: Send + Sync {
    fn notify(&self) -> Result<()>;
}

impl<F> Notifier for F
where
    F: Fn() + Send + Sync,
{
    fn notify(&self) -> Result<()> {
        self();
        Ok(())
    }
}
