//! Poll wake-up for endpoint notifiers
//!
//! `PollWaker` is the notifier the character-device poll path registers on
//! open. `notify()` marks it readable; a poller blocks in `wait()` and then
//! calls `drain()` before re-checking `has_event`.
//!
//! Platform-specific implementations:
//! - Linux: eventfd, so the waker can also sit in an external poll set
//! - elsewhere: mutex + condvar

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod eventfd;
        pub use eventfd::EventFdWaker as PollWaker;
    } else {
        mod fallback;
        pub use fallback::CondvarWaker as PollWaker;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cnlfit_core::notifier::Notifier;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn wait_times_out_when_idle() {
        let waker = PollWaker::new().unwrap();
        let start = Instant::now();
        assert!(!waker.wait(Some(Duration::from_millis(30))));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn notifications_coalesce_until_drained() {
        let waker = PollWaker::new().unwrap();
        waker.notify().unwrap();
        waker.notify().unwrap();
        assert!(waker.wait(Some(Duration::ZERO)));
        assert_eq!(waker.drain(), 2);
        assert_eq!(waker.drain(), 0);
        assert!(!waker.wait(Some(Duration::ZERO)));
    }

    #[test]
    fn wakes_blocked_waiter() {
        let waker = Arc::new(PollWaker::new().unwrap());
        let w2 = Arc::clone(&waker);
        let h = thread::spawn(move || w2.wait(Some(Duration::from_secs(10))));
        thread::sleep(Duration::from_millis(30));
        waker.notify().unwrap();
        assert!(h.join().unwrap());
    }
}
