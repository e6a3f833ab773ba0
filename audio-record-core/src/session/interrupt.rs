//! Per-thread interrupt flags.
//!
//! A thread blocked in [`Joinable::join_timeout`](super::join::Joinable::join_timeout)
//! can be woken early by another thread holding its [`InterruptHandle`]. The
//! waiter observes the flag, clears it and gives up its wait. Code that
//! swallows an interruption is expected to [`raise`] it again so callers
//! further up still see it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, Thread};

thread_local! {
    static FLAG: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
}

/// Handle used by other threads to interrupt one particular thread.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    thread: Thread,
    flag: Arc<AtomicBool>,
}

impl InterruptHandle {
    /// Set the target's interrupt flag and wake it if it is parked.
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.thread.unpark();
    }
}

/// Handle for the calling thread.
pub fn current() -> InterruptHandle {
    FLAG.with(|flag| InterruptHandle {
        thread: thread::current(),
        flag: Arc::clone(flag),
    })
}

/// Test and clear the calling thread's interrupt flag.
pub fn interrupted() -> bool {
    FLAG.with(|flag| flag.swap(false, Ordering::SeqCst))
}

/// Read the calling thread's interrupt flag without clearing it.
pub fn is_interrupted() -> bool {
    FLAG.with(|flag| flag.load(Ordering::SeqCst))
}

/// Set the calling thread's interrupt flag.
pub fn raise() {
    FLAG.with(|flag| flag.store(true, Ordering::SeqCst));
}
