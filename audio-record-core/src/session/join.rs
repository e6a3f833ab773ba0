use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, Thread};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;

use super::interrupt;

/// The waiting thread was interrupted before the wait completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("wait interrupted")]
pub struct Interrupted;

/// Something that terminates and can be waited on.
pub trait Joinable {
    fn is_alive(&self) -> bool;

    /// Wait up to `timeout` for termination.
    ///
    /// Returns `Ok(())` once terminated or when the timeout elapses, and
    /// `Err(Interrupted)` (clearing the flag) if the calling thread is
    /// interrupted first.
    fn join_timeout(&self, timeout: Duration) -> Result<(), Interrupted>;
}

/// Wait for `worker` to terminate within `timeout`, retrying across
/// interruptions without extending the overall deadline.
///
/// An interruption seen along the way is re-raised on the calling thread
/// before returning. Returns whether the worker is no longer alive.
pub fn join_uninterruptibly<J: Joinable + ?Sized>(worker: &J, timeout: Duration) -> bool {
    let start = Instant::now();
    let mut remaining = timeout;
    let mut was_interrupted = false;

    while !remaining.is_zero() {
        match worker.join_timeout(remaining) {
            Ok(()) => break,
            Err(Interrupted) => {
                was_interrupted = true;
                remaining = timeout.saturating_sub(start.elapsed());
            }
        }
    }

    if was_interrupted {
        interrupt::raise();
    }
    !worker.is_alive()
}

/// How a [`WorkerThread`] ended up once its owner let go of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadOutcome {
    Completed,
    Panicked(String),
    /// Still running; the OS thread was detached.
    Detached,
}

#[derive(Default)]
struct ExitSignal {
    done: AtomicBool,
    waiters: Mutex<Vec<Thread>>,
}

impl ExitSignal {
    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn register(&self, waiter: Thread) {
        let mut waiters = self.waiters.lock();
        if !waiters.iter().any(|t| t.id() == waiter.id()) {
            waiters.push(waiter);
        }
    }

    fn finish(&self) {
        self.done.store(true, Ordering::Release);
        for waiter in self.waiters.lock().drain(..) {
            waiter.unpark();
        }
    }
}

/// Signals exit on drop, so a panicking body still counts as terminated.
struct ExitGuard(Arc<ExitSignal>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Named OS thread whose termination can be awaited with a deadline.
pub struct WorkerThread {
    exit: Arc<ExitSignal>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerThread {
    pub fn spawn<F>(name: &str, body: F) -> io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let exit = Arc::new(ExitSignal::default());
        let guard = ExitGuard(Arc::clone(&exit));

        let handle = thread::Builder::new().name(name.into()).spawn(move || {
            let _guard = guard;
            body();
        })?;

        Ok(Self {
            exit,
            handle: Some(handle),
        })
    }

    /// Reap the thread if it has terminated, otherwise detach it.
    pub fn finish(mut self) -> ThreadOutcome {
        let Some(handle) = self.handle.take() else {
            return ThreadOutcome::Completed;
        };
        if !self.exit.is_done() {
            return ThreadOutcome::Detached;
        }
        match handle.join() {
            Ok(()) => ThreadOutcome::Completed,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                ThreadOutcome::Panicked(message)
            }
        }
    }
}

impl Joinable for WorkerThread {
    fn is_alive(&self) -> bool {
        !self.exit.is_done()
    }

    fn join_timeout(&self, timeout: Duration) -> Result<(), Interrupted> {
        let deadline = Instant::now().checked_add(timeout);
        self.exit.register(thread::current());

        loop {
            if self.exit.is_done() {
                return Ok(());
            }
            if interrupt::interrupted() {
                return Err(Interrupted);
            }
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(());
                    }
                    thread::park_timeout(deadline - now);
                }
                None => thread::park(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Interrupts `target` every `period` until dropped.
    struct Interrupter {
        stop: Arc<AtomicBool>,
        handle: Option<JoinHandle<()>>,
    }

    impl Interrupter {
        fn start(target: interrupt::InterruptHandle, period: Duration) -> Self {
            let stop = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&stop);
            let handle = thread::spawn(move || {
                while !flag.load(Ordering::SeqCst) {
                    target.interrupt();
                    thread::sleep(period);
                }
            });
            Self {
                stop,
                handle: Some(handle),
            }
        }
    }

    impl Drop for Interrupter {
        fn drop(&mut self) {
            self.stop.store(true, Ordering::SeqCst);
            if let Some(handle) = self.handle.take() {
                handle.join().unwrap();
            }
        }
    }

    fn sleeper(duration: Duration) -> WorkerThread {
        WorkerThread::spawn("test-sleeper", move || thread::sleep(duration)).unwrap()
    }

    #[test]
    fn joins_short_worker_without_interruption() {
        let worker = sleeper(Duration::from_millis(20));
        assert!(join_uninterruptibly(&worker, Duration::from_millis(2000)));
        assert!(!interrupt::is_interrupted());
        assert_eq!(worker.finish(), ThreadOutcome::Completed);
    }

    #[test]
    fn interruptions_do_not_cut_the_wait_short() {
        let worker = sleeper(Duration::from_millis(150));
        let interrupter = Interrupter::start(interrupt::current(), Duration::from_millis(10));

        let start = Instant::now();
        let terminated = join_uninterruptibly(&worker, Duration::from_millis(2000));
        let elapsed = start.elapsed();
        drop(interrupter);

        assert!(terminated);
        assert!(elapsed >= Duration::from_millis(140), "returned after {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(1500), "returned after {:?}", elapsed);
        // The swallowed interruption is handed back to the caller.
        assert!(interrupt::interrupted());
    }

    #[test]
    fn stuck_worker_uses_the_whole_budget() {
        let release = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&release);
        let worker = WorkerThread::spawn("test-stuck", move || {
            while !flag.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
        })
        .unwrap();
        let interrupter = Interrupter::start(interrupt::current(), Duration::from_millis(15));

        let start = Instant::now();
        let terminated = join_uninterruptibly(&worker, Duration::from_millis(300));
        let elapsed = start.elapsed();
        drop(interrupter);

        assert!(!terminated);
        assert!(elapsed >= Duration::from_millis(300), "returned after {:?}", elapsed);
        assert!(interrupt::interrupted());

        release.store(true, Ordering::SeqCst);
        assert!(join_uninterruptibly(&worker, Duration::from_millis(2000)));
    }

    #[test]
    fn join_timeout_reports_interruption() {
        let release = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&release);
        let worker = WorkerThread::spawn("test-interrupted", move || {
            while !flag.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
        })
        .unwrap();

        interrupt::raise();
        assert_eq!(worker.join_timeout(Duration::from_secs(5)), Err(Interrupted));
        assert!(!interrupt::is_interrupted());

        release.store(true, Ordering::SeqCst);
        assert_eq!(worker.join_timeout(Duration::from_secs(5)), Ok(()));
        assert!(!worker.is_alive());
    }

    #[test]
    fn unfinished_worker_is_detached() {
        let release = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&release);
        let worker = WorkerThread::spawn("test-detached", move || {
            while !flag.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
        })
        .unwrap();

        assert!(!join_uninterruptibly(&worker, Duration::from_millis(20)));
        assert_eq!(worker.finish(), ThreadOutcome::Detached);
        release.store(true, Ordering::SeqCst);
    }

    #[test]
    fn panicking_worker_counts_as_terminated() {
        let worker = WorkerThread::spawn("test-panic", || panic!("boom")).unwrap();
        assert!(join_uninterruptibly(&worker, Duration::from_millis(2000)));
        assert_eq!(worker.finish(), ThreadOutcome::Panicked("boom".into()));
    }

    #[test]
    fn zero_timeout_returns_immediately() {
        let worker = sleeper(Duration::from_millis(200));
        let start = Instant::now();
        assert!(!join_uninterruptibly(&worker, Duration::ZERO));
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
