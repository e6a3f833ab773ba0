use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Longest a reader blocks waiting for a full buffer.
pub const READ_TIMEOUT: Duration = Duration::from_millis(500);

struct QueueState {
    data: VecDeque<u8>,
    open: bool,
    dropped_bytes: u64,
}

/// Bounded byte queue turning cpal callbacks into blocking fixed-size reads.
///
/// The stream callback pushes interleaved little-endian i16 samples; the
/// capture worker reads exactly one transfer buffer at a time. On overflow
/// the oldest whole frames are discarded.
pub struct PcmQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
    capacity: usize,
    frame_bytes: usize,
}

impl PcmQueue {
    /// `capacity` is rounded down to whole frames (at least one).
    pub fn new(capacity: usize, frame_bytes: usize) -> Self {
        let frame_bytes = frame_bytes.max(1);
        let capacity = (capacity / frame_bytes).max(1) * frame_bytes;
        Self {
            state: Mutex::new(QueueState {
                data: VecDeque::with_capacity(capacity),
                open: false,
                dropped_bytes: 0,
            }),
            ready: Condvar::new(),
            capacity,
            frame_bytes,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Start accepting samples, discarding anything left from before.
    pub fn open(&self) {
        let mut state = self.state.lock();
        state.data.clear();
        state.open = true;
    }

    /// Stop accepting samples and wake blocked readers.
    pub fn close(&self) {
        self.state.lock().open = false;
        self.ready.notify_all();
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    pub fn len(&self) -> usize {
        self.state.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().data.is_empty()
    }

    pub fn dropped_bytes(&self) -> u64 {
        self.state.lock().dropped_bytes
    }

    pub fn push_samples(&self, samples: &[i16]) {
        let mut state = self.state.lock();
        if !state.open {
            return;
        }
        for sample in samples {
            state.data.extend(sample.to_le_bytes());
        }
        self.trim(&mut state);
        drop(state);
        self.ready.notify_one();
    }

    fn trim(&self, state: &mut QueueState) {
        let excess = state.data.len().saturating_sub(self.capacity);
        if excess == 0 {
            return;
        }
        let drop_bytes = excess.div_ceil(self.frame_bytes) * self.frame_bytes;
        let drop_bytes = drop_bytes.min(state.data.len());
        state.data.drain(..drop_bytes);
        state.dropped_bytes += drop_bytes as u64;
    }

    /// Fill `buf` completely, waiting up to [`READ_TIMEOUT`].
    ///
    /// Returns `buf.len()` on success and 0 when the queue is closed or the
    /// wait timed out; partial data stays queued.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        self.read_timeout(buf, READ_TIMEOUT)
    }

    pub fn read_timeout(&self, buf: &mut [u8], timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.open && state.data.len() < buf.len() {
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        if !state.open || state.data.len() < buf.len() {
            return 0;
        }
        for (dst, src) in buf.iter_mut().zip(state.data.drain(..buf.len())) {
            *dst = src;
        }
        buf.len()
    }
}
