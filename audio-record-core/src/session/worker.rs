use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thread_priority::ThreadPriority;

use crate::models::error::CaptureError;
use crate::models::state::WorkerState;
use crate::processing::transfer_buffer::TransferBuffer;
use crate::traits::audio_input::AudioInput;
use crate::traits::output::PcmWriter;

use super::join::{Interrupted, Joinable, ThreadOutcome, WorkerThread};

pub const CAPTURE_THREAD_NAME: &str = "audio_cap_thread";

/// Counters for one recording.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub bytes_written: u64,
    pub chunks_written: u64,
    /// Reads that returned fewer bytes than requested, or failed.
    pub failed_reads: u64,
}

/// State shared between the controlling thread and the capture thread.
struct WorkerShared {
    keep_alive: AtomicBool,
    state: AtomicU8,
    sink: Mutex<Option<PcmWriter>>,
    bytes_written: AtomicU64,
    chunks_written: AtomicU64,
    failed_reads: AtomicU64,
}

impl WorkerShared {
    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Move to `to` only from one of `from`; a terminated worker stays so.
    fn advance(&self, from: &[WorkerState], to: WorkerState) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                from.contains(&WorkerState::from_u8(current))
                    .then_some(to as u8)
            })
            .is_ok()
    }

    fn stats(&self) -> CaptureStats {
        CaptureStats {
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            chunks_written: self.chunks_written.load(Ordering::Relaxed),
            failed_reads: self.failed_reads.load(Ordering::Relaxed),
        }
    }
}

/// Background thread copying PCM from an input into an output stream.
///
/// ```text
/// [AudioInput] → read(capacity) → [TransferBuffer] → write → [PcmWriter]
/// ```
/// Exactly one per active recording. The output stream and the liveness
/// flag are the only state touched by both threads.
pub struct CaptureWorker {
    shared: Arc<WorkerShared>,
    thread: Option<WorkerThread>,
}

impl CaptureWorker {
    pub fn new(sink: PcmWriter) -> Self {
        Self {
            shared: Arc::new(WorkerShared {
                keep_alive: AtomicBool::new(true),
                state: AtomicU8::new(WorkerState::Created as u8),
                sink: Mutex::new(Some(sink)),
                bytes_written: AtomicU64::new(0),
                chunks_written: AtomicU64::new(0),
                failed_reads: AtomicU64::new(0),
            }),
            thread: None,
        }
    }

    /// Spawn the capture thread. The buffer is moved into it.
    pub fn start(
        &mut self,
        input: Arc<dyn AudioInput>,
        buffer: TransferBuffer,
    ) -> Result<(), CaptureError> {
        if self.thread.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }

        let shared = Arc::clone(&self.shared);
        let thread = WorkerThread::spawn(CAPTURE_THREAD_NAME, move || {
            capture_loop(&shared, input.as_ref(), buffer);
            shared.set_state(WorkerState::Terminated);
        })
        .map_err(|e| CaptureError::StartFailed(format!("failed to spawn capture thread: {}", e)))?;

        self.thread = Some(thread);
        Ok(())
    }

    /// Ask the loop to exit and drop the output stream.
    ///
    /// Must be called from the controlling thread. The loop finishes its
    /// current read before observing the request; whatever that read
    /// returns is discarded.
    pub fn stop_capture(&self) -> Result<(), CaptureError> {
        self.shared.keep_alive.store(false, Ordering::Release);
        self.shared.advance(
            &[WorkerState::Created, WorkerState::Running],
            WorkerState::Draining,
        );

        let sink = self.shared.sink.lock().take();
        match sink {
            Some(mut writer) => writer
                .flush()
                .map_err(|e| CaptureError::StopFailed(format!("failed to flush output: {}", e))),
            None => Ok(()),
        }
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn stats(&self) -> CaptureStats {
        self.shared.stats()
    }

    /// Reap or detach the capture thread.
    pub fn finish(mut self) -> ThreadOutcome {
        match self.thread.take() {
            Some(thread) => thread.finish(),
            None => ThreadOutcome::Completed,
        }
    }
}

impl Joinable for CaptureWorker {
    fn is_alive(&self) -> bool {
        self.thread.as_ref().map(|t| t.is_alive()).unwrap_or(false)
    }

    fn join_timeout(&self, timeout: Duration) -> Result<(), Interrupted> {
        match &self.thread {
            Some(thread) => thread.join_timeout(timeout),
            None => Ok(()),
        }
    }
}

fn capture_loop(shared: &WorkerShared, input: &dyn AudioInput, mut buffer: TransferBuffer) {
    if let Err(e) = thread_priority::set_current_thread_priority(ThreadPriority::Max) {
        log::debug!("could not raise capture thread priority: {:?}", e);
    }

    let status = input.status();
    if !status.is_recording() {
        log::info!("audio input is not recording ({}); capture thread exiting", status);
        return;
    }

    if !shared.advance(&[WorkerState::Created], WorkerState::Running) {
        log::debug!("stop requested before the capture loop began");
    }
    let capacity = buffer.capacity();

    while shared.keep_alive.load(Ordering::Acquire) {
        match input.read(buffer.as_mut_slice()) {
            Ok(read) if read == capacity => write_chunk(shared, buffer.as_slice()),
            Ok(read) => {
                shared.failed_reads.fetch_add(1, Ordering::Relaxed);
                log::error!("audio input read returned {} of {} bytes", read, capacity);
                log::error!("audio input status: {}", input.status());
            }
            Err(e) => {
                shared.failed_reads.fetch_add(1, Ordering::Relaxed);
                log::error!("audio input read failed: {}", e);
                log::error!("audio input status: {}", input.status());
            }
        }
    }

    if let Err(e) = input.stop() {
        log::error!("failed to stop audio input: {}", e);
    }
}

/// Append one full chunk under the sink lock. A failed write drops the
/// sink; later chunks of this recording are discarded.
fn write_chunk(shared: &WorkerShared, chunk: &[u8]) {
    let mut sink = shared.sink.lock();
    let Some(writer) = sink.as_mut() else {
        return;
    };
    match writer.write_all(chunk) {
        Ok(()) => {
            shared.bytes_written.fetch_add(chunk.len() as u64, Ordering::Relaxed);
            shared.chunks_written.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            log::error!("failed to write audio data, dropping output: {}", e);
            *sink = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{wait_until, MemorySink, ScriptedInput, ScriptedRead};
    use crate::session::join::join_uninterruptibly;
    use std::io;

    const CAPACITY: usize = 320;

    fn started_input(reads: Vec<ScriptedRead>) -> Arc<ScriptedInput> {
        let input = Arc::new(ScriptedInput::new(reads));
        input.start().unwrap();
        input
    }

    #[test]
    fn writes_only_full_reads() {
        let input = started_input(vec![
            ScriptedRead::Full(1),
            ScriptedRead::Short(100),
            ScriptedRead::Fail("overrun".into()),
            ScriptedRead::Full(2),
        ]);
        let sink = MemorySink::default();
        let mut worker = CaptureWorker::new(Box::new(sink.clone()));
        worker.start(input.clone(), TransferBuffer::new(CAPACITY)).unwrap();

        assert!(wait_until(Duration::from_secs(2), || sink.len() == 2 * CAPACITY));
        worker.stop_capture().unwrap();
        assert!(join_uninterruptibly(&worker, Duration::from_millis(2000)));

        let data = sink.contents();
        assert_eq!(data.len(), 2 * CAPACITY);
        assert!(data[..CAPACITY].iter().all(|&b| b == 1));
        assert!(data[CAPACITY..].iter().all(|&b| b == 2));

        let stats = worker.stats();
        assert_eq!(stats.chunks_written, 2);
        assert_eq!(stats.bytes_written, 2 * CAPACITY as u64);
        assert!(stats.failed_reads >= 2);
        assert_eq!(worker.state(), WorkerState::Terminated);
        assert_eq!(worker.finish(), ThreadOutcome::Completed);
    }

    #[test]
    fn stops_input_when_loop_exits() {
        let input = started_input(vec![]);
        let mut worker = CaptureWorker::new(Box::new(MemorySink::default()));
        worker.start(input.clone(), TransferBuffer::new(CAPACITY)).unwrap();

        assert!(wait_until(Duration::from_secs(2), || worker.state() == WorkerState::Running));
        worker.stop_capture().unwrap();
        assert!(join_uninterruptibly(&worker, Duration::from_millis(2000)));
        assert!(!input.status().is_recording());
        assert_eq!(input.stop_calls(), 1);
    }

    #[test]
    fn exits_immediately_when_input_not_recording() {
        let input = Arc::new(ScriptedInput::new(vec![ScriptedRead::Full(1)]));
        let sink = MemorySink::default();
        let mut worker = CaptureWorker::new(Box::new(sink.clone()));
        worker.start(input.clone(), TransferBuffer::new(CAPACITY)).unwrap();

        assert!(join_uninterruptibly(&worker, Duration::from_millis(2000)));
        assert_eq!(worker.state(), WorkerState::Terminated);
        assert_eq!(input.reads_served(), 0);
        assert!(sink.is_empty());
    }

    #[test]
    fn nothing_is_written_after_stop() {
        let input = started_input(vec![ScriptedRead::Full(9)]);
        let sink = MemorySink::default();
        let mut worker = CaptureWorker::new(Box::new(sink.clone()));
        worker.start(input.clone(), TransferBuffer::new(CAPACITY)).unwrap();

        assert!(wait_until(Duration::from_secs(2), || sink.len() == CAPACITY));
        worker.stop_capture().unwrap();
        input.push_reads(vec![ScriptedRead::Full(3); 5]);
        assert!(join_uninterruptibly(&worker, Duration::from_millis(2000)));
        assert_eq!(sink.len(), CAPACITY);
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failure_drops_sink_but_keeps_running() {
        let input = started_input(vec![ScriptedRead::Full(1), ScriptedRead::Full(2)]);
        let mut worker = CaptureWorker::new(Box::new(FailingWriter));
        worker.start(input.clone(), TransferBuffer::new(CAPACITY)).unwrap();

        assert!(wait_until(Duration::from_secs(2), || input.reads_served() == 2));
        assert_eq!(worker.state(), WorkerState::Running);
        worker.stop_capture().unwrap();
        assert!(join_uninterruptibly(&worker, Duration::from_millis(2000)));
        assert_eq!(worker.stats().chunks_written, 0);
    }

    #[test]
    fn stop_after_exit_keeps_terminated_state() {
        let input = Arc::new(ScriptedInput::new(vec![]));
        let mut worker = CaptureWorker::new(Box::new(MemorySink::default()));
        worker.start(input.clone(), TransferBuffer::new(CAPACITY)).unwrap();
        assert!(join_uninterruptibly(&worker, Duration::from_millis(2000)));
        assert_eq!(worker.state(), WorkerState::Terminated);

        worker.stop_capture().unwrap();
        assert_eq!(worker.state(), WorkerState::Terminated);
    }

    #[test]
    fn stop_before_loop_begins_is_draining() {
        let worker = CaptureWorker::new(Box::new(MemorySink::default()));
        worker.stop_capture().unwrap();
        assert_eq!(worker.state(), WorkerState::Draining);
    }

    #[test]
    fn device_stop_failure_does_not_escalate() {
        let input = started_input(vec![ScriptedRead::Full(4)]);
        input.fail_stop(CaptureError::StopFailed("driver fault".into()));
        let sink = MemorySink::default();
        let mut worker = CaptureWorker::new(Box::new(sink.clone()));
        worker.start(input.clone(), TransferBuffer::new(CAPACITY)).unwrap();

        assert!(wait_until(Duration::from_secs(2), || sink.len() == CAPACITY));
        worker.stop_capture().unwrap();
        assert!(join_uninterruptibly(&worker, Duration::from_millis(2000)));
        assert_eq!(input.stop_calls(), 1);
        assert_eq!(worker.state(), WorkerState::Terminated);
        assert_eq!(worker.finish(), ThreadOutcome::Completed);
    }

    #[test]
    fn second_start_is_rejected() {
        let input = started_input(vec![]);
        let mut worker = CaptureWorker::new(Box::new(MemorySink::default()));
        worker.start(input.clone(), TransferBuffer::new(CAPACITY)).unwrap();
        assert_eq!(
            worker.start(input.clone(), TransferBuffer::new(CAPACITY)),
            Err(CaptureError::AlreadyRecording)
        );
        worker.stop_capture().unwrap();
        assert!(join_uninterruptibly(&worker, Duration::from_millis(2000)));
    }
}
