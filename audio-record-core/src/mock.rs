//! In-memory stand-ins for hardware inputs, output targets and encoders.
//!
//! Used by this crate's tests and by backend crates that want to exercise a
//! session without a sound card.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::config::AudioConfig;
use crate::models::error::CaptureError;
use crate::traits::audio_input::{
    AudioInput, AudioInputProvider, InputParams, InputStatus, RecordingState,
};
use crate::traits::callback_input::{CallbackInputProvider, CallbackSink, CallbackStream};
use crate::traits::encoder::{ContainerEncoder, EncoderFault, EncoderSettings};
use crate::traits::output::{OpenedOutput, OutputTarget};

/// How long an idle [`ScriptedInput`] blocks in `read` before returning 0.
const IDLE_READ_WAIT: Duration = Duration::from_millis(5);

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
}

/// One scripted answer to [`AudioInput::read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedRead {
    /// Fill the whole buffer with this byte.
    Full(u8),
    /// Return this many bytes (clamped to the buffer length).
    Short(usize),
    Fail(String),
}

struct ScriptState {
    reads: VecDeque<ScriptedRead>,
    initialized: bool,
    recording: bool,
    released: bool,
    start_error: Option<CaptureError>,
    stop_error: Option<CaptureError>,
    release_error: Option<CaptureError>,
}

/// Audio input replaying a script of reads.
///
/// When the script runs dry, `read` waits briefly for more entries and
/// then reports a zero-length read.
pub struct ScriptedInput {
    state: Mutex<ScriptState>,
    more_reads: Condvar,
    reads_served: AtomicUsize,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    release_calls: AtomicUsize,
}

impl ScriptedInput {
    pub fn new(reads: Vec<ScriptedRead>) -> Self {
        Self {
            state: Mutex::new(ScriptState {
                reads: reads.into(),
                initialized: true,
                recording: false,
                released: false,
                start_error: None,
                stop_error: None,
                release_error: None,
            }),
            more_reads: Condvar::new(),
            reads_served: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            release_calls: AtomicUsize::new(0),
        }
    }

    /// An input whose handle never finished initialising.
    pub fn uninitialized() -> Self {
        let input = Self::new(Vec::new());
        input.state.lock().initialized = false;
        input
    }

    pub fn push_reads(&self, reads: impl IntoIterator<Item = ScriptedRead>) {
        self.state.lock().reads.extend(reads);
        self.more_reads.notify_all();
    }

    pub fn fail_start(&self, error: CaptureError) {
        self.state.lock().start_error = Some(error);
    }

    pub fn fail_stop(&self, error: CaptureError) {
        self.state.lock().stop_error = Some(error);
    }

    pub fn fail_release(&self, error: CaptureError) {
        self.state.lock().release_error = Some(error);
    }

    pub fn reads_served(&self) -> usize {
        self.reads_served.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn release_calls(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }
}

impl AudioInput for ScriptedInput {
    fn status(&self) -> InputStatus {
        let state = self.state.lock();
        InputStatus {
            initialized: state.initialized && !state.released,
            recording: if state.recording {
                RecordingState::Recording
            } else {
                RecordingState::Stopped
            },
        }
    }

    fn start(&self) -> Result<(), CaptureError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if state.released {
            return Err(CaptureError::DeviceNotReady);
        }
        if let Some(err) = state.start_error.take() {
            return Err(err);
        }
        state.recording = true;
        Ok(())
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, CaptureError> {
        let mut state = self.state.lock();
        if state.released {
            return Err(CaptureError::DeviceNotReady);
        }
        if state.reads.is_empty() {
            self.more_reads.wait_for(&mut state, IDLE_READ_WAIT);
        }
        let Some(next) = state.reads.pop_front() else {
            return Ok(0);
        };
        drop(state);

        self.reads_served.fetch_add(1, Ordering::SeqCst);
        match next {
            ScriptedRead::Full(byte) => {
                buf.fill(byte);
                Ok(buf.len())
            }
            ScriptedRead::Short(len) => {
                let len = len.min(buf.len());
                buf[..len].fill(0xAA);
                Ok(len)
            }
            ScriptedRead::Fail(reason) => Err(CaptureError::ReadFailed(reason)),
        }
    }

    fn stop(&self) -> Result<(), CaptureError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        state.recording = false;
        match state.stop_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn release(&self) -> Result<(), CaptureError> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        state.recording = false;
        state.released = true;
        match state.release_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Provider handing out [`ScriptedInput`]s.
#[derive(Default)]
pub struct ScriptedInputProvider {
    min_buffer_size: Option<usize>,
    reads: Mutex<Vec<ScriptedRead>>,
    reject_open: AtomicBool,
    not_ready: AtomicBool,
    opened: Mutex<Vec<(InputParams, Arc<ScriptedInput>)>>,
}

impl ScriptedInputProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_buffer_size(mut self, bytes: usize) -> Self {
        self.min_buffer_size = Some(bytes);
        self
    }

    /// Script given to every input opened from now on.
    pub fn with_reads(self, reads: Vec<ScriptedRead>) -> Self {
        *self.reads.lock() = reads;
        self
    }

    /// Make `open` fail as if the platform rejected the configuration.
    pub fn reject_open(&self, reject: bool) {
        self.reject_open.store(reject, Ordering::SeqCst);
    }

    /// Make `open` return handles that never finished initialising.
    pub fn not_ready(&self, not_ready: bool) {
        self.not_ready.store(not_ready, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().len()
    }

    pub fn last_input(&self) -> Option<Arc<ScriptedInput>> {
        self.opened.lock().last().map(|(_, input)| Arc::clone(input))
    }

    pub fn last_params(&self) -> Option<InputParams> {
        self.opened.lock().last().map(|(params, _)| *params)
    }
}

impl AudioInputProvider for ScriptedInputProvider {
    fn min_buffer_size(&self, _config: &AudioConfig) -> Option<usize> {
        self.min_buffer_size
    }

    fn open(&self, params: &InputParams) -> Result<Arc<dyn AudioInput>, CaptureError> {
        if self.reject_open.load(Ordering::SeqCst) {
            return Err(CaptureError::DeviceRejected(format!(
                "{} Hz x {} not supported",
                params.config.sample_rate_hz, params.config.channel_count
            )));
        }
        let input = if self.not_ready.load(Ordering::SeqCst) {
            ScriptedInput::uninitialized()
        } else {
            ScriptedInput::new(self.reads.lock().clone())
        };
        let input = Arc::new(input);
        self.opened.lock().push((*params, Arc::clone(&input)));
        Ok(input)
    }
}

#[derive(Default)]
struct StreamState {
    started: bool,
    released: bool,
    start_error: Option<CaptureError>,
    stop_error: Option<CaptureError>,
    release_error: Option<CaptureError>,
}

/// Callback stream driven by the test: [`deliver`](Self::deliver) plays the
/// part of the platform's audio callback.
pub struct ScriptedStream {
    sink: Arc<CallbackSink>,
    state: Mutex<StreamState>,
    release_calls: AtomicUsize,
}

impl ScriptedStream {
    fn new(sink: Arc<CallbackSink>) -> Self {
        Self {
            sink,
            state: Mutex::new(StreamState::default()),
            release_calls: AtomicUsize::new(0),
        }
    }

    /// Hand one buffer to the sink, as the audio callback would. Ignored
    /// while the stream is not started.
    pub fn deliver(&self, data: &[u8]) {
        if self.state.lock().started {
            self.sink.write_buffer(data);
        }
    }

    pub fn fail_start(&self, error: CaptureError) {
        self.state.lock().start_error = Some(error);
    }

    /// The next stop fails and leaves the stream running.
    pub fn fail_stop(&self, error: CaptureError) {
        self.state.lock().stop_error = Some(error);
    }

    pub fn fail_release(&self, error: CaptureError) {
        self.state.lock().release_error = Some(error);
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }

    pub fn release_calls(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }
}

struct ScriptedStreamHandle(Arc<ScriptedStream>);

impl CallbackStream for ScriptedStreamHandle {
    fn start(&mut self) -> Result<(), CaptureError> {
        let mut state = self.0.state.lock();
        if state.released {
            return Err(CaptureError::DeviceNotReady);
        }
        if let Some(err) = state.start_error.take() {
            return Err(err);
        }
        state.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        let mut state = self.0.state.lock();
        if let Some(err) = state.stop_error.take() {
            return Err(err);
        }
        state.started = false;
        Ok(())
    }

    fn release(&mut self) -> Result<(), CaptureError> {
        self.0.release_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.0.state.lock();
        state.started = false;
        state.released = true;
        match state.release_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Provider handing out [`ScriptedStream`]s.
#[derive(Default)]
pub struct ScriptedStreamProvider {
    min_buffer_size: Option<usize>,
    reject_open: AtomicBool,
    opened: Mutex<Vec<(InputParams, Arc<ScriptedStream>)>>,
}

impl ScriptedStreamProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_buffer_size(mut self, bytes: usize) -> Self {
        self.min_buffer_size = Some(bytes);
        self
    }

    pub fn reject_open(&self, reject: bool) {
        self.reject_open.store(reject, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().len()
    }

    pub fn last_stream(&self) -> Option<Arc<ScriptedStream>> {
        self.opened.lock().last().map(|(_, stream)| Arc::clone(stream))
    }

    pub fn last_params(&self) -> Option<InputParams> {
        self.opened.lock().last().map(|(params, _)| *params)
    }
}

impl CallbackInputProvider for ScriptedStreamProvider {
    fn min_buffer_size(&self, _config: &AudioConfig) -> Option<usize> {
        self.min_buffer_size
    }

    fn open_stream(
        &self,
        params: &InputParams,
        sink: Arc<CallbackSink>,
    ) -> Result<Box<dyn CallbackStream>, CaptureError> {
        if self.reject_open.load(Ordering::SeqCst) {
            return Err(CaptureError::DeviceRejected(format!(
                "{} Hz x {} not supported",
                params.config.sample_rate_hz, params.config.channel_count
            )));
        }
        let stream = Arc::new(ScriptedStream::new(sink));
        self.opened.lock().push((*params, Arc::clone(&stream)));
        Ok(Box::new(ScriptedStreamHandle(stream)))
    }
}

/// Cloneable in-memory byte sink; every clone sees the same bytes.
#[derive(Clone, Default)]
pub struct MemorySink {
    data: Arc<Mutex<Vec<u8>>>,
    fail_flush: Arc<AtomicBool>,
}

impl MemorySink {
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }

    pub fn fail_flush(&self, fail: bool) {
        self.fail_flush.store(fail, Ordering::SeqCst);
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.data.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.fail_flush.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "flush failed"));
        }
        Ok(())
    }
}

/// Output target collecting each recording in its own [`MemorySink`].
#[derive(Default)]
pub struct MemoryTarget {
    sinks: Mutex<Vec<MemorySink>>,
    fail_open: AtomicBool,
    fail_flush: AtomicBool,
    container_paths: AtomicUsize,
    discarded: Mutex<Vec<PathBuf>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Sinks opened from now on fail to flush.
    pub fn fail_flush(&self, fail: bool) {
        self.fail_flush.store(fail, Ordering::SeqCst);
    }

    pub fn sinks(&self) -> Vec<MemorySink> {
        self.sinks.lock().clone()
    }

    pub fn last_sink(&self) -> Option<MemorySink> {
        self.sinks.lock().last().cloned()
    }

    /// Container paths handed back unused.
    pub fn discarded(&self) -> Vec<PathBuf> {
        self.discarded.lock().clone()
    }
}

impl OutputTarget for MemoryTarget {
    fn open_pcm(&self, _config: &AudioConfig) -> Result<OpenedOutput, CaptureError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(CaptureError::StorageError("output unavailable".into()));
        }
        let sink = MemorySink::default();
        sink.fail_flush(self.fail_flush.load(Ordering::SeqCst));
        self.sinks.lock().push(sink.clone());
        Ok(OpenedOutput {
            writer: Box::new(sink),
            path: None,
        })
    }

    fn container_path(&self) -> Result<PathBuf, CaptureError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(CaptureError::StorageError("output unavailable".into()));
        }
        let n = self.container_paths.fetch_add(1, Ordering::SeqCst);
        Ok(PathBuf::from(format!("memory/recording_{}.mp4", n)))
    }

    fn discard_container_path(&self, path: &Path) {
        self.discarded.lock().push(path.to_path_buf());
    }
}

/// Calls made on a [`RecordingEncoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncoderCall {
    Configure,
    Prepare,
    Start,
    Stop,
    Reset,
    Release,
}

#[derive(Default)]
struct EncoderLog {
    calls: Vec<EncoderCall>,
    settings: Option<EncoderSettings>,
    failures: Vec<(EncoderCall, String)>,
    fault: Option<EncoderFault>,
}

/// Encoder that records its calls. Clones share the same log, so a test can
/// keep one while a session owns another.
#[derive(Clone, Default)]
pub struct RecordingEncoder {
    log: Arc<Mutex<EncoderLog>>,
}

impl RecordingEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `call` with an encoder error.
    pub fn fail_on(&self, call: EncoderCall, reason: &str) {
        self.log.lock().failures.push((call, reason.to_string()));
    }

    /// Queue an asynchronous fault, as if the encoder process died.
    pub fn inject_fault(&self, fault: EncoderFault) {
        self.log.lock().fault = Some(fault);
    }

    pub fn calls(&self) -> Vec<EncoderCall> {
        self.log.lock().calls.clone()
    }

    pub fn settings(&self) -> Option<EncoderSettings> {
        self.log.lock().settings.clone()
    }

    fn record(&self, call: EncoderCall) -> Result<(), CaptureError> {
        let mut log = self.log.lock();
        log.calls.push(call);
        match log.failures.iter().position(|(c, _)| *c == call) {
            Some(index) => {
                let (_, reason) = log.failures.remove(index);
                Err(CaptureError::EncoderError(reason))
            }
            None => Ok(()),
        }
    }
}

impl ContainerEncoder for RecordingEncoder {
    fn configure(&mut self, settings: EncoderSettings) -> Result<(), CaptureError> {
        self.record(EncoderCall::Configure)?;
        self.log.lock().settings = Some(settings);
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), CaptureError> {
        self.record(EncoderCall::Prepare)
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        self.record(EncoderCall::Start)
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.record(EncoderCall::Stop)
    }

    fn reset(&mut self) -> Result<(), CaptureError> {
        self.log.lock().settings = None;
        self.record(EncoderCall::Reset)
    }

    fn release(&mut self) -> Result<(), CaptureError> {
        self.record(EncoderCall::Release)
    }

    fn take_fault(&mut self) -> Option<EncoderFault> {
        self.log.lock().fault.take()
    }
}
