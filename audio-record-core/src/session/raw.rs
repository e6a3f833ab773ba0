use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::models::config::{
    AudioConfig, InputSource, RecorderConfiguration, DEFAULT_JOIN_TIMEOUT_MS,
};
use crate::models::error::{status_of, CaptureError};
use crate::models::state::SessionState;
use crate::models::status::StatusCode;
use crate::processing::buffer_sizing::BufferSizing;
use crate::processing::transfer_buffer::TransferBuffer;
use crate::traits::audio_input::{AudioInput, AudioInputProvider, InputParams};
use crate::traits::output::OutputTarget;
use crate::traits::recorder::AudioRecorder;

use super::join::{join_uninterruptibly, Joinable, ThreadOutcome};
use super::worker::{CaptureStats, CaptureWorker};

/// An opened hardware input together with the sizes it was opened with.
struct OpenedInput {
    handle: Arc<dyn AudioInput>,
    config: AudioConfig,
    sizing: BufferSizing,
}

/// Raw PCM recorder: one hardware input, at most one capture worker.
///
/// Usage:
/// ```ignore
/// let mut session = RawCaptureSession::new(provider, target);
/// session.init_recording(48000, 2);
/// session.start_recording();
/// // ... audio flows into the target's stream ...
/// session.stop_recording();
/// session.release();
/// ```
pub struct RawCaptureSession {
    provider: Arc<dyn AudioInputProvider>,
    output: Arc<dyn OutputTarget>,
    input_source: InputSource,
    join_timeout: Duration,
    state: SessionState,
    input: Option<OpenedInput>,
    worker: Option<CaptureWorker>,
    /// Worker that missed its join deadline and may still hold the input.
    stalled: Option<CaptureWorker>,
    output_path: Option<PathBuf>,
    last_stats: Option<CaptureStats>,
    stalled_workers: u64,
}

impl RawCaptureSession {
    pub fn new(provider: Arc<dyn AudioInputProvider>, output: Arc<dyn OutputTarget>) -> Self {
        Self {
            provider,
            output,
            input_source: InputSource::VoiceCommunication,
            join_timeout: Duration::from_millis(DEFAULT_JOIN_TIMEOUT_MS),
            state: SessionState::Uninitialized,
            input: None,
            worker: None,
            stalled: None,
            output_path: None,
            last_stats: None,
            stalled_workers: 0,
        }
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn with_input_source(mut self, source: InputSource) -> Self {
        self.input_source = source;
        self
    }

    /// Session using the join timeout and input source of `config`.
    pub fn from_configuration(
        config: &RecorderConfiguration,
        provider: Arc<dyn AudioInputProvider>,
        output: Arc<dyn OutputTarget>,
    ) -> Result<Self, CaptureError> {
        config.validate()?;
        Ok(Self::new(provider, output)
            .with_join_timeout(config.join_timeout())
            .with_input_source(config.input_source))
    }

    pub fn config(&self) -> Option<AudioConfig> {
        self.input.as_ref().map(|i| i.config)
    }

    pub fn sizing(&self) -> Option<BufferSizing> {
        self.input.as_ref().map(|i| i.sizing)
    }

    pub fn join_timeout(&self) -> Duration {
        self.join_timeout
    }

    /// File of the current recording, or of the last one once stopped.
    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    /// Counters of the running recording.
    pub fn current_stats(&self) -> Option<CaptureStats> {
        self.worker.as_ref().map(|w| w.stats())
    }

    /// Counters of the last finished recording.
    pub fn last_stats(&self) -> Option<CaptureStats> {
        self.last_stats
    }

    /// Workers that missed their join deadline and were detached.
    pub fn stalled_workers(&self) -> u64 {
        self.stalled_workers
    }

    /// Whether a detached worker is still running.
    pub fn has_stalled_worker(&self) -> bool {
        self.stalled.as_ref().is_some_and(|w| w.is_alive())
    }

    /// Reap a detached worker that has since exited.
    ///
    /// Fails while it is still alive: it shares the input with any new
    /// worker and stops that input when its blocked read returns.
    fn reap_stalled(&mut self) -> Result<(), CaptureError> {
        let Some(worker) = self.stalled.take() else {
            return Ok(());
        };
        if worker.is_alive() {
            self.stalled = Some(worker);
            return Err(CaptureError::WorkerStalled);
        }
        match worker.finish() {
            ThreadOutcome::Panicked(message) => {
                log::error!("detached capture thread panicked: {}", message)
            }
            ThreadOutcome::Completed | ThreadOutcome::Detached => {
                log::info!("detached capture thread has exited")
            }
        }
        Ok(())
    }

    fn try_init(&mut self, sample_rate_hz: u32, channel_count: u16) -> Result<(), CaptureError> {
        if !self.state.can_initialize() {
            return Err(CaptureError::InvalidState {
                state: self.state,
                operation: "initialize",
            });
        }
        let config = AudioConfig::new(sample_rate_hz, channel_count)?;
        let sizing = BufferSizing::compute(&config, self.provider.min_buffer_size(&config));

        if let Some(previous) = self.input.take() {
            log::info!("re-initializing; releasing previous audio input");
            if let Err(e) = previous.handle.release() {
                log::warn!("failed to release previous audio input: {}", e);
            }
            self.state = SessionState::Uninitialized;
        }

        let params = InputParams {
            config,
            source: self.input_source,
            buffer_size_bytes: sizing.hardware_buffer_size,
        };
        let handle = self.provider.open(&params)?;
        if !handle.status().initialized {
            if let Err(e) = handle.release() {
                log::warn!("failed to release uninitialized audio input: {}", e);
            }
            return Err(CaptureError::DeviceNotReady);
        }

        self.input = Some(OpenedInput {
            handle,
            config,
            sizing,
        });
        self.state = SessionState::Initialized;
        log::info!(
            "recorder initialized: {} Hz, {} channel(s)",
            sample_rate_hz,
            channel_count
        );
        Ok(())
    }

    fn try_start(&mut self) -> Result<(), CaptureError> {
        if self.input.is_none() {
            return Err(CaptureError::NoInput);
        }
        if self.worker.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }
        self.reap_stalled()?;
        let Some(opened) = self.input.as_ref() else {
            return Err(CaptureError::NoInput);
        };
        let input = Arc::clone(&opened.handle);
        let config = opened.config;
        let capacity = opened.sizing.transfer_capacity;

        input.start().map_err(start_failure)?;

        let output = match self.output.open_pcm(&config) {
            Ok(output) => output,
            Err(e) => {
                stop_quietly(input.as_ref());
                return Err(start_failure(e));
            }
        };

        let mut worker = CaptureWorker::new(output.writer);
        if let Err(e) = worker.start(Arc::clone(&input), TransferBuffer::new(capacity)) {
            stop_quietly(input.as_ref());
            return Err(start_failure(e));
        }

        self.worker = Some(worker);
        self.output_path = output.path;
        self.state = SessionState::Recording;
        match &self.output_path {
            Some(path) => log::info!("recording started: {}", path.display()),
            None => log::info!("recording started"),
        }
        Ok(())
    }

    fn try_stop(&mut self) -> Result<(), CaptureError> {
        if self.input.is_none() {
            return Err(CaptureError::NothingToStop);
        }
        let Some(worker) = self.worker.take() else {
            return Err(CaptureError::NothingToStop);
        };

        let flushed = worker.stop_capture();
        let terminated = join_uninterruptibly(&worker, self.join_timeout);

        let stats = worker.stats();
        self.last_stats = Some(stats);
        let outcome = if terminated {
            worker.finish()
        } else {
            self.stalled_workers += 1;
            log::error!(
                "capture thread did not stop within {} ms; detaching it",
                self.join_timeout.as_millis()
            );
            self.stalled = Some(worker);
            ThreadOutcome::Detached
        };
        self.state = SessionState::Initialized;
        log::info!(
            "recording stopped: {} bytes in {} chunks, {} failed reads",
            stats.bytes_written,
            stats.chunks_written,
            stats.failed_reads
        );

        flushed?;
        match outcome {
            ThreadOutcome::Panicked(message) => Err(CaptureError::StopFailed(format!(
                "capture thread panicked: {}",
                message
            ))),
            ThreadOutcome::Completed | ThreadOutcome::Detached => Ok(()),
        }
    }

    fn try_release(&mut self) -> Result<(), CaptureError> {
        match self.state {
            SessionState::Recording => {
                return Err(CaptureError::InvalidState {
                    state: self.state,
                    operation: "release",
                })
            }
            SessionState::Released => {
                log::debug!("recorder already released");
                return Ok(());
            }
            SessionState::Uninitialized | SessionState::Initialized => {}
        }

        self.state = SessionState::Released;
        let Some(opened) = self.input.take() else {
            return Ok(());
        };
        opened.handle.release().map_err(|e| match e {
            CaptureError::ReleaseFailed(_) => e,
            other => CaptureError::ReleaseFailed(other.to_string()),
        })?;
        log::info!("recorder released");
        Ok(())
    }
}

fn start_failure(e: CaptureError) -> CaptureError {
    match e {
        CaptureError::StartFailed(_) | CaptureError::StorageError(_) => e,
        other => CaptureError::StartFailed(other.to_string()),
    }
}

fn stop_quietly(input: &dyn AudioInput) {
    if let Err(e) = input.stop() {
        log::error!("failed to stop audio input: {}", e);
    }
}

impl AudioRecorder for RawCaptureSession {
    fn init_recording(&mut self, sample_rate_hz: u32, channel_count: u16) -> StatusCode {
        let result = self.try_init(sample_rate_hz, channel_count);
        if let Err(e) = &result {
            log::error!("init_recording failed: {}", e);
        }
        status_of(&result)
    }

    fn start_recording(&mut self) -> StatusCode {
        let result = self.try_start();
        if let Err(e) = &result {
            log::error!("start_recording failed: {}", e);
        }
        status_of(&result)
    }

    fn stop_recording(&mut self) -> StatusCode {
        let result = self.try_stop();
        if let Err(e) = &result {
            log::error!("stop_recording failed: {}", e);
        }
        status_of(&result)
    }

    fn release(&mut self) -> StatusCode {
        let result = self.try_release();
        if let Err(e) = &result {
            log::error!("release failed: {}", e);
        }
        status_of(&result)
    }

    fn state(&self) -> SessionState {
        self.state
    }
}

impl Drop for RawCaptureSession {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop_recording();
        }
        self.release();
    }
}
