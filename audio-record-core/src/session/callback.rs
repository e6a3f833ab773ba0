use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::config::{AudioConfig, InputSource, RecorderConfiguration};
use crate::models::error::{status_of, CaptureError};
use crate::models::state::SessionState;
use crate::models::status::StatusCode;
use crate::processing::buffer_sizing::BufferSizing;
use crate::traits::audio_input::InputParams;
use crate::traits::callback_input::{
    CallbackInputProvider, CallbackSink, CallbackStats, CallbackStream,
};
use crate::traits::output::OutputTarget;
use crate::traits::recorder::AudioRecorder;

struct OpenedStream {
    stream: Box<dyn CallbackStream>,
    config: AudioConfig,
    sizing: BufferSizing,
}

/// Recorder whose platform stream writes each hardware buffer to the
/// output from its own audio callback. No capture thread of ours is
/// involved.
///
/// State errors follow the stream's rules rather than the raw session's:
///
/// | call | when | status |
/// |---|---|---|
/// | `start_recording` | no stream open | `StateError` |
/// | `stop_recording` | not recording | `StateError` |
/// | `release` | never initialized | `StateError` |
///
/// Releasing while recording stops the stream first.
pub struct CallbackCaptureSession {
    provider: Arc<dyn CallbackInputProvider>,
    output: Arc<dyn OutputTarget>,
    input_source: InputSource,
    sink: Arc<CallbackSink>,
    state: SessionState,
    stream: Option<OpenedStream>,
    output_path: Option<PathBuf>,
    last_stats: Option<CallbackStats>,
}

impl CallbackCaptureSession {
    pub fn new(provider: Arc<dyn CallbackInputProvider>, output: Arc<dyn OutputTarget>) -> Self {
        Self {
            provider,
            output,
            input_source: InputSource::VoiceCommunication,
            sink: Arc::new(CallbackSink::new()),
            state: SessionState::Uninitialized,
            stream: None,
            output_path: None,
            last_stats: None,
        }
    }

    pub fn with_input_source(mut self, source: InputSource) -> Self {
        self.input_source = source;
        self
    }

    pub fn from_configuration(
        config: &RecorderConfiguration,
        provider: Arc<dyn CallbackInputProvider>,
        output: Arc<dyn OutputTarget>,
    ) -> Result<Self, CaptureError> {
        config.validate()?;
        Ok(Self::new(provider, output).with_input_source(config.input_source))
    }

    pub fn config(&self) -> Option<AudioConfig> {
        self.stream.as_ref().map(|s| s.config)
    }

    pub fn sizing(&self) -> Option<BufferSizing> {
        self.stream.as_ref().map(|s| s.sizing)
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    /// Counters of the running recording.
    pub fn current_stats(&self) -> Option<CallbackStats> {
        self.state.is_recording().then(|| self.sink.stats())
    }

    pub fn last_stats(&self) -> Option<CallbackStats> {
        self.last_stats
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

        if let Some(mut previous) = self.stream.take() {
            log::info!("re-initializing; closing previous stream");
            if let Err(e) = previous.stream.release() {
                log::warn!("failed to close previous stream: {}", e);
            }
            self.state = SessionState::Uninitialized;
        }

        let params = InputParams {
            config,
            source: self.input_source,
            buffer_size_bytes: sizing.hardware_buffer_size,
        };
        let stream = self
            .provider
            .open_stream(&params, Arc::clone(&self.sink))
            .map_err(|e| match e {
                CaptureError::DeviceRejected(_) | CaptureError::InvalidConfig(_) => e,
                other => CaptureError::DeviceRejected(other.to_string()),
            })?;

        self.stream = Some(OpenedStream {
            stream,
            config,
            sizing,
        });
        self.state = SessionState::Initialized;
        log::info!(
            "callback stream initialized: {} Hz, {} channel(s)",
            sample_rate_hz,
            channel_count
        );
        Ok(())
    }

    fn try_start(&mut self) -> Result<(), CaptureError> {
        if self.state.is_recording() {
            return Err(CaptureError::AlreadyRecording);
        }
        let Some(opened) = self.stream.as_mut() else {
            return Err(CaptureError::NoInput);
        };

        let output = self.output.open_pcm(&opened.config)?;
        self.sink.attach(output.writer);
        if let Err(e) = opened.stream.start() {
            if let Err(flush) = self.sink.detach() {
                log::warn!("discarding output of failed start: {}", flush);
            }
            return Err(match e {
                CaptureError::StartFailed(_) => e,
                other => CaptureError::StartFailed(other.to_string()),
            });
        }

        self.output_path = output.path;
        self.state = SessionState::Recording;
        match &self.output_path {
            Some(path) => log::info!("callback recording started: {}", path.display()),
            None => log::info!("callback recording started"),
        }
        Ok(())
    }

    /// Stop callbacks, then detach the output. Both run even if the first
    /// fails.
    fn halt(&mut self) -> Result<(), CaptureError> {
        let stopped = match self.stream.as_mut() {
            Some(opened) => opened.stream.stop(),
            None => Ok(()),
        };
        let detached = self.sink.detach();
        let stats = self.sink.stats();
        self.last_stats = Some(stats);
        self.state = SessionState::Initialized;
        log::info!(
            "callback recording stopped: {} bytes in {} buffers, {} discarded",
            stats.bytes_written,
            stats.buffers_written,
            stats.discarded_buffers
        );

        stopped.map_err(|e| match e {
            CaptureError::StopFailed(_) => e,
            other => CaptureError::StopFailed(other.to_string()),
        })?;
        detached
    }

    fn try_stop(&mut self) -> Result<(), CaptureError> {
        if !self.state.is_recording() {
            return Err(CaptureError::InvalidState {
                state: self.state,
                operation: "stop",
            });
        }
        self.halt()
    }

    fn try_release(&mut self) -> Result<(), CaptureError> {
        match self.state {
            SessionState::Released => {
                log::debug!("callback stream already released");
                return Ok(());
            }
            SessionState::Uninitialized => {
                return Err(CaptureError::InvalidState {
                    state: self.state,
                    operation: "release",
                })
            }
            SessionState::Recording => {
                if let Err(e) = self.halt() {
                    log::error!("failed to stop recording before release: {}", e);
                }
            }
            SessionState::Initialized => {}
        }

        self.state = SessionState::Released;
        let Some(mut opened) = self.stream.take() else {
            return Ok(());
        };
        opened.stream.release().map_err(|e| match e {
            CaptureError::ReleaseFailed(_) => e,
            other => CaptureError::ReleaseFailed(other.to_string()),
        })?;
        log::info!("callback stream released");
        Ok(())
    }
}

impl AudioRecorder for CallbackCaptureSession {
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

impl Drop for CallbackCaptureSession {
    fn drop(&mut self) {
        if self.stream.is_some() {
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MemoryTarget, ScriptedStreamProvider};

    fn session() -> (
        CallbackCaptureSession,
        Arc<ScriptedStreamProvider>,
        Arc<MemoryTarget>,
    ) {
        let provider = Arc::new(ScriptedStreamProvider::new());
        let target = Arc::new(MemoryTarget::new());
        let session = CallbackCaptureSession::new(provider.clone(), target.clone());
        (session, provider, target)
    }

    #[test]
    fn callback_buffers_reach_the_output() {
        let (mut session, provider, target) = session();
        assert_eq!(session.init_recording(48000, 2), StatusCode::NoError);
        assert_eq!(session.start_recording(), StatusCode::NoError);
        assert_eq!(session.state(), SessionState::Recording);

        let stream = provider.last_stream().unwrap();
        stream.deliver(&[1; 1920]);
        stream.deliver(&[2; 960]);
        assert_eq!(session.current_stats().unwrap().buffers_written, 2);

        assert_eq!(session.stop_recording(), StatusCode::NoError);
        stream.deliver(&[3; 1920]);

        let data = target.last_sink().unwrap().contents();
        assert_eq!(data.len(), 2880);
        assert!(data[1920..].iter().all(|&b| b == 2));
        assert_eq!(session.last_stats().unwrap().bytes_written, 2880);
        assert_eq!(session.release(), StatusCode::NoError);
        assert!(stream.is_released());
    }

    #[test]
    fn stream_is_opened_with_hardware_buffer_size() {
        let provider = Arc::new(ScriptedStreamProvider::new().with_min_buffer_size(4096));
        let mut session = CallbackCaptureSession::new(provider.clone(), Arc::new(MemoryTarget::new()));
        assert_eq!(session.init_recording(48000, 2), StatusCode::NoError);
        assert_eq!(provider.last_params().unwrap().buffer_size_bytes, 8192);
        assert_eq!(session.sizing().unwrap().transfer_capacity, 1920);
    }

    #[test]
    fn start_before_init_is_state_error() {
        let (mut session, _provider, target) = session();
        assert_eq!(session.start_recording(), StatusCode::StateError);
        assert!(target.sinks().is_empty());
    }

    #[test]
    fn stop_without_recording_is_state_error() {
        let (mut session, _provider, _target) = session();
        assert_eq!(session.stop_recording(), StatusCode::StateError);
        session.init_recording(16000, 1);
        assert_eq!(session.stop_recording(), StatusCode::StateError);
        assert_eq!(session.state(), SessionState::Initialized);
    }

    #[test]
    fn release_never_initialized_is_state_error() {
        let (mut session, _provider, _target) = session();
        assert_eq!(session.release(), StatusCode::StateError);
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert_eq!(session.init_recording(16000, 1), StatusCode::NoError);
    }

    #[test]
    fn release_is_terminal_and_repeatable() {
        let (mut session, provider, _target) = session();
        session.init_recording(16000, 1);
        assert_eq!(session.release(), StatusCode::NoError);
        assert_eq!(session.release(), StatusCode::NoError);
        assert_eq!(provider.last_stream().unwrap().release_calls(), 1);
        assert_eq!(session.init_recording(16000, 1), StatusCode::StateError);
        assert_eq!(session.start_recording(), StatusCode::StateError);
    }

    #[test]
    fn release_while_recording_stops_first() {
        let (mut session, provider, target) = session();
        session.init_recording(16000, 1);
        session.start_recording();
        let stream = provider.last_stream().unwrap();
        stream.deliver(&[7; 320]);

        assert_eq!(session.release(), StatusCode::NoError);
        assert_eq!(session.state(), SessionState::Released);
        assert!(!stream.is_started());
        assert!(stream.is_released());
        assert_eq!(target.last_sink().unwrap().len(), 320);
    }

    #[test]
    fn double_start_is_init_error() {
        let (mut session, _provider, target) = session();
        session.init_recording(16000, 1);
        session.start_recording();
        assert_eq!(session.start_recording(), StatusCode::InitError);
        assert_eq!(target.sinks().len(), 1);
        assert_eq!(session.stop_recording(), StatusCode::NoError);
    }

    #[test]
    fn rejected_stream_is_init_error() {
        let (mut session, provider, _target) = session();
        provider.reject_open(true);
        assert_eq!(session.init_recording(48000, 2), StatusCode::InitError);
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert_eq!(session.init_recording(0, 2), StatusCode::InitError);
    }

    #[test]
    fn reinit_closes_previous_stream() {
        let (mut session, provider, _target) = session();
        session.init_recording(48000, 2);
        let first = provider.last_stream().unwrap();
        assert_eq!(session.init_recording(16000, 1), StatusCode::NoError);
        assert!(first.is_released());
        assert_eq!(provider.open_count(), 2);
        assert_eq!(session.config().unwrap().sample_rate_hz, 16000);
    }

    #[test]
    fn stream_start_failure_detaches_output() {
        let (mut session, provider, _target) = session();
        session.init_recording(16000, 1);
        let stream = provider.last_stream().unwrap();
        stream.fail_start(CaptureError::StartFailed("device busy".into()));

        assert_eq!(session.start_recording(), StatusCode::StartError);
        assert_eq!(session.state(), SessionState::Initialized);
        stream.deliver(&[1; 32]);
        assert_eq!(session.start_recording(), StatusCode::NoError);
        session.stop_recording();
    }

    #[test]
    fn output_failure_leaves_stream_idle() {
        let (mut session, provider, target) = session();
        session.init_recording(16000, 1);
        target.fail_open(true);
        assert_eq!(session.start_recording(), StatusCode::StartError);
        assert!(!provider.last_stream().unwrap().is_started());
    }

    #[test]
    fn stream_stop_failure_is_stop_error() {
        let (mut session, provider, target) = session();
        session.init_recording(16000, 1);
        session.start_recording();
        let stream = provider.last_stream().unwrap();
        stream.fail_stop(CaptureError::StopFailed("driver fault".into()));

        assert_eq!(session.stop_recording(), StatusCode::StopError);
        assert_eq!(session.state(), SessionState::Initialized);
        stream.deliver(&[9; 64]);
        assert!(target.last_sink().unwrap().is_empty());
    }

    #[test]
    fn stream_release_failure_is_release_error() {
        let (mut session, provider, _target) = session();
        session.init_recording(16000, 1);
        provider
            .last_stream()
            .unwrap()
            .fail_release(CaptureError::ReleaseFailed("busy".into()));
        assert_eq!(session.release(), StatusCode::ReleaseError);
        assert_eq!(session.state(), SessionState::Released);
    }

    #[test]
    fn drop_releases_stream() {
        let provider = Arc::new(ScriptedStreamProvider::new());
        {
            let mut session =
                CallbackCaptureSession::new(provider.clone(), Arc::new(MemoryTarget::new()));
            session.init_recording(16000, 1);
            session.start_recording();
        }
        let stream = provider.last_stream().unwrap();
        assert!(!stream.is_started());
        assert!(stream.is_released());
    }
}
