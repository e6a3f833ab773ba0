use std::path::Path;
use std::sync::Arc;

use crate::models::config::{BackendKind, RecorderConfiguration};
use crate::models::error::CaptureError;
use crate::models::state::SessionState;
use crate::models::status::StatusCode;
use crate::traits::audio_input::AudioInputProvider;
use crate::traits::callback_input::CallbackInputProvider;
use crate::traits::encoder::ContainerEncoder;
use crate::traits::output::OutputTarget;
use crate::traits::recorder::AudioRecorder;

use super::callback::CallbackCaptureSession;
use super::container::ContainerEncodedSession;
use super::raw::RawCaptureSession;

/// Platform pieces a [`Recorder`] is assembled from. Only the ones the
/// selected backend needs are kept.
pub struct RecorderParts<E: ContainerEncoder> {
    pub input: Arc<dyn AudioInputProvider>,
    pub callback_input: Arc<dyn CallbackInputProvider>,
    pub encoder: E,
    pub output: Arc<dyn OutputTarget>,
}

/// A recorder whose backend is chosen at run time.
pub enum Recorder<E: ContainerEncoder> {
    Raw(RawCaptureSession),
    Callback(CallbackCaptureSession),
    Container(ContainerEncodedSession<E>),
}

impl<E: ContainerEncoder> Recorder<E> {
    /// Build the backend named by `config.backend`.
    pub fn from_configuration(
        config: &RecorderConfiguration,
        parts: RecorderParts<E>,
    ) -> Result<Self, CaptureError> {
        config.validate()?;
        log::info!("using {:?} backend", config.backend);
        Ok(match config.backend {
            BackendKind::RawPcm => Self::Raw(RawCaptureSession::from_configuration(
                config,
                parts.input,
                parts.output,
            )?),
            BackendKind::Callback => Self::Callback(CallbackCaptureSession::from_configuration(
                config,
                parts.callback_input,
                parts.output,
            )?),
            BackendKind::ContainerEncoded => {
                Self::Container(ContainerEncodedSession::new(parts.encoder, parts.output))
            }
        })
    }

    pub fn backend(&self) -> BackendKind {
        match self {
            Self::Raw(_) => BackendKind::RawPcm,
            Self::Callback(_) => BackendKind::Callback,
            Self::Container(_) => BackendKind::ContainerEncoded,
        }
    }

    pub fn output_path(&self) -> Option<&Path> {
        match self {
            Self::Raw(session) => session.output_path(),
            Self::Callback(session) => session.output_path(),
            Self::Container(session) => session.output_path(),
        }
    }

    fn inner(&mut self) -> &mut dyn AudioRecorder {
        match self {
            Self::Raw(session) => session,
            Self::Callback(session) => session,
            Self::Container(session) => session,
        }
    }
}

impl<E: ContainerEncoder> AudioRecorder for Recorder<E> {
    fn init_recording(&mut self, sample_rate_hz: u32, channel_count: u16) -> StatusCode {
        self.inner().init_recording(sample_rate_hz, channel_count)
    }

    fn start_recording(&mut self) -> StatusCode {
        self.inner().start_recording()
    }

    fn stop_recording(&mut self) -> StatusCode {
        self.inner().stop_recording()
    }

    fn release(&mut self) -> StatusCode {
        self.inner().release()
    }

    fn state(&self) -> SessionState {
        match self {
            Self::Raw(session) => session.state(),
            Self::Callback(session) => session.state(),
            Self::Container(session) => session.state(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{
        EncoderCall, MemoryTarget, RecordingEncoder, ScriptedInputProvider, ScriptedStreamProvider,
    };

    struct Built {
        recorder: Recorder<RecordingEncoder>,
        encoder: RecordingEncoder,
        streams: Arc<ScriptedStreamProvider>,
        inputs: Arc<ScriptedInputProvider>,
    }

    fn build(backend: BackendKind) -> Built {
        let config = RecorderConfiguration {
            backend,
            ..RecorderConfiguration::default()
        };
        let encoder = RecordingEncoder::new();
        let streams = Arc::new(ScriptedStreamProvider::new());
        let inputs = Arc::new(ScriptedInputProvider::new());
        let recorder = Recorder::from_configuration(
            &config,
            RecorderParts {
                input: inputs.clone(),
                callback_input: streams.clone(),
                encoder: encoder.clone(),
                output: Arc::new(MemoryTarget::new()),
            },
        )
        .unwrap();
        Built {
            recorder,
            encoder,
            streams,
            inputs,
        }
    }

    #[test]
    fn raw_backend_never_touches_encoder() {
        let Built {
            mut recorder,
            encoder,
            streams,
            ..
        } = build(BackendKind::RawPcm);
        assert_eq!(recorder.backend(), BackendKind::RawPcm);
        assert_eq!(recorder.init_recording(16000, 1), StatusCode::NoError);
        assert_eq!(recorder.start_recording(), StatusCode::NoError);
        assert_eq!(recorder.stop_recording(), StatusCode::NoError);
        assert_eq!(recorder.release(), StatusCode::NoError);
        assert!(encoder.calls().is_empty());
        assert_eq!(streams.open_count(), 0);
    }

    #[test]
    fn container_backend_drives_encoder() {
        let Built {
            mut recorder,
            encoder,
            ..
        } = build(BackendKind::ContainerEncoded);
        assert_eq!(recorder.backend(), BackendKind::ContainerEncoded);
        assert_eq!(recorder.init_recording(16000, 1), StatusCode::NoError);
        assert_eq!(recorder.start_recording(), StatusCode::NoError);
        assert_eq!(recorder.state(), SessionState::Recording);
        assert!(recorder.output_path().is_some());
        assert_eq!(recorder.stop_recording(), StatusCode::NoError);
        assert!(encoder.calls().contains(&EncoderCall::Stop));
    }

    #[test]
    fn callback_backend_opens_a_stream() {
        let Built {
            mut recorder,
            encoder,
            streams,
            inputs,
        } = build(BackendKind::Callback);
        assert_eq!(recorder.backend(), BackendKind::Callback);
        assert_eq!(recorder.init_recording(16000, 1), StatusCode::NoError);
        assert_eq!(recorder.start_recording(), StatusCode::NoError);
        assert!(streams.last_stream().unwrap().is_started());
        assert_eq!(recorder.stop_recording(), StatusCode::NoError);
        assert_eq!(recorder.release(), StatusCode::NoError);
        assert_eq!(inputs.open_count(), 0);
        assert!(encoder.calls().is_empty());
    }

    #[test]
    fn raw_and_container_backends_share_the_status_contract() {
        for backend in [BackendKind::RawPcm, BackendKind::ContainerEncoded] {
            let Built { mut recorder, .. } = build(backend);
            assert_eq!(recorder.start_recording(), StatusCode::StateError, "{:?}", backend);
            assert_eq!(recorder.stop_recording(), StatusCode::StartError, "{:?}", backend);
            assert_eq!(recorder.init_recording(0, 1), StatusCode::InitError, "{:?}", backend);
            assert_eq!(recorder.release(), StatusCode::NoError, "{:?}", backend);
            assert_eq!(recorder.release(), StatusCode::NoError, "{:?}", backend);
            assert_eq!(recorder.init_recording(16000, 1), StatusCode::StateError, "{:?}", backend);
        }
    }

    #[test]
    fn callback_backend_reports_stream_state_errors() {
        let Built { mut recorder, .. } = build(BackendKind::Callback);
        assert_eq!(recorder.start_recording(), StatusCode::StateError);
        assert_eq!(recorder.stop_recording(), StatusCode::StateError);
        assert_eq!(recorder.init_recording(0, 1), StatusCode::InitError);
        assert_eq!(recorder.release(), StatusCode::StateError);
        assert_eq!(recorder.init_recording(16000, 1), StatusCode::NoError);
        assert_eq!(recorder.release(), StatusCode::NoError);
        assert_eq!(recorder.release(), StatusCode::NoError);
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let config = RecorderConfiguration {
            join_timeout_ms: 0,
            ..RecorderConfiguration::default()
        };
        let result = Recorder::from_configuration(
            &config,
            RecorderParts {
                input: Arc::new(ScriptedInputProvider::new()),
                callback_input: Arc::new(ScriptedStreamProvider::new()),
                encoder: RecordingEncoder::new(),
                output: Arc::new(MemoryTarget::new()),
            },
        );
        assert!(matches!(result, Err(CaptureError::InvalidConfig(_))));
    }
}
