use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::config::AudioConfig;
use crate::models::error::{status_of, CaptureError};
use crate::models::state::SessionState;
use crate::models::status::StatusCode;
use crate::traits::encoder::{ContainerEncoder, EncoderFault, EncoderSettings};
use crate::traits::output::OutputTarget;
use crate::traits::recorder::AudioRecorder;

/// Recorder delegating capture and MPEG-4/AAC encoding to an external
/// encoder.
///
/// Same lifecycle and status contract as
/// [`RawCaptureSession`](super::raw::RawCaptureSession). The encoder has to be
/// configured again after every stop, so each recording gets a fresh file
/// from the output target.
///
/// An asynchronous encoder fault resets the encoder and drops the session
/// back to `Uninitialized`; faults are picked up at the start of the next
/// operation or by [`poll_fault`](Self::poll_fault).
pub struct ContainerEncodedSession<E: ContainerEncoder> {
    encoder: E,
    output: Arc<dyn OutputTarget>,
    state: SessionState,
    config: Option<AudioConfig>,
    /// Path the encoder is configured to write to next, if any.
    configured_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
    last_fault: Option<EncoderFault>,
}

impl<E: ContainerEncoder> ContainerEncodedSession<E> {
    pub fn new(encoder: E, output: Arc<dyn OutputTarget>) -> Self {
        Self {
            encoder,
            output,
            state: SessionState::Uninitialized,
            config: None,
            configured_path: None,
            output_path: None,
            last_fault: None,
        }
    }

    pub fn config(&self) -> Option<AudioConfig> {
        self.config
    }

    /// File of the current recording, or of the last one once stopped.
    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    pub fn last_fault(&self) -> Option<&EncoderFault> {
        self.last_fault.as_ref()
    }

    /// Collect a pending encoder fault, resetting the encoder if there is one.
    pub fn poll_fault(&mut self) -> Option<EncoderFault> {
        let fault = self.encoder.take_fault()?;
        log::error!("encoder fault: {}; resetting encoder", fault);
        if let Err(e) = self.encoder.reset() {
            log::error!("failed to reset encoder: {}", e);
        }
        self.discard_configured_path();
        self.config = None;
        if !self.state.is_released() {
            self.state = SessionState::Uninitialized;
        }
        self.last_fault = Some(fault.clone());
        Some(fault)
    }

    fn configure(&mut self, config: AudioConfig) -> Result<(), CaptureError> {
        let path = self.output.container_path()?;
        self.encoder
            .configure(EncoderSettings::mpeg4_aac(config, path.clone()))?;
        self.configured_path = Some(path);
        Ok(())
    }

    fn discard_configured_path(&mut self) {
        if let Some(path) = self.configured_path.take() {
            self.output.discard_container_path(&path);
        }
    }

    fn reset_quietly(&mut self) {
        self.discard_configured_path();
        if let Err(e) = self.encoder.reset() {
            log::error!("failed to reset encoder: {}", e);
        }
    }

    fn try_init(&mut self, sample_rate_hz: u32, channel_count: u16) -> Result<(), CaptureError> {
        self.poll_fault();
        if !self.state.can_initialize() {
            return Err(CaptureError::InvalidState {
                state: self.state,
                operation: "initialize",
            });
        }
        let config = AudioConfig::new(sample_rate_hz, channel_count)?;
        if self.configured_path.is_some() {
            self.reset_quietly();
        }
        self.configure(config).map_err(|e| {
            CaptureError::DeviceRejected(format!("encoder rejected configuration: {}", e))
        })?;

        self.config = Some(config);
        self.state = SessionState::Initialized;
        log::info!(
            "encoder initialized: {} Hz, {} channel(s)",
            sample_rate_hz,
            channel_count
        );
        Ok(())
    }

    fn try_start(&mut self) -> Result<(), CaptureError> {
        self.poll_fault();
        match self.state {
            SessionState::Initialized => {}
            SessionState::Recording => return Err(CaptureError::AlreadyRecording),
            SessionState::Uninitialized | SessionState::Released => {
                return Err(CaptureError::NoInput)
            }
        }
        let Some(config) = self.config else {
            return Err(CaptureError::NoInput);
        };

        if self.configured_path.is_none() {
            self.configure(config)?;
        }
        if let Err(e) = self.encoder.prepare().and_then(|()| self.encoder.start()) {
            self.reset_quietly();
            return Err(e);
        }

        self.output_path = self.configured_path.take();
        self.state = SessionState::Recording;
        match &self.output_path {
            Some(path) => log::info!("encoder recording started: {}", path.display()),
            None => log::info!("encoder recording started"),
        }
        Ok(())
    }

    fn try_stop(&mut self) -> Result<(), CaptureError> {
        self.poll_fault();
        if !self.state.is_recording() {
            return Err(CaptureError::NothingToStop);
        }
        self.state = SessionState::Initialized;

        match self.encoder.stop() {
            Ok(()) => {
                log::info!("encoder recording stopped");
                Ok(())
            }
            Err(e) => {
                self.reset_quietly();
                Err(CaptureError::StopFailed(e.to_string()))
            }
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
            SessionState::Released => return Ok(()),
            SessionState::Uninitialized | SessionState::Initialized => {}
        }
        self.state = SessionState::Released;
        self.discard_configured_path();
        self.config = None;

        let reset = self.encoder.reset();
        let released = self.encoder.release();
        reset
            .and(released)
            .map_err(|e| CaptureError::ReleaseFailed(e.to_string()))?;
        log::info!("encoder released");
        Ok(())
    }
}

impl<E: ContainerEncoder> AudioRecorder for ContainerEncodedSession<E> {
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

impl<E: ContainerEncoder> Drop for ContainerEncodedSession<E> {
    fn drop(&mut self) {
        if self.state.is_recording() {
            self.stop_recording();
        }
        self.release();
    }
}
