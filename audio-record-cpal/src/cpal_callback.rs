//! cpal-backed callback input: the stream callback writes PCM straight
//! into the session's [`CallbackSink`], with no capture worker in between.

use std::sync::Arc;

use audio_record_core::models::config::{AudioConfig, InputSource};
use audio_record_core::models::error::CaptureError;
use audio_record_core::traits::audio_input::InputParams;
use audio_record_core::traits::callback_input::{
    CallbackInputProvider, CallbackSink, CallbackStream,
};

use crate::device;
use crate::stream_owner::StreamOwner;

/// Opens [`CpalCallbackStream`]s on the default host.
#[derive(Debug, Clone, Default)]
pub struct CpalCallbackProvider {
    device_name: Option<String>,
}

impl CpalCallbackProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
        }
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }
}

impl CallbackInputProvider for CpalCallbackProvider {
    fn min_buffer_size(&self, config: &AudioConfig) -> Option<usize> {
        device::device_min_buffer_bytes(self.device_name.as_deref(), config)
    }

    fn open_stream(
        &self,
        params: &InputParams,
        sink: Arc<CallbackSink>,
    ) -> Result<Box<dyn CallbackStream>, CaptureError> {
        if params.source == InputSource::VoiceCommunication {
            log::debug!("cpal has no voice-communication source; using the plain input");
        }

        let mut bytes = Vec::with_capacity(params.buffer_size_bytes);
        let owner = StreamOwner::spawn(
            self.device_name.clone(),
            params.config,
            params.buffer_size_bytes,
            Box::new(move |samples: &[i16]| {
                samples_to_le_bytes(samples, &mut bytes);
                sink.write_buffer(&bytes);
            }),
        )?;
        log::info!(
            "cpal callback stream opened: {} Hz, {} channel(s)",
            params.config.sample_rate_hz,
            params.config.channel_count
        );
        Ok(Box::new(CpalCallbackStream { owner }))
    }
}

/// One opened cpal stream feeding a [`CallbackSink`].
pub struct CpalCallbackStream {
    owner: StreamOwner,
}

impl CallbackStream for CpalCallbackStream {
    fn start(&mut self) -> Result<(), CaptureError> {
        self.owner.play()
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.owner.pause()
    }

    fn release(&mut self) -> Result<(), CaptureError> {
        self.owner.close()
    }
}

/// Serialize samples as little-endian 16-bit PCM into `out`, replacing its
/// contents.
pub fn samples_to_le_bytes(samples: &[i16], out: &mut Vec<u8>) {
    out.clear();
    out.reserve(samples.len() * 2);
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
}
