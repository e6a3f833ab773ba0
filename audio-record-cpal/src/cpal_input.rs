//! cpal-backed blocking hardware input.
//!
//! The stream callback fills a [`PcmQueue`]; the capture worker drains it
//! one transfer buffer at a time through [`AudioInput::read`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use audio_record_core::models::config::{AudioConfig, InputSource};
use audio_record_core::models::error::CaptureError;
use audio_record_core::traits::audio_input::{
    AudioInput, AudioInputProvider, InputParams, InputStatus, RecordingState,
};

use crate::device;
use crate::pcm_queue::PcmQueue;
use crate::stream_owner::StreamOwner;

/// Queue depth in hardware buffers.
const QUEUE_BUFFERS: usize = 8;

/// Upper bound on queued audio, in seconds.
const MAX_QUEUE_SECONDS: usize = 10;

/// Queue size for `params`: several hardware buffers, at least one second
/// and at most [`MAX_QUEUE_SECONDS`] of audio.
pub fn queue_bytes(params: &InputParams) -> usize {
    let second = params.config.sample_rate_hz as usize * params.config.bytes_per_frame();
    params
        .buffer_size_bytes
        .saturating_mul(QUEUE_BUFFERS)
        .clamp(second, second.saturating_mul(MAX_QUEUE_SECONDS))
}

/// Opens [`CpalInput`]s on the default host.
#[derive(Debug, Clone, Default)]
pub struct CpalInputProvider {
    device_name: Option<String>,
}

impl CpalInputProvider {
    /// Provider for the default input device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider for the input device named `name`.
    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
        }
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }
}

impl AudioInputProvider for CpalInputProvider {
    fn min_buffer_size(&self, config: &AudioConfig) -> Option<usize> {
        device::device_min_buffer_bytes(self.device_name.as_deref(), config)
    }

    fn open(&self, params: &InputParams) -> Result<Arc<dyn AudioInput>, CaptureError> {
        let input = CpalInput::open(self.device_name.clone(), params)?;
        Ok(Arc::new(input))
    }
}

/// One opened cpal input stream delivering 16-bit PCM.
pub struct CpalInput {
    stream: StreamOwner,
    queue: Arc<PcmQueue>,
    recording: AtomicBool,
    released: AtomicBool,
}

impl CpalInput {
    pub fn open(device_name: Option<String>, params: &InputParams) -> Result<Self, CaptureError> {
        if params.source == InputSource::VoiceCommunication {
            log::debug!("cpal has no voice-communication source; using the plain input");
        }

        let config = params.config;
        let queue = Arc::new(PcmQueue::new(queue_bytes(params), config.bytes_per_frame()));
        let callback_queue = Arc::clone(&queue);
        let stream = StreamOwner::spawn(
            device_name,
            config,
            params.buffer_size_bytes,
            Box::new(move |samples: &[i16]| callback_queue.push_samples(samples)),
        )?;

        log::info!(
            "cpal input opened: {} Hz, {} channel(s), queue {} bytes",
            config.sample_rate_hz,
            config.channel_count,
            queue.capacity()
        );
        Ok(Self {
            stream,
            queue,
            recording: AtomicBool::new(false),
            released: AtomicBool::new(false),
        })
    }

    /// Bytes discarded because the reader fell behind.
    pub fn dropped_bytes(&self) -> u64 {
        self.queue.dropped_bytes()
    }
}

impl AudioInput for CpalInput {
    fn status(&self) -> InputStatus {
        InputStatus {
            initialized: !self.released.load(Ordering::Acquire),
            recording: if self.recording.load(Ordering::Acquire) {
                RecordingState::Recording
            } else {
                RecordingState::Stopped
            },
        }
    }

    fn start(&self) -> Result<(), CaptureError> {
        self.queue.open();
        if let Err(e) = self.stream.play() {
            self.queue.close();
            return Err(e);
        }
        self.recording.store(true, Ordering::Release);
        Ok(())
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, CaptureError> {
        if self.released.load(Ordering::Acquire) {
            return Err(CaptureError::DeviceNotReady);
        }
        Ok(self.queue.read(buf))
    }

    fn stop(&self) -> Result<(), CaptureError> {
        self.recording.store(false, Ordering::Release);
        self.queue.close();
        self.stream.pause()
    }

    fn release(&self) -> Result<(), CaptureError> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.recording.store(false, Ordering::Release);
        self.queue.close();
        self.stream.close()?;
        log::info!("cpal input released");
        Ok(())
    }
}

impl Drop for CpalInput {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::error!("failed to release cpal input: {}", e);
        }
    }
}
