//! Buffer sizing for the raw capture path.
//!
//! One transfer buffer holds exactly one callback interval of audio. The
//! hardware buffer is sized from the device's reported minimum, never smaller
//! than one transfer buffer.

use crate::models::config::AudioConfig;

/// Audio delivered per transfer buffer, in milliseconds.
pub const CALLBACK_INTERVAL_MS: u32 = 10;

/// Transfer buffers per second of audio.
pub const BUFFERS_PER_SECOND: u32 = 1000 / CALLBACK_INTERVAL_MS;

/// Multiplier applied to the device minimum when sizing the hardware buffer.
pub const BUFFER_SIZE_FACTOR: usize = 2;

/// Bytes in one callback interval: `bytes_per_frame * (rate / 100)`.
pub fn transfer_buffer_capacity(config: &AudioConfig) -> usize {
    let frames_per_buffer = (config.sample_rate_hz / BUFFERS_PER_SECOND) as usize;
    config.bytes_per_frame() * frames_per_buffer
}

/// Sizes computed once at initialisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSizing {
    /// Bytes read per worker iteration.
    pub transfer_capacity: usize,
    /// Bytes requested for the hardware input buffer.
    pub hardware_buffer_size: usize,
}

impl BufferSizing {
    /// `min_device_buffer` is the platform minimum in bytes, or `None` when the
    /// platform could not report one.
    pub fn compute(config: &AudioConfig, min_device_buffer: Option<usize>) -> Self {
        let transfer_capacity = transfer_buffer_capacity(config);
        log::info!("transfer buffer capacity: {} bytes", transfer_capacity);

        let minimum = match min_device_buffer {
            Some(min) => min,
            None => {
                log::warn!(
                    "minimum buffer size unavailable for {} Hz x {}; using transfer capacity",
                    config.sample_rate_hz,
                    config.channel_count
                );
                transfer_capacity
            }
        };

        // Device minimums smaller than one callback slice are raised to it.
        let minimum = minimum.max(transfer_capacity);
        let hardware_buffer_size = minimum.saturating_mul(BUFFER_SIZE_FACTOR);
        log::info!("hardware buffer size: {} bytes", hardware_buffer_size);

        Self {
            transfer_capacity,
            hardware_buffer_size,
        }
    }
}
