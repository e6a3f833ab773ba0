//! Input device lookup through the default cpal host.
//!
//! Devices are identified by their cpal name. `None` always means the host's
//! default input device.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, SampleFormat, SupportedBufferSize, SupportedStreamConfigRange};

use audio_record_core::models::config::AudioConfig;
use audio_record_core::models::error::CaptureError;

/// Summary of one input device, as printed by `audio-record --list-devices`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDeviceInfo {
    pub name: String,
    pub is_default: bool,
    /// Channel count of the device's default input configuration.
    pub channels: u16,
    /// Sample rate of the device's default input configuration.
    pub sample_rate_hz: u32,
}

/// List the input devices of the default host.
pub fn list_input_devices() -> Result<Vec<InputDeviceInfo>, CaptureError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::DeviceRejected(format!("failed to enumerate inputs: {}", e)))?;

    let mut infos = Vec::new();
    for device in devices {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let (channels, sample_rate_hz) = match device.default_input_config() {
            Ok(config) => (config.channels(), config.sample_rate().0),
            Err(_) => (0, 0),
        };
        infos.push(InputDeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            channels,
            sample_rate_hz,
        });
    }
    Ok(infos)
}

/// Find an input device by name, or the default one.
pub fn find_input_device(name: Option<&str>) -> Result<Device, CaptureError> {
    let host = cpal::default_host();
    let Some(name) = name else {
        return host
            .default_input_device()
            .ok_or_else(|| CaptureError::DeviceRejected("no default input device".into()));
    };

    let mut devices = host
        .input_devices()
        .map_err(|e| CaptureError::DeviceRejected(format!("failed to enumerate inputs: {}", e)))?;
    devices
        .find(|d| d.name().map(|n| n == name).unwrap_or(false))
        .ok_or_else(|| CaptureError::DeviceRejected(format!("input device not found: {}", name)))
}

/// A supported configuration range able to deliver `config`, preferring
/// native 16-bit samples over float.
pub fn matching_config_range(
    device: &Device,
    config: &AudioConfig,
) -> Result<SupportedStreamConfigRange, CaptureError> {
    let ranges = device
        .supported_input_configs()
        .map_err(|e| CaptureError::DeviceRejected(format!("failed to query input configs: {}", e)))?;

    let mut candidates: Vec<SupportedStreamConfigRange> = ranges
        .filter(|r| r.channels() == config.channel_count)
        .filter(|r| {
            r.min_sample_rate().0 <= config.sample_rate_hz
                && config.sample_rate_hz <= r.max_sample_rate().0
        })
        .filter(|r| matches!(r.sample_format(), SampleFormat::I16 | SampleFormat::F32))
        .collect();
    candidates.sort_by_key(|r| match r.sample_format() {
        SampleFormat::I16 => 0,
        _ => 1,
    });

    candidates.into_iter().next().ok_or_else(|| {
        CaptureError::DeviceRejected(format!(
            "device does not support {} Hz x {} channel(s) as i16 or f32",
            config.sample_rate_hz, config.channel_count
        ))
    })
}

/// Smallest buffer the range accepts, in bytes of 16-bit PCM.
pub fn min_buffer_bytes(range: &SupportedStreamConfigRange, config: &AudioConfig) -> Option<usize> {
    match range.buffer_size() {
        SupportedBufferSize::Range { min, .. } => Some(*min as usize * config.bytes_per_frame()),
        SupportedBufferSize::Unknown => None,
    }
}

/// Platform minimum buffer in bytes for `config` on the named device, or
/// `None` when the device or the host cannot say.
pub fn device_min_buffer_bytes(device_name: Option<&str>, config: &AudioConfig) -> Option<usize> {
    let device = find_input_device(device_name).ok()?;
    let range = matching_config_range(&device, config).ok()?;
    min_buffer_bytes(&range, config)
}

/// Hardware buffer in frames for a requested size in bytes, clamped to the
/// range. `None` leaves the choice to the host.
pub fn buffer_frames(
    range: &SupportedStreamConfigRange,
    config: &AudioConfig,
    buffer_size_bytes: usize,
) -> Option<u32> {
    let frames = u32::try_from(buffer_size_bytes / config.bytes_per_frame()).unwrap_or(u32::MAX);
    match range.buffer_size() {
        SupportedBufferSize::Range { min, max } => Some(frames.clamp(*min, *max)),
        SupportedBufferSize::Unknown => None,
    }
}
