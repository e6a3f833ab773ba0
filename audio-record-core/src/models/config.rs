use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::CaptureError;
use crate::processing::buffer_sizing::BUFFERS_PER_SECOND;

/// PCM sample width. Fixed: every backend records signed 16-bit samples.
pub const BITS_PER_SAMPLE: u16 = 16;

/// Default stop-join deadline.
pub const DEFAULT_JOIN_TIMEOUT_MS: u64 = 2000;

/// Highest sample rate accepted; well above any capture hardware.
pub const MAX_SAMPLE_RATE_HZ: u32 = 384_000;

/// Highest channel count accepted.
pub const MAX_CHANNEL_COUNT: u16 = 32;

pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 44100;
pub const DEFAULT_CHANNEL_COUNT: u16 = 2;

/// Sample rate and channel count of one recording.
///
/// Immutable once an input has been opened with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate_hz: u32,
    pub channel_count: u16,
}

impl AudioConfig {
    pub fn new(sample_rate_hz: u32, channel_count: u16) -> Result<Self, CaptureError> {
        let config = Self {
            sample_rate_hz,
            channel_count,
        };
        config.validate()?;
        Ok(config)
    }

    /// Rates below one frame per callback interval would give an empty
    /// transfer buffer, so they are rejected along with zero values.
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.sample_rate_hz == 0 {
            return Err(CaptureError::InvalidConfig("sample rate must be positive".into()));
        }
        if self.sample_rate_hz < BUFFERS_PER_SECOND {
            return Err(CaptureError::InvalidConfig(format!(
                "sample rate {} Hz is below {} Hz",
                self.sample_rate_hz, BUFFERS_PER_SECOND
            )));
        }
        if self.sample_rate_hz > MAX_SAMPLE_RATE_HZ {
            return Err(CaptureError::InvalidConfig(format!(
                "sample rate {} Hz is above {} Hz",
                self.sample_rate_hz, MAX_SAMPLE_RATE_HZ
            )));
        }
        if self.channel_count == 0 {
            return Err(CaptureError::InvalidConfig("channel count must be positive".into()));
        }
        if self.channel_count > MAX_CHANNEL_COUNT {
            return Err(CaptureError::InvalidConfig(format!(
                "{} channels exceeds the maximum of {}",
                self.channel_count, MAX_CHANNEL_COUNT
            )));
        }
        Ok(())
    }

    pub fn bits_per_sample(&self) -> u16 {
        BITS_PER_SAMPLE
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.channel_count as usize * (BITS_PER_SAMPLE / 8) as usize
    }

    /// Hardware channel layout: 1 channel is mono, anything else stereo.
    pub fn channel_layout(&self) -> ChannelLayout {
        if self.channel_count == 1 {
            ChannelLayout::Mono
        } else {
            ChannelLayout::Stereo
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    pub fn channels(&self) -> u16 {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
        }
    }
}

/// Which capture path the hardware input is tuned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    Microphone,
    #[default]
    VoiceCommunication,
}

/// Recorder backend selected at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Raw 16-bit PCM written by the capture worker.
    #[default]
    RawPcm,
    /// MPEG-4/AAC produced by an external encoder.
    ContainerEncoded,
    /// Raw 16-bit PCM written from the platform's audio callback.
    Callback,
}

/// Configuration for a recorder.
///
/// Every field has a default, so a JSON file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfiguration {
    /// Backend used by [`Recorder::from_configuration`](crate::Recorder::from_configuration).
    pub backend: BackendKind,

    /// Sample rate in Hz (default: 44100).
    pub sample_rate_hz: u32,

    /// Channel count (default: 2).
    pub channel_count: u16,

    /// Hardware input source (default: voice communication).
    pub input_source: InputSource,

    /// Directory where recordings are written.
    pub output_directory: PathBuf,

    /// Deadline for the stop join, in milliseconds (default: 2000).
    pub join_timeout_ms: u64,

    /// Input device name, or None for the system default.
    pub device_name: Option<String>,
}

impl RecorderConfiguration {
    pub fn validate(&self) -> Result<(), CaptureError> {
        self.audio_config().validate()?;
        if self.join_timeout_ms == 0 {
            return Err(CaptureError::InvalidConfig("join timeout must be positive".into()));
        }
        if self.output_directory.as_os_str().is_empty() {
            return Err(CaptureError::InvalidConfig("output directory must be set".into()));
        }
        Ok(())
    }

    pub fn audio_config(&self) -> AudioConfig {
        AudioConfig {
            sample_rate_hz: self.sample_rate_hz,
            channel_count: self.channel_count,
        }
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn from_json_str(json: &str) -> Result<Self, CaptureError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CaptureError::ConfigFile(format!("failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, CaptureError> {
        let json = fs::read_to_string(path).map_err(|e| {
            CaptureError::ConfigFile(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }
}

impl Default for RecorderConfiguration {
    fn default() -> Self {
        Self {
            backend: BackendKind::RawPcm,
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            channel_count: DEFAULT_CHANNEL_COUNT,
            input_source: InputSource::VoiceCommunication,
            output_directory: PathBuf::from("recordings"),
            join_timeout_ms: DEFAULT_JOIN_TIMEOUT_MS,
            device_name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_values() {
        assert!(AudioConfig::new(0, 1).is_err());
        assert!(AudioConfig::new(48000, 0).is_err());
        assert!(AudioConfig::new(99, 1).is_err());
        assert!(AudioConfig::new(100, 1).is_ok());
    }

    #[test]
    fn rejects_oversized_values() {
        assert!(AudioConfig::new(MAX_SAMPLE_RATE_HZ, MAX_CHANNEL_COUNT).is_ok());
        assert!(matches!(
            AudioConfig::new(MAX_SAMPLE_RATE_HZ + 1, 2),
            Err(CaptureError::InvalidConfig(_))
        ));
        assert!(matches!(
            AudioConfig::new(48000, MAX_CHANNEL_COUNT + 1),
            Err(CaptureError::InvalidConfig(_))
        ));
        assert!(AudioConfig::new(u32::MAX, u16::MAX).is_err());
    }

    #[test]
    fn more_than_one_channel_is_stereo() {
        assert_eq!(AudioConfig::new(16000, 1).unwrap().channel_layout(), ChannelLayout::Mono);
        assert_eq!(AudioConfig::new(16000, 2).unwrap().channel_layout(), ChannelLayout::Stereo);
        assert_eq!(AudioConfig::new(16000, 6).unwrap().channel_layout(), ChannelLayout::Stereo);
    }

    #[test]
    fn bytes_per_frame_uses_channel_count() {
        assert_eq!(AudioConfig::new(48000, 2).unwrap().bytes_per_frame(), 4);
        assert_eq!(AudioConfig::new(48000, 1).unwrap().bytes_per_frame(), 2);
    }

    #[test]
    fn defaults_validate() {
        let config = RecorderConfiguration::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.join_timeout(), Duration::from_millis(2000));
        assert_eq!(config.audio_config(), AudioConfig::new(44100, 2).unwrap());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = RecorderConfiguration::from_json_str(
            r#"{ "backend": "container_encoded", "sample_rate_hz": 16000, "channel_count": 1 }"#,
        )
        .unwrap();
        assert_eq!(config.backend, BackendKind::ContainerEncoded);
        assert_eq!(config.sample_rate_hz, 16000);
        assert_eq!(config.join_timeout_ms, DEFAULT_JOIN_TIMEOUT_MS);
        assert_eq!(config.input_source, InputSource::VoiceCommunication);
    }

    #[test]
    fn callback_backend_parses_from_json() {
        let config = RecorderConfiguration::from_json_str(r#"{ "backend": "callback" }"#).unwrap();
        assert_eq!(config.backend, BackendKind::Callback);
    }

    #[test]
    fn invalid_json_values_are_config_errors() {
        let err = RecorderConfiguration::from_json_str(r#"{ "channel_count": 0 }"#).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidConfig(_)));

        let err = RecorderConfiguration::from_json_str("not json").unwrap_err();
        assert!(matches!(err, CaptureError::ConfigFile(_)));
    }

    #[test]
    fn missing_file_is_config_error() {
        let path = std::env::temp_dir().join("audio_record_test_missing_config.json");
        let err = RecorderConfiguration::from_json_file(&path).unwrap_err();
        assert!(matches!(err, CaptureError::ConfigFile(_)));
    }
}
