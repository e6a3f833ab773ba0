use std::fmt;
use std::path::PathBuf;

use crate::models::config::{AudioConfig, InputSource};
use crate::models::error::CaptureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    Mpeg4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioCodec {
    Aac,
}

/// Everything an external encoder needs for one recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub source: InputSource,
    pub format: ContainerFormat,
    pub codec: AudioCodec,
    pub config: AudioConfig,
    pub output_path: PathBuf,
}

impl EncoderSettings {
    /// Microphone into MPEG-4/AAC at `output_path`.
    pub fn mpeg4_aac(config: AudioConfig, output_path: PathBuf) -> Self {
        Self {
            source: InputSource::Microphone,
            format: ContainerFormat::Mpeg4,
            codec: AudioCodec::Aac,
            config,
            output_path,
        }
    }
}

/// Asynchronous failure reported by an encoder outside of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderFault {
    /// The encoder service or process went away; it must be reset.
    Died { code: Option<i32> },
    Unknown(String),
}

impl fmt::Display for EncoderFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Died { code: Some(code) } => write!(f, "encoder died with code {}", code),
            Self::Died { code: None } => f.write_str("encoder died"),
            Self::Unknown(reason) => write!(f, "unknown encoder error: {}", reason),
        }
    }
}

/// External container encoder (records and encodes on its own).
///
/// Call order: `configure → prepare → start → stop`, then either
/// `configure` again for the next recording or `reset`/`release`.
pub trait ContainerEncoder: Send {
    fn configure(&mut self, settings: EncoderSettings) -> Result<(), CaptureError>;

    fn prepare(&mut self) -> Result<(), CaptureError>;

    fn start(&mut self) -> Result<(), CaptureError>;

    fn stop(&mut self) -> Result<(), CaptureError>;

    /// Return to the unconfigured state, abandoning any recording.
    fn reset(&mut self) -> Result<(), CaptureError>;

    fn release(&mut self) -> Result<(), CaptureError>;

    /// Take the pending asynchronous fault, if any.
    fn take_fault(&mut self) -> Option<EncoderFault>;
}
