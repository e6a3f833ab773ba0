use std::fmt;
use std::sync::Arc;

use crate::models::config::{AudioConfig, InputSource};
use crate::models::error::CaptureError;

/// Whether an input is currently delivering audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordingState {
    Stopped,
    Recording,
}

/// Snapshot of an input handle, logged when a read goes wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputStatus {
    pub initialized: bool,
    pub recording: RecordingState,
}

impl InputStatus {
    pub fn is_recording(&self) -> bool {
        self.recording == RecordingState::Recording
    }
}

impl fmt::Display for InputStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "initialized: {}, recording state: {:?}",
            self.initialized, self.recording
        )
    }
}

/// Parameters used to open a hardware input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputParams {
    pub config: AudioConfig,
    pub source: InputSource,
    /// Requested hardware buffer size in bytes.
    pub buffer_size_bytes: usize,
}

/// An opened hardware audio input delivering interleaved 16-bit PCM.
///
/// Shared between the session (start/stop/release on the controlling
/// thread) and the capture worker (`read` on the worker thread), hence
/// `&self` everywhere.
pub trait AudioInput: Send + Sync {
    fn status(&self) -> InputStatus;

    /// Begin delivering audio.
    fn start(&self) -> Result<(), CaptureError>;

    /// Block until `buf` is full, the input stops, or the input fails.
    ///
    /// Returns the number of bytes written into `buf`. Anything other than
    /// `buf.len()` is a failed read for the caller.
    fn read(&self, buf: &mut [u8]) -> Result<usize, CaptureError>;

    /// Stop delivering audio. The handle stays usable for another `start`.
    fn stop(&self) -> Result<(), CaptureError>;

    /// Release the underlying device. The handle is unusable afterwards.
    fn release(&self) -> Result<(), CaptureError>;
}

/// Platform entry point for opening inputs.
pub trait AudioInputProvider: Send + Sync {
    /// Platform minimum buffer size in bytes for `config`, or `None` when the
    /// platform cannot report one.
    fn min_buffer_size(&self, config: &AudioConfig) -> Option<usize>;

    fn open(&self, params: &InputParams) -> Result<Arc<dyn AudioInput>, CaptureError>;
}
