use thiserror::Error;

use super::state::SessionState;
use super::status::StatusCode;

/// Errors raised inside the recorder.
///
/// Never crosses the public recorder surface directly: each operation
/// converts its error into a [`StatusCode`] via [`CaptureError::status`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("invalid audio configuration: {0}")]
    InvalidConfig(String),

    #[error("audio input rejected configuration: {0}")]
    DeviceRejected(String),

    #[error("audio input not initialized")]
    DeviceNotReady,

    #[error("cannot {operation} while {state}")]
    InvalidState {
        state: SessionState,
        operation: &'static str,
    },

    #[error("no audio input is open")]
    NoInput,

    #[error("a capture worker is already active")]
    AlreadyRecording,

    #[error("a detached capture worker has not exited yet")]
    WorkerStalled,

    #[error("nothing to stop: no active recording")]
    NothingToStop,

    #[error("audio input failed to start: {0}")]
    StartFailed(String),

    #[error("audio input read failed: {0}")]
    ReadFailed(String),

    #[error("stop failed: {0}")]
    StopFailed(String),

    #[error("release failed: {0}")]
    ReleaseFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("encoder error: {0}")]
    EncoderError(String),

    #[error("configuration file error: {0}")]
    ConfigFile(String),
}

impl CaptureError {
    /// Status reported to callers for this error.
    ///
    /// `NothingToStop` shares `StartError` with genuine start failures; the
    /// ordinal is what callers already expect.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidConfig(_)
            | Self::DeviceRejected(_)
            | Self::DeviceNotReady
            | Self::AlreadyRecording
            | Self::ConfigFile(_) => StatusCode::InitError,
            Self::InvalidState { .. } | Self::NoInput | Self::WorkerStalled => {
                StatusCode::StateError
            }
            Self::NothingToStop
            | Self::StartFailed(_)
            | Self::ReadFailed(_)
            | Self::StorageError(_)
            | Self::EncoderError(_) => StatusCode::StartError,
            Self::StopFailed(_) => StatusCode::StopError,
            Self::ReleaseFailed(_) => StatusCode::ReleaseError,
        }
    }
}

impl From<&CaptureError> for StatusCode {
    fn from(err: &CaptureError) -> Self {
        err.status()
    }
}

/// Collapse an operation result into the status callers see.
pub fn status_of(result: &Result<(), CaptureError>) -> StatusCode {
    match result {
        Ok(()) => StatusCode::NoError,
        Err(e) => e.status(),
    }
}
