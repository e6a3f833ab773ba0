use std::io::Write;
use std::path::{Path, PathBuf};

use crate::models::config::AudioConfig;
use crate::models::error::CaptureError;

/// Byte sink receiving raw PCM from a capture worker.
pub type PcmWriter = Box<dyn Write + Send>;

/// A freshly opened output for one recording.
pub struct OpenedOutput {
    pub writer: PcmWriter,
    /// Location on disk, when the output is a file.
    pub path: Option<PathBuf>,
}

/// Supplies a destination for each recording.
///
/// Called once per `start_recording`; every recording gets its own output.
pub trait OutputTarget: Send + Sync {
    /// Open a writable stream for a raw PCM recording.
    fn open_pcm(&self, config: &AudioConfig) -> Result<OpenedOutput, CaptureError>;

    /// Path the container encoder should write its next file to.
    fn container_path(&self) -> Result<PathBuf, CaptureError>;

    /// Give back a path from [`container_path`](Self::container_path) that no
    /// recording was written to.
    fn discard_container_path(&self, _path: &Path) {}
}
