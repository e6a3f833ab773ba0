use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::config::AudioConfig;
use crate::models::error::CaptureError;

use super::audio_input::InputParams;
use super::output::PcmWriter;

/// Counters for one callback-driven recording.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallbackStats {
    pub bytes_written: u64,
    pub buffers_written: u64,
    /// Buffers that arrived while no output was attached, or after a write
    /// failure dropped it.
    pub discarded_buffers: u64,
}

/// Destination the platform's audio callback writes into.
///
/// The session attaches an output when a recording starts and detaches it
/// when the recording stops; the callback only ever calls
/// [`write_buffer`](Self::write_buffer). Each buffer is written whole or not
/// at all.
#[derive(Default)]
pub struct CallbackSink {
    writer: Mutex<Option<PcmWriter>>,
    bytes_written: AtomicU64,
    buffers_written: AtomicU64,
    discarded_buffers: AtomicU64,
}

impl CallbackSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route subsequent buffers to `writer`, resetting the counters.
    pub fn attach(&self, writer: PcmWriter) {
        let mut current = self.writer.lock();
        self.bytes_written.store(0, Ordering::Relaxed);
        self.buffers_written.store(0, Ordering::Relaxed);
        self.discarded_buffers.store(0, Ordering::Relaxed);
        *current = Some(writer);
    }

    /// Take the writer out and flush it. Buffers arriving afterwards are
    /// discarded.
    pub fn detach(&self) -> Result<(), CaptureError> {
        let writer = self.writer.lock().take();
        match writer {
            Some(mut writer) => writer
                .flush()
                .map_err(|e| CaptureError::StopFailed(format!("failed to flush output: {}", e))),
            None => Ok(()),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.writer.lock().is_some()
    }

    /// Called from the audio callback with one hardware buffer of PCM.
    pub fn write_buffer(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let mut writer = self.writer.lock();
        let Some(sink) = writer.as_mut() else {
            self.discarded_buffers.fetch_add(1, Ordering::Relaxed);
            return;
        };
        match sink.write_all(data) {
            Ok(()) => {
                self.bytes_written.fetch_add(data.len() as u64, Ordering::Relaxed);
                self.buffers_written.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                log::error!("failed to write callback buffer, dropping output: {}", e);
                self.discarded_buffers.fetch_add(1, Ordering::Relaxed);
                *writer = None;
            }
        }
    }

    pub fn stats(&self) -> CallbackStats {
        CallbackStats {
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            buffers_written: self.buffers_written.load(Ordering::Relaxed),
            discarded_buffers: self.discarded_buffers.load(Ordering::Relaxed),
        }
    }
}

/// A hardware stream that pushes its buffers into a [`CallbackSink`].
///
/// Owned by one session; never read from.
pub trait CallbackStream: Send {
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Stop the callbacks. The stream can be started again.
    fn stop(&mut self) -> Result<(), CaptureError>;

    /// Close the stream. Unusable afterwards.
    fn release(&mut self) -> Result<(), CaptureError>;
}

/// Platform entry point for callback-driven streams.
pub trait CallbackInputProvider: Send + Sync {
    /// Platform minimum buffer size in bytes for `config`, if known.
    fn min_buffer_size(&self, config: &AudioConfig) -> Option<usize>;

    fn open_stream(
        &self,
        params: &InputParams,
        sink: Arc<CallbackSink>,
    ) -> Result<Box<dyn CallbackStream>, CaptureError>;
}
