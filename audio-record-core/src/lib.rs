//! # audio-record-core
//!
//! Platform-agnostic audio recording core library.
//!
//! Provides buffer sizing, the raw PCM capture worker, an uninterruptible
//! bounded join, and three recorder sessions behind one recorder surface.
//! Platform backends implement [`AudioInputProvider`] (blocking hardware
//! input), [`CallbackInputProvider`] (callback-driven streams) and
//! [`ContainerEncoder`] (external MPEG-4/AAC encoder) and plug into the
//! sessions.
//!
//! ## Architecture
//!
//! ```text
//! audio-record-core (this crate)
//! ├── traits/       ← AudioRecorder, AudioInputProvider, CallbackInputProvider, OutputTarget, ContainerEncoder
//! ├── models/       ← StatusCode, CaptureError, SessionState, AudioConfig, RecorderConfiguration
//! ├── processing/   ← buffer sizing, TransferBuffer
//! ├── session/      ← RawCaptureSession, CaptureWorker, CallbackCaptureSession, ContainerEncodedSession, Recorder, join
//! ├── storage/      ← RecordingDirectory
//! └── mock          ← scripted inputs, in-memory sinks, recording encoder (tests, `mock` feature)
//! ```
//!
//! Every public recorder operation returns a [`StatusCode`]; errors are
//! logged through the `log` facade and never propagate past the call.

#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::config::{AudioConfig, BackendKind, ChannelLayout, InputSource, RecorderConfiguration};
pub use models::error::CaptureError;
pub use models::state::{SessionState, WorkerState};
pub use models::status::StatusCode;
pub use processing::buffer_sizing::{transfer_buffer_capacity, BufferSizing};
pub use processing::transfer_buffer::TransferBuffer;
pub use session::callback::CallbackCaptureSession;
pub use session::container::ContainerEncodedSession;
pub use session::join::{join_uninterruptibly, Joinable, WorkerThread};
pub use session::raw::RawCaptureSession;
pub use session::recorder::{Recorder, RecorderParts};
pub use session::worker::{CaptureStats, CaptureWorker};
pub use storage::recording_dir::RecordingDirectory;
pub use traits::audio_input::{AudioInput, AudioInputProvider, InputParams, InputStatus, RecordingState};
pub use traits::callback_input::{CallbackInputProvider, CallbackSink, CallbackStats, CallbackStream};
pub use traits::encoder::{AudioCodec, ContainerEncoder, ContainerFormat, EncoderFault, EncoderSettings};
pub use traits::output::{OpenedOutput, OutputTarget, PcmWriter};
pub use traits::recorder::AudioRecorder;
