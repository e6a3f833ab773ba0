//! # audio-record-cpal
//!
//! Desktop backend for audio-record.
//!
//! Provides:
//! - `CpalInputProvider` / `CpalInput`: blocking hardware input through cpal
//! - `CpalCallbackProvider` / `CpalCallbackStream`: callback-driven input
//!   writing straight into a `CallbackSink`
//! - `FfmpegEncoder`: MPEG-4/AAC recording through an external ffmpeg process
//! - `device`: input device lookup and listing
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use audio_record_core::{AudioRecorder, RawCaptureSession, RecordingDirectory};
//! use audio_record_cpal::CpalInputProvider;
//!
//! let mut session = RawCaptureSession::new(
//!     Arc::new(CpalInputProvider::new()),
//!     Arc::new(RecordingDirectory::new("recordings")),
//! );
//! session.init_recording(48000, 2);
//! session.start_recording();
//! ```

pub mod cpal_callback;
pub mod cpal_input;
pub mod device;
pub mod ffmpeg_encoder;
pub mod pcm_queue;
pub mod stream_owner;

pub use cpal_callback::{CpalCallbackProvider, CpalCallbackStream};
pub use cpal_input::{CpalInput, CpalInputProvider};
pub use device::{list_input_devices, InputDeviceInfo};
pub use ffmpeg_encoder::FfmpegEncoder;
pub use pcm_queue::PcmQueue;
pub use stream_owner::StreamOwner;
