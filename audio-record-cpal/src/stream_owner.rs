//! Dedicated thread owning one cpal input stream.
//!
//! cpal streams are not `Send` on every host, so the stream is built on its
//! own thread and driven through play/pause/close commands. Samples reach
//! the caller through a handler run inside the audio callback.

use std::sync::mpsc;
use std::thread;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, Stream, StreamConfig};
use parking_lot::Mutex;

use audio_record_core::models::config::AudioConfig;
use audio_record_core::models::error::CaptureError;

use crate::device;

/// Receives interleaved 16-bit samples from the audio callback.
pub type SampleHandler = Box<dyn FnMut(&[i16]) + Send + 'static>;

type Reply = mpsc::Sender<Result<(), CaptureError>>;

enum StreamCommand {
    Play(Reply),
    Pause(Reply),
    Close,
}

pub struct StreamOwner {
    commands: Mutex<Option<mpsc::Sender<StreamCommand>>>,
    owner: Mutex<Option<thread::JoinHandle<()>>>,
}

impl StreamOwner {
    /// Build the stream on a new thread and wait for the outcome.
    pub fn spawn(
        device_name: Option<String>,
        config: AudioConfig,
        buffer_size_bytes: usize,
        on_samples: SampleHandler,
    ) -> Result<Self, CaptureError> {
        let (command_tx, command_rx) = mpsc::channel();
        let (built_tx, built_rx) = mpsc::channel();

        let owner = thread::Builder::new()
            .name("cpal-stream-owner".into())
            .spawn(move || {
                let built = build_stream(device_name.as_deref(), &config, buffer_size_bytes, on_samples);
                let stream = match built {
                    Ok(stream) => {
                        let _ = built_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = built_tx.send(Err(e));
                        return;
                    }
                };
                serve_commands(&stream, command_rx);
            })
            .map_err(|e| CaptureError::DeviceRejected(format!("failed to spawn stream thread: {}", e)))?;

        match built_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = owner.join();
                return Err(e);
            }
            Err(_) => {
                let _ = owner.join();
                return Err(CaptureError::DeviceRejected("stream thread exited".into()));
            }
        }

        Ok(Self {
            commands: Mutex::new(Some(command_tx)),
            owner: Mutex::new(Some(owner)),
        })
    }

    pub fn play(&self) -> Result<(), CaptureError> {
        self.request(StreamCommand::Play)
            .map_err(|e| match e {
                CaptureError::StartFailed(_) => e,
                other => CaptureError::StartFailed(other.to_string()),
            })
    }

    pub fn pause(&self) -> Result<(), CaptureError> {
        self.request(StreamCommand::Pause)
            .map_err(|e| match e {
                CaptureError::StopFailed(_) => e,
                other => CaptureError::StopFailed(other.to_string()),
            })
    }

    /// Drop the stream and join its thread. Later calls do nothing.
    pub fn close(&self) -> Result<(), CaptureError> {
        if let Some(sender) = self.commands.lock().take() {
            let _ = sender.send(StreamCommand::Close);
        }
        if let Some(owner) = self.owner.lock().take() {
            owner
                .join()
                .map_err(|_| CaptureError::ReleaseFailed("stream thread panicked".into()))?;
        }
        Ok(())
    }

    fn request(&self, make: impl FnOnce(Reply) -> StreamCommand) -> Result<(), CaptureError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        {
            let commands = self.commands.lock();
            let sender = commands.as_ref().ok_or(CaptureError::DeviceNotReady)?;
            sender
                .send(make(reply_tx))
                .map_err(|_| CaptureError::DeviceNotReady)?;
        }
        reply_rx.recv().map_err(|_| CaptureError::DeviceNotReady)?
    }
}

impl Drop for StreamOwner {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("failed to close cpal stream: {}", e);
        }
    }
}

fn serve_commands(stream: &Stream, commands: mpsc::Receiver<StreamCommand>) {
    for command in commands {
        match command {
            StreamCommand::Play(reply) => {
                let result = stream
                    .play()
                    .map_err(|e| CaptureError::StartFailed(format!("failed to play stream: {}", e)));
                let _ = reply.send(result);
            }
            StreamCommand::Pause(reply) => {
                let result = stream
                    .pause()
                    .map_err(|e| CaptureError::StopFailed(format!("failed to pause stream: {}", e)));
                let _ = reply.send(result);
            }
            StreamCommand::Close => break,
        }
    }
}

fn build_stream(
    device_name: Option<&str>,
    config: &AudioConfig,
    buffer_size_bytes: usize,
    mut on_samples: SampleHandler,
) -> Result<Stream, CaptureError> {
    let device = device::find_input_device(device_name)?;
    let range = device::matching_config_range(&device, config)?;
    let sample_format = range.sample_format();

    let stream_config = StreamConfig {
        channels: config.channel_count,
        sample_rate: SampleRate(config.sample_rate_hz),
        buffer_size: match device::buffer_frames(&range, config, buffer_size_bytes) {
            Some(frames) => BufferSize::Fixed(frames),
            None => BufferSize::Default,
        },
    };
    log::info!(
        "building {:?} input stream on {:?}: {:?}",
        sample_format,
        device.name().ok(),
        stream_config
    );

    let err_fn = |err: cpal::StreamError| log::error!("audio stream error: {}", err);
    let stream = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| on_samples(data),
            err_fn,
            None,
        ),
        SampleFormat::F32 => {
            let mut scratch: Vec<i16> = Vec::new();
            device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    scratch.clear();
                    scratch.extend(data.iter().map(|&s| f32_to_i16(s)));
                    on_samples(&scratch);
                },
                err_fn,
                None,
            )
        }
        other => {
            return Err(CaptureError::DeviceRejected(format!(
                "unsupported sample format {:?}",
                other
            )))
        }
    };
    stream.map_err(|e| CaptureError::DeviceRejected(format!("failed to build input stream: {}", e)))
}

/// Convert a float sample to 16-bit PCM, clamping out-of-range input.
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_conversion_clamps() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(-1.0), -i16::MAX);
        assert_eq!(f32_to_i16(4.0), i16::MAX);
        assert_eq!(f32_to_i16(-4.0), -i16::MAX);
        assert_eq!(f32_to_i16(0.5), i16::MAX / 2);
    }
}
