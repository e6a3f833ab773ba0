//! MPEG-4/AAC recording through an external `ffmpeg` process.
//!
//! ffmpeg captures from the platform's default audio input by itself; no
//! samples pass through this process. Stopping sends `q` on stdin so ffmpeg
//! finalizes the container before exiting.

use std::io::{self, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use audio_record_core::models::error::CaptureError;
use audio_record_core::traits::encoder::{
    AudioCodec, ContainerEncoder, ContainerFormat, EncoderFault, EncoderSettings,
};

/// How long ffmpeg gets to finalize the file after `q`.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// ffmpeg input format and device for the current platform.
pub fn default_input() -> (&'static str, &'static str) {
    if cfg!(target_os = "macos") {
        ("avfoundation", ":0")
    } else if cfg!(target_os = "windows") {
        ("dshow", "audio=default")
    } else {
        ("pulse", "default")
    }
}

/// [`ContainerEncoder`] driving one `ffmpeg` child process per recording.
pub struct FfmpegEncoder {
    program: String,
    input_format: String,
    input_device: String,
    settings: Option<EncoderSettings>,
    args: Option<Vec<String>>,
    child: Option<Child>,
}

impl FfmpegEncoder {
    /// Encoder using `ffmpeg` from `PATH` and the platform default input.
    pub fn new() -> Self {
        let (format, device) = default_input();
        Self {
            program: "ffmpeg".into(),
            input_format: format.into(),
            input_device: device.into(),
            settings: None,
            args: None,
            child: None,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Capture from `device` using ffmpeg input format `format`.
    pub fn with_input(mut self, format: impl Into<String>, device: impl Into<String>) -> Self {
        self.input_format = format.into();
        self.input_device = device.into();
        self
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// Command line for one recording.
    pub fn build_args(&self, settings: &EncoderSettings) -> Vec<String> {
        let format = match settings.format {
            ContainerFormat::Mpeg4 => "mp4",
        };
        let codec = match settings.codec {
            AudioCodec::Aac => "aac",
        };
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            self.input_format.clone(),
            "-i".to_string(),
            self.input_device.clone(),
            "-ar".to_string(),
            settings.config.sample_rate_hz.to_string(),
            "-ac".to_string(),
            settings.config.channel_count.to_string(),
            "-c:a".to_string(),
            codec.to_string(),
            "-f".to_string(),
            format.to_string(),
            "-y".to_string(),
            settings.output_path.to_string_lossy().to_string(),
        ]
    }

    fn spawn(&self, args: &[String]) -> Result<Child, CaptureError> {
        Command::new(&self.program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    CaptureError::EncoderError(format!("{} not found", self.program))
                } else {
                    CaptureError::EncoderError(format!("failed to spawn {}: {}", self.program, e))
                }
            })
    }

    fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                log::warn!("failed to kill ffmpeg: {}", e);
            }
            let _ = child.wait();
        }
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(Duration::from_millis(20));
    }
}

impl ContainerEncoder for FfmpegEncoder {
    fn configure(&mut self, settings: EncoderSettings) -> Result<(), CaptureError> {
        if self.child.is_some() {
            return Err(CaptureError::EncoderError(
                "cannot configure while recording".into(),
            ));
        }
        if let Some(parent) = settings.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                return Err(CaptureError::EncoderError(format!(
                    "output directory does not exist: {}",
                    parent.display()
                )));
            }
        }
        self.args = None;
        self.settings = Some(settings);
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), CaptureError> {
        let settings = self
            .settings
            .as_ref()
            .ok_or_else(|| CaptureError::EncoderError("encoder not configured".into()))?;
        let args = self.build_args(settings);
        log::debug!("{} {}", self.program, args.join(" "));
        self.args = Some(args);
        Ok(())
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        if self.child.is_some() {
            return Err(CaptureError::EncoderError("ffmpeg is already running".into()));
        }
        let args = self
            .args
            .take()
            .ok_or_else(|| CaptureError::EncoderError("encoder not prepared".into()))?;
        let child = self.spawn(&args)?;
        log::info!("ffmpeg started (pid {})", child.id());
        self.child = Some(child);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        let mut child = self
            .child
            .take()
            .ok_or_else(|| CaptureError::EncoderError("ffmpeg is not running".into()))?;
        self.settings = None;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(b"q\n") {
                log::warn!("failed to ask ffmpeg to quit: {}", e);
            }
        }

        let status = match wait_with_deadline(&mut child, STOP_TIMEOUT) {
            Ok(Some(status)) => status,
            Ok(None) => {
                log::error!("ffmpeg did not exit within {:?}; killing it", STOP_TIMEOUT);
                let _ = child.kill();
                let _ = child.wait();
                return Err(CaptureError::EncoderError("ffmpeg did not exit".into()));
            }
            Err(e) => {
                let _ = child.kill();
                return Err(CaptureError::EncoderError(format!("failed to wait for ffmpeg: {}", e)));
            }
        };

        if status.success() {
            log::info!("ffmpeg finished");
            Ok(())
        } else {
            Err(CaptureError::EncoderError(format!("ffmpeg exited with {}", status)))
        }
    }

    fn reset(&mut self) -> Result<(), CaptureError> {
        self.kill();
        self.settings = None;
        self.args = None;
        Ok(())
    }

    fn release(&mut self) -> Result<(), CaptureError> {
        self.reset()
    }

    fn take_fault(&mut self) -> Option<EncoderFault> {
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(None) => None,
            Ok(Some(status)) => {
                self.child = None;
                Some(EncoderFault::Died {
                    code: status.code(),
                })
            }
            Err(e) => {
                self.kill();
                Some(EncoderFault::Unknown(e.to_string()))
            }
        }
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Whether `path` looks like a finished MPEG-4 file (has an `ftyp` box).
pub fn is_mpeg4_file(path: &Path) -> bool {
    match std::fs::read(path) {
        Ok(data) => data.len() >= 8 && &data[4..8] == b"ftyp",
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audio_record_core::models::config::AudioConfig;
    use std::path::PathBuf;

    fn settings(path: &str) -> EncoderSettings {
        EncoderSettings::mpeg4_aac(AudioConfig::new(44100, 2).unwrap(), PathBuf::from(path))
    }

    #[test]
    fn args_request_aac_in_mp4() {
        let encoder = FfmpegEncoder::new().with_input("pulse", "default");
        let args = encoder.build_args(&settings("out/_1_.mp4"));
        let joined = args.join(" ");
        assert!(joined.contains("-f pulse -i default"), "{}", joined);
        assert!(joined.contains("-ar 44100 -ac 2"), "{}", joined);
        assert!(joined.contains("-c:a aac -f mp4 -y"), "{}", joined);
        assert_eq!(args.last().unwrap(), "out/_1_.mp4");
    }

    #[test]
    fn prepare_requires_configure() {
        let mut encoder = FfmpegEncoder::new();
        assert!(matches!(encoder.prepare(), Err(CaptureError::EncoderError(_))));
        assert!(matches!(encoder.start(), Err(CaptureError::EncoderError(_))));
        assert!(matches!(encoder.stop(), Err(CaptureError::EncoderError(_))));
    }

    #[test]
    fn configure_rejects_missing_directory() {
        let mut encoder = FfmpegEncoder::new();
        let path = std::env::temp_dir()
            .join("audio_record_test_missing_dir")
            .join("x.mp4");
        let result = encoder.configure(EncoderSettings::mpeg4_aac(
            AudioConfig::new(44100, 2).unwrap(),
            path,
        ));
        assert!(matches!(result, Err(CaptureError::EncoderError(_))));
    }

    #[test]
    fn missing_program_is_encoder_error() {
        let mut encoder = FfmpegEncoder::new().with_program("audio-record-test-no-such-ffmpeg");
        encoder.configure(settings("x.mp4")).unwrap();
        encoder.prepare().unwrap();
        assert!(matches!(encoder.start(), Err(CaptureError::EncoderError(_))));
        assert!(!encoder.is_running());
        assert_eq!(encoder.take_fault(), None);
    }

    #[test]
    fn reset_clears_configuration() {
        let mut encoder = FfmpegEncoder::new();
        encoder.configure(settings("x.mp4")).unwrap();
        encoder.reset().unwrap();
        assert!(encoder.prepare().is_err());
    }

    #[test]
    fn non_mp4_file_is_detected() {
        let path = std::env::temp_dir().join("audio_record_test_not_mp4.bin");
        std::fs::write(&path, b"not an mp4 file").unwrap();
        assert!(!is_mpeg4_file(&path));
        std::fs::remove_file(&path).ok();
    }
}
