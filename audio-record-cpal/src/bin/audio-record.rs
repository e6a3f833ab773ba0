//! Record from an input device for a fixed duration.
//!
//! ```text
//! audio-record --seconds 10 --rate 48000 --channels 2 --output-dir recordings
//! audio-record --backend container-encoded --seconds 5
//! audio-record --backend callback --seconds 5
//! audio-record --list-devices
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use audio_record_core::{
    AudioInputProvider, AudioRecorder, BackendKind, CallbackInputProvider, CaptureError, Recorder,
    RecorderConfiguration, RecorderParts, RecordingDirectory, StatusCode,
};
use audio_record_cpal::ffmpeg_encoder::is_mpeg4_file;
use audio_record_cpal::{
    list_input_devices, CpalCallbackProvider, CpalInputProvider, FfmpegEncoder,
};

/// Record microphone audio as raw PCM or MPEG-4/AAC
#[derive(Parser, Debug)]
#[command(name = "audio-record")]
#[command(about = "Record microphone audio as raw PCM or MPEG-4/AAC")]
struct Cli {
    /// JSON configuration file; command-line options override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Recorder backend
    #[arg(short = 'b', long)]
    backend: Option<BackendArg>,

    /// Sample rate in Hz
    #[arg(short = 'r', long, value_name = "HZ")]
    rate: Option<u32>,

    /// Channel count
    #[arg(short = 'c', long)]
    channels: Option<u16>,

    /// Directory recordings are written to
    #[arg(short = 'o', long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Input device name (default: system default input)
    #[arg(short = 'd', long)]
    device: Option<String>,

    /// Recording length in seconds
    #[arg(short = 's', long, default_value_t = 5)]
    seconds: u64,

    /// List input devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    RawPcm,
    Callback,
    ContainerEncoded,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::RawPcm => BackendKind::RawPcm,
            BackendArg::Callback => BackendKind::Callback,
            BackendArg::ContainerEncoded => BackendKind::ContainerEncoded,
        }
    }
}

impl Cli {
    fn configuration(&self) -> Result<RecorderConfiguration, CaptureError> {
        let mut config = match &self.config {
            Some(path) => RecorderConfiguration::from_json_file(path)?,
            None => RecorderConfiguration::default(),
        };
        if let Some(backend) = self.backend {
            config.backend = backend.into();
        }
        if let Some(rate) = self.rate {
            config.sample_rate_hz = rate;
        }
        if let Some(channels) = self.channels {
            config.channel_count = channels;
        }
        if let Some(dir) = &self.output_dir {
            config.output_directory = dir.clone();
        }
        if let Some(device) = &self.device {
            config.device_name = Some(device.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

fn list_devices() -> ExitCode {
    match list_input_devices() {
        Ok(devices) if devices.is_empty() => {
            println!("no input devices found");
            ExitCode::SUCCESS
        }
        Ok(devices) => {
            for device in devices {
                let marker = if device.is_default { "*" } else { " " };
                println!(
                    "{} {} ({} Hz, {} channel(s))",
                    marker, device.name, device.sample_rate_hz, device.channels
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn exit_code(status: StatusCode) -> ExitCode {
    ExitCode::from(status.ordinal() as u8)
}

fn record(
    recorder: &mut Recorder<FfmpegEncoder>,
    config: &RecorderConfiguration,
    seconds: u64,
) -> StatusCode {
    let status = recorder.init_recording(config.sample_rate_hz, config.channel_count);
    if !status.is_ok() {
        return status;
    }
    let status = recorder.start_recording();
    if !status.is_ok() {
        recorder.release();
        return status;
    }

    log::info!("recording for {} s", seconds);
    thread::sleep(Duration::from_secs(seconds));

    let status = recorder.stop_recording();
    if let Some(path) = recorder.output_path() {
        println!("{}", path.display());
        if recorder.backend() == BackendKind::ContainerEncoded && !is_mpeg4_file(path) {
            log::warn!("{} does not look like an MPEG-4 file", path.display());
        }
    }
    let released = recorder.release();
    if status.is_ok() {
        released
    } else {
        status
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if cli.list_devices {
        return list_devices();
    }

    let config = match cli.configuration() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            return exit_code(e.status());
        }
    };

    let (input, callback_input): (Arc<dyn AudioInputProvider>, Arc<dyn CallbackInputProvider>) =
        match &config.device_name {
            Some(name) => (
                Arc::new(CpalInputProvider::with_device(name.clone())),
                Arc::new(CpalCallbackProvider::with_device(name.clone())),
            ),
            None => (
                Arc::new(CpalInputProvider::new()),
                Arc::new(CpalCallbackProvider::new()),
            ),
        };
    let parts = RecorderParts {
        input,
        callback_input,
        encoder: FfmpegEncoder::new(),
        output: Arc::new(RecordingDirectory::new(&config.output_directory)),
    };
    let mut recorder = match Recorder::from_configuration(&config, parts) {
        Ok(recorder) => recorder,
        Err(e) => {
            log::error!("{}", e);
            return exit_code(e.status());
        }
    };

    let status = record(&mut recorder, &config, cli.seconds);
    if status.is_ok() {
        ExitCode::SUCCESS
    } else {
        log::error!("recording failed: {}", status);
        exit_code(status)
    }
}
