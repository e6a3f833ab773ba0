use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::models::config::AudioConfig;
use crate::models::error::CaptureError;
use crate::traits::output::{OpenedOutput, OutputTarget};

/// Attempts at finding an unused file name before giving up.
const MAX_NAME_ATTEMPTS: i64 = 1000;

/// Output target writing each recording to its own file in one directory.
///
/// ## File names
///
/// ```text
/// _<rate>_<channels>_<unix-millis>_.pcm   raw PCM, no header
/// _<unix-millis>_.mp4                     container recordings
/// ```
/// Existing files are never overwritten: on a clash the timestamp is bumped
/// until an unused name is found.
#[derive(Debug, Clone)]
pub struct RecordingDirectory {
    root: PathBuf,
}

impl RecordingDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pcm_file_name(config: &AudioConfig, millis: i64) -> String {
        format!(
            "_{}_{}_{}_.pcm",
            config.sample_rate_hz, config.channel_count, millis
        )
    }

    pub fn container_file_name(millis: i64) -> String {
        format!("_{}_.mp4", millis)
    }

    /// Create a new, empty file named by `name_for(millis)`.
    fn create_unique(&self, name_for: impl Fn(i64) -> String) -> Result<(File, PathBuf), CaptureError> {
        fs::create_dir_all(&self.root).map_err(|e| {
            CaptureError::StorageError(format!(
                "failed to create directory {}: {}",
                self.root.display(),
                e
            ))
        })?;

        let now = Utc::now().timestamp_millis();
        for offset in 0..MAX_NAME_ATTEMPTS {
            let path = self.root.join(name_for(now + offset));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((file, path)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(CaptureError::StorageError(format!(
                        "failed to create {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }
        Err(CaptureError::StorageError(format!(
            "no unused file name in {}",
            self.root.display()
        )))
    }
}

impl OutputTarget for RecordingDirectory {
    fn open_pcm(&self, config: &AudioConfig) -> Result<OpenedOutput, CaptureError> {
        let (file, path) = self.create_unique(|millis| Self::pcm_file_name(config, millis))?;
        log::info!("writing raw PCM to {}", path.display());
        Ok(OpenedOutput {
            writer: Box::new(BufWriter::new(file)),
            path: Some(path),
        })
    }

    /// The file is created empty so the name stays reserved until the
    /// encoder opens it.
    fn container_path(&self) -> Result<PathBuf, CaptureError> {
        let (_file, path) = self.create_unique(Self::container_file_name)?;
        log::info!("container output: {}", path.display());
        Ok(path)
    }

    /// Only an empty reservation is removed; anything the encoder wrote
    /// stays on disk.
    fn discard_container_path(&self, path: &Path) {
        match fs::metadata(path) {
            Ok(meta) if meta.is_file() && meta.len() == 0 => {
                if let Err(e) = fs::remove_file(path) {
                    log::warn!("failed to remove unused {}: {}", path.display(), e);
                } else {
                    log::debug!("removed unused {}", path.display());
                }
            }
            Ok(_) => log::debug!("keeping {}: not an empty reservation", path.display()),
            Err(e) => log::debug!("nothing to discard at {}: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("audio_record_test_{}", name));
        fs::remove_dir_all(&dir).ok();
        dir
    }

    #[test]
    fn pcm_file_name_carries_format() {
        let config = AudioConfig::new(48000, 2).unwrap();
        assert_eq!(
            RecordingDirectory::pcm_file_name(&config, 1700000000123),
            "_48000_2_1700000000123_.pcm"
        );
        assert_eq!(
            RecordingDirectory::container_file_name(1700000000123),
            "_1700000000123_.mp4"
        );
    }

    #[test]
    fn open_pcm_creates_directory_and_file() {
        let dir = temp_dir("open_pcm");
        let target = RecordingDirectory::new(dir.join("nested"));
        let config = AudioConfig::new(16000, 1).unwrap();

        let mut output = target.open_pcm(&config).unwrap();
        output.writer.write_all(&[1u8; 320]).unwrap();
        output.writer.flush().unwrap();
        drop(output.writer);

        let path = output.path.unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("_16000_1_"), "{}", name);
        assert!(name.ends_with("_.pcm"), "{}", name);
        assert_eq!(fs::read(&path).unwrap(), vec![1u8; 320]);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn never_overwrites_existing_recordings() {
        let dir = temp_dir("no_overwrite");
        let target = RecordingDirectory::new(&dir);
        let config = AudioConfig::new(16000, 1).unwrap();

        let paths: Vec<PathBuf> = (0..5)
            .map(|_| target.open_pcm(&config).unwrap().path.unwrap())
            .collect();
        for (i, a) in paths.iter().enumerate() {
            for b in &paths[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 5);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn container_path_reserves_file() {
        let dir = temp_dir("container_path");
        let target = RecordingDirectory::new(&dir);

        let first = target.container_path().unwrap();
        let second = target.container_path().unwrap();
        assert_ne!(first, second);
        assert!(first.exists());
        assert_eq!(first.extension().unwrap(), "mp4");

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn discard_removes_only_empty_reservations() {
        let dir = temp_dir("discard");
        let target = RecordingDirectory::new(&dir);

        let unused = target.container_path().unwrap();
        target.discard_container_path(&unused);
        assert!(!unused.exists());

        let written = target.container_path().unwrap();
        fs::write(&written, b"\0\0\0\x18ftypmp42").unwrap();
        target.discard_container_path(&written);
        assert!(written.exists());

        target.discard_container_path(&dir.join("missing.mp4"));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn unwritable_root_is_storage_error() {
        let dir = temp_dir("unwritable");
        fs::create_dir_all(dir.parent().unwrap()).unwrap();
        fs::write(&dir, b"not a directory").unwrap();

        let target = RecordingDirectory::new(dir.join("child"));
        let config = AudioConfig::new(16000, 1).unwrap();
        assert!(matches!(
            target.open_pcm(&config),
            Err(CaptureError::StorageError(_))
        ));

        fs::remove_file(&dir).ok();
    }
}
