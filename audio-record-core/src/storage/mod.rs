pub mod recording_dir;
