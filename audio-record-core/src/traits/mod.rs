pub mod audio_input;
pub mod callback_input;
pub mod encoder;
pub mod output;
pub mod recorder;
