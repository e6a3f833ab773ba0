pub mod buffer_sizing;
pub mod transfer_buffer;
