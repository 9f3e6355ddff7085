pub mod display_buffer;
pub mod signal;
pub mod wav_format;
