pub mod checksum;
pub mod segment_sink;
pub mod wav_segment_writer;
