//! WAV file format utilities for raw audio segments.
//!
//! Generates standard 44-byte RIFF WAV headers and patches the size fields
//! once a segment is closed.

/// Size of the standard WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// Raw audio segments are always 16-bit PCM.
pub const BIT_DEPTH: u16 = 16;

/// Largest data chunk whose RIFF chunk size (`36 + data_size`) fits in `u32`.
pub const MAX_DATA_SIZE: u64 = u32::MAX as u64 - (WAV_HEADER_SIZE as u64 - 8);

/// Generate a 44-byte WAV RIFF header.
///
/// Format: PCM (format code 1), little-endian.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    file size - 8 (placeholder: 36 + data_size)
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (PCM format chunk size)
/// [20-21]  1 (PCM format code)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * channels * bit_depth / 8
/// [32-33]  block_align = channels * bit_depth / 8
/// [34-35]  bit_depth
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub fn generate_wav_header(sample_rate: u32, bit_depth: u16, channels: u16, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    let byte_rate = sample_rate * channels as u32 * bit_depth as u32 / 8;
    let block_align = channels * bit_depth / 8;
    let chunk_size = 36 + data_size;

    let mut header = [0u8; WAV_HEADER_SIZE];

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bit_depth.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// Patch the RIFF chunk-size field at offset 4. Saturates at `u32::MAX`.
pub fn patch_file_size(header: &mut [u8], total_file_size: u64) {
    let chunk_size = u32::try_from(total_file_size.saturating_sub(8)).unwrap_or(u32::MAX);
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
}

/// Patch the data-size field at offset 40. Saturates at `u32::MAX`.
pub fn patch_data_size(header: &mut [u8], data_size: u64) {
    let data_size_u32 = u32::try_from(data_size).unwrap_or(u32::MAX);
    header[40..44].copy_from_slice(&data_size_u32.to_le_bytes());
}

/// Append f32 samples `[-1.0, 1.0]` to `out` as 16-bit little-endian PCM.
///
/// Clamps out-of-range values.
pub fn append_int16_pcm(samples: &[f32], out: &mut Vec<u8>) {
    out.reserve(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = (clamped * i16::MAX as f32) as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
}
