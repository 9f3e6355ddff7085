use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::models::audio_models::{ClosedSegment, SensorStream};
use crate::models::error::SensorError;
use crate::processing::wav_format::{self, BIT_DEPTH, MAX_DATA_SIZE, WAV_HEADER_SIZE};
use crate::storage::checksum::sha256_file;
use crate::storage::segment_sink::create_segment_file;

/// Streaming mono WAV writer for one raw audio segment.
///
/// ## File Format
/// ```text
/// [44-byte WAV header, sizes patched on close]
/// [raw 16-bit PCM data...]
/// ```
///
/// A segment holds at most [`MAX_DATA_SIZE`] bytes of PCM so the RIFF sizes
/// stay representable; writes past that fail without touching the file.
pub struct WavSegmentWriter {
    file_path: PathBuf,
    file: Option<BufWriter<File>>,
    sample_rate: u32,
    data_bytes: u64,
    pcm: Vec<u8>,
    closed: Option<ClosedSegment>,
}

impl WavSegmentWriter {
    /// Create `audio_<epoch>.wav` in `directory` with a placeholder header.
    pub fn open(directory: &Path, sample_rate: u32, created_at: DateTime<Utc>) -> Result<Self, SensorError> {
        let (file_path, file) = create_segment_file(directory, SensorStream::RawAudio, created_at)?;
        let mut file = BufWriter::new(file);

        let header = wav_format::generate_wav_header(sample_rate, BIT_DEPTH, 1, 0);
        file.write_all(&header)
            .map_err(|e| SensorError::SegmentWriteFailure(format!("write failed: {}", e)))?;

        Ok(Self {
            file_path,
            file: Some(file),
            sample_rate,
            data_bytes: 0,
            pcm: Vec::new(),
            closed: None,
        })
    }

    /// Append mono f32 samples as 16-bit PCM.
    pub fn write_samples(&mut self, samples: &[f32]) -> Result<(), SensorError> {
        let remaining_frames = self.remaining_frames();
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| SensorError::SegmentWriteFailure("segment is closed".into()))?;
        if samples.len() as u64 > remaining_frames {
            return Err(SensorError::SegmentWriteFailure(format!(
                "segment full: {} of {} bytes used",
                self.data_bytes, MAX_DATA_SIZE
            )));
        }

        self.pcm.clear();
        wav_format::append_int16_pcm(samples, &mut self.pcm);
        file.write_all(&self.pcm)
            .map_err(|e| SensorError::SegmentWriteFailure(format!("write failed: {}", e)))?;
        self.data_bytes += self.pcm.len() as u64;
        Ok(())
    }

    /// Finalize the file: patch the RIFF and data sizes, flush, checksum.
    ///
    /// Closing twice returns the same segment.
    pub fn close(&mut self) -> Result<ClosedSegment, SensorError> {
        if let Some(closed) = &self.closed {
            return Ok(closed.clone());
        }

        let mut writer = self
            .file
            .take()
            .ok_or_else(|| SensorError::SegmentWriteFailure("segment is not open".into()))?;

        let mut header = wav_format::generate_wav_header(self.sample_rate, BIT_DEPTH, 1, 0);
        wav_format::patch_data_size(&mut header, self.data_bytes);
        wav_format::patch_file_size(&mut header, self.data_bytes + WAV_HEADER_SIZE as u64);

        let finalize = |w: &mut BufWriter<File>| -> std::io::Result<()> {
            w.flush()?;
            w.seek(SeekFrom::Start(0))?;
            w.write_all(&header)?;
            w.flush()
        };
        finalize(&mut writer)
            .map_err(|e| SensorError::SegmentWriteFailure(format!("failed to finalize header: {}", e)))?;
        drop(writer);

        let closed = ClosedSegment {
            stream: SensorStream::RawAudio,
            file_path: self.file_path.clone(),
            rows: self.frames_written(),
            checksum: sha256_file(&self.file_path)?,
        };
        self.closed = Some(closed.clone());
        Ok(closed)
    }

    pub fn frames_written(&self) -> u64 {
        self.data_bytes / (BIT_DEPTH as u64 / 8)
    }

    /// Frames that still fit before the RIFF size limit.
    pub fn remaining_frames(&self) -> u64 {
        MAX_DATA_SIZE.saturating_sub(self.data_bytes) / (BIT_DEPTH as u64 / 8)
    }

    #[cfg(test)]
    pub(crate) fn set_data_bytes(&mut self, data_bytes: u64) {
        self.data_bytes = data_bytes;
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;

    #[test]
    fn writes_valid_mono_wav() {
        let dir = tempfile::tempdir().unwrap();
        let created = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut writer = WavSegmentWriter::open(dir.path(), 16000, created).unwrap();

        writer.write_samples(&[0.0, 0.5, -0.5, 1.0]).unwrap();
        writer.write_samples(&[0.25; 4]).unwrap();
        let closed = writer.close().unwrap();

        assert_eq!(closed.file_path.file_name().unwrap(), "audio_1700000000.wav");
        assert_eq!(closed.rows, 8);

        let data = fs::read(&closed.file_path).unwrap();
        assert_eq!(data.len(), 44 + 16);
        assert_eq!(&data[0..4], b"RIFF");

        let data_size = u32::from_le_bytes([data[40], data[41], data[42], data[43]]);
        assert_eq!(data_size, 16);
        let chunk_size = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        assert_eq!(chunk_size, 36 + 16);
    }

    #[test]
    fn refuses_writes_past_riff_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = WavSegmentWriter::open(dir.path(), 48000, Utc::now()).unwrap();

        writer.data_bytes = MAX_DATA_SIZE - 5;
        assert_eq!(writer.remaining_frames(), 2);
        writer.write_samples(&[0.1, 0.2]).unwrap();
        assert_eq!(writer.remaining_frames(), 0);

        let err = writer.write_samples(&[0.3]).unwrap_err();
        assert!(matches!(err, SensorError::SegmentWriteFailure(_)));
        assert_eq!(writer.data_bytes, MAX_DATA_SIZE - 1);

        let closed = writer.close().unwrap();
        let data = fs::read(&closed.file_path).unwrap();
        let chunk_size = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        let data_size = u32::from_le_bytes([data[40], data[41], data[42], data[43]]);
        assert_eq!(chunk_size, u32::MAX - 1);
        assert_eq!(data_size as u64, MAX_DATA_SIZE - 1);
    }

    #[test]
    fn write_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = WavSegmentWriter::open(dir.path(), 8000, Utc::now()).unwrap();
        let first = writer.close().unwrap();

        assert!(writer.write_samples(&[0.1]).is_err());
        assert_eq!(writer.close().unwrap(), first);
    }
}
