use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use ringbuf::traits::{Consumer, Observer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::models::audio_models::ClosedSegment;
use crate::models::error::SensorError;
use crate::storage::wav_segment_writer::WavSegmentWriter;

/// Seconds of mono audio the realtime ring can hold between drains.
pub const RAW_RING_SECONDS: usize = 4;

const DRAIN_CHUNK: usize = 4096;

/// Outcome of closing one raw audio segment.
pub(crate) type SegmentClose = Result<ClosedSegment, SensorError>;

/// Control-side half of the raw audio stream.
///
/// Drains the SPSC ring filled by the tap and writes rotating
/// `audio_<epoch>.wav` segments. A segment that reaches the WAV size limit
/// is closed early and the next one continues the stream.
pub(crate) struct RawAudioRecorder {
    directory: PathBuf,
    sample_rate: u32,
    interval: Duration,
    consumer: HeapCons<f32>,
    writer: Option<WavSegmentWriter>,
    opened_at: Instant,
    scratch: Vec<f32>,
    frames_written: u64,
    closed: Vec<SegmentClose>,
}

impl RawAudioRecorder {
    /// Open the first segment and return the producer half for the tap.
    pub(crate) fn open(
        directory: PathBuf,
        sample_rate: u32,
        interval: Duration,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Result<(Self, HeapProd<f32>), SensorError> {
        let capacity = (sample_rate as usize).max(1) * RAW_RING_SECONDS;
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
        let writer = WavSegmentWriter::open(&directory, sample_rate, wall)?;

        let recorder = Self {
            directory,
            sample_rate,
            interval,
            consumer,
            writer: Some(writer),
            opened_at: now,
            scratch: vec![0.0; DRAIN_CHUNK],
            frames_written: 0,
            closed: Vec::new(),
        };
        Ok((recorder, producer))
    }

    /// Move everything queued in the ring into the current segment.
    ///
    /// Samples popped while no segment is open are discarded.
    pub(crate) fn drain(&mut self, wall: DateTime<Utc>) -> Result<u64, SensorError> {
        let mut moved = 0u64;
        while !self.consumer.is_empty() {
            let n = self.consumer.pop_slice(&mut self.scratch);
            if n == 0 {
                break;
            }
            let mut offset = 0;
            while offset < n {
                let Some(writer) = self.writer.as_mut() else {
                    break;
                };
                let room = writer.remaining_frames().min((n - offset) as u64) as usize;
                if room == 0 {
                    self.roll_over(wall)?;
                    continue;
                }
                writer.write_samples(&self.scratch[offset..offset + room])?;
                offset += room;
                moved += room as u64;
                self.frames_written += room as u64;
            }
        }
        Ok(moved)
    }

    /// Close the current segment and open the next one once `interval` has
    /// elapsed. Also returns segments closed early by [`drain`](Self::drain).
    pub(crate) fn rotate_if_due(
        &mut self,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Result<Vec<SegmentClose>, SensorError> {
        if now.duration_since(self.opened_at) >= self.interval {
            self.drain(wall)?;
            self.opened_at = now;
            self.roll_over(wall)?;
        }
        Ok(std::mem::take(&mut self.closed))
    }

    /// Drain what is left and close the final segment.
    pub(crate) fn finish(mut self, wall: DateTime<Utc>) -> Vec<SegmentClose> {
        if let Err(e) = self.drain(wall) {
            log::warn!("Raw audio write failed: {}", e);
        }
        if let Some(mut writer) = self.writer.take() {
            self.closed.push(writer.close());
        }
        self.closed
    }

    /// Close and delete the current segment without handing it off.
    pub(crate) fn discard(mut self) {
        if let Some(mut writer) = self.writer.take() {
            let path = writer.file_path().to_path_buf();
            let _ = writer.close();
            if let Err(e) = fs::remove_file(&path) {
                log::warn!("Failed to remove unused segment {}: {}", path.display(), e);
            }
        }
    }

    pub(crate) fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn roll_over(&mut self, wall: DateTime<Utc>) -> Result<(), SensorError> {
        if let Some(mut writer) = self.writer.take() {
            self.closed.push(writer.close());
        }
        self.writer = Some(WavSegmentWriter::open(&self.directory, self.sample_rate, wall)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ringbuf::traits::Producer;

    fn wall(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn drains_ring_into_segment() {
        let dir = tempfile::tempdir().unwrap();
        let start = Instant::now();
        let (mut recorder, mut producer) =
            RawAudioRecorder::open(dir.path().to_path_buf(), 8_000, Duration::from_secs(60), start, wall(1_700_000_000))
                .unwrap();

        producer.push_slice(&[0.5; 100]);
        assert_eq!(recorder.drain(wall(1_700_000_001)).unwrap(), 100);

        let mut closed = recorder.finish(wall(1_700_000_002));
        assert_eq!(closed.len(), 1);
        let closed = closed.remove(0).unwrap();
        assert_eq!(closed.rows, 100);
        assert!(closed.file_path.ends_with("audio_1700000000.wav"));
        assert_eq!(fs::metadata(&closed.file_path).unwrap().len(), 44 + 200);
    }

    #[test]
    fn rotates_after_interval() {
        let dir = tempfile::tempdir().unwrap();
        let start = Instant::now();
        let (mut recorder, mut producer) =
            RawAudioRecorder::open(dir.path().to_path_buf(), 8_000, Duration::from_secs(10), start, wall(1_700_000_000))
                .unwrap();

        producer.push_slice(&[0.1; 10]);
        assert!(recorder
            .rotate_if_due(start + Duration::from_secs(9), wall(1_700_000_009))
            .unwrap()
            .is_empty());

        let mut rotated = recorder
            .rotate_if_due(start + Duration::from_secs(10), wall(1_700_000_010))
            .unwrap();
        assert_eq!(rotated.len(), 1);
        let first = rotated.remove(0).unwrap();
        assert_eq!(first.rows, 10);

        producer.push_slice(&[0.1; 3]);
        let second = recorder.finish(wall(1_700_000_011)).remove(0).unwrap();
        assert!(second.file_path.ends_with("audio_1700000010.wav"));
        assert_eq!(second.rows, 3);
    }

    #[test]
    fn full_segment_rolls_over_before_interval() {
        let dir = tempfile::tempdir().unwrap();
        let start = Instant::now();
        let (mut recorder, mut producer) =
            RawAudioRecorder::open(dir.path().to_path_buf(), 48_000, Duration::from_secs(3600), start, wall(1_700_000_000))
                .unwrap();
        if let Some(writer) = recorder.writer.as_mut() {
            writer.set_data_bytes(crate::processing::wav_format::MAX_DATA_SIZE - 9);
        }

        producer.push_slice(&[0.2; 10]);
        assert_eq!(recorder.drain(wall(1_700_000_500)).unwrap(), 10);

        let mut early = recorder
            .rotate_if_due(start + Duration::from_secs(500), wall(1_700_000_500))
            .unwrap();
        assert_eq!(early.len(), 1);
        let full = early.remove(0).unwrap();
        assert!(full.file_path.ends_with("audio_1700000000.wav"));

        let mut rest = recorder.finish(wall(1_700_000_501));
        let next = rest.remove(0).unwrap();
        assert!(next.file_path.ends_with("audio_1700000500.wav"));
        assert_eq!(next.rows, 6);
        assert_eq!(fs::metadata(&next.file_path).unwrap().len(), 44 + 12);
    }

    #[test]
    fn discard_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let (recorder, _producer) =
            RawAudioRecorder::open(dir.path().to_path_buf(), 8_000, Duration::from_secs(10), Instant::now(), wall(1))
                .unwrap();

        recorder.discard();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
