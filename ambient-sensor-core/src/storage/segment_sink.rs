use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::models::audio_models::{ClosedSegment, DecibelSample, SensorStream};
use crate::models::error::SensorError;
use crate::storage::checksum::sha256_file;

/// Header row of every ambient segment.
pub const AMBIENT_HEADER: [&str; 3] = ["timestamp", "db", "label"];

/// Field delimiter used in segment rows.
pub const FIELD_SEPARATOR: char = ',';

/// One open log segment: a header row followed by one row per sample.
///
/// Owns exclusive write access to its file. At most one sink per sensor
/// stream is open at a time; the control context closes it on rotation,
/// stop, or interruption and hands the returned path to the transfer layer.
///
/// ## File Format
/// ```text
/// timestamp,db,label
/// 1700000000123,-42.7,
/// 1700000000293,-41.9,kitchen
/// ```
pub struct SegmentSink {
    stream: SensorStream,
    file_path: PathBuf,
    field_count: usize,
    writer: Option<BufWriter<File>>,
    rows: u64,
    closed: Option<ClosedSegment>,
}

impl SegmentSink {
    /// Create a new segment file in `directory` and write the header row once.
    ///
    /// The file name embeds `created_at` as epoch seconds.
    pub fn open(
        directory: &Path,
        stream: SensorStream,
        header: &[&str],
        created_at: DateTime<Utc>,
    ) -> Result<Self, SensorError> {
        let (file_path, file) = create_segment_file(directory, stream, created_at)?;

        let mut sink = Self {
            stream,
            file_path,
            field_count: header.len(),
            writer: Some(BufWriter::new(file)),
            rows: 0,
            closed: None,
        };
        sink.write_row(header)?;
        Ok(sink)
    }

    /// Open an ambient segment with the `timestamp,db,label` header.
    pub fn open_ambient(directory: &Path, created_at: DateTime<Utc>) -> Result<Self, SensorError> {
        Self::open(directory, SensorStream::Ambient, &AMBIENT_HEADER, created_at)
    }

    /// Write one data row.
    ///
    /// Fails with `SegmentWriteFailure` if the sink is closed, the field count
    /// does not match the header, or the write fails.
    pub fn append<S: AsRef<str>>(&mut self, row: &[S]) -> Result<(), SensorError> {
        if self.writer.is_none() {
            return Err(SensorError::SegmentWriteFailure("segment is closed".into()));
        }
        if row.len() != self.field_count {
            return Err(SensorError::SegmentWriteFailure(format!(
                "expected {} fields, got {}",
                self.field_count,
                row.len()
            )));
        }
        self.write_row(row)?;
        self.rows += 1;
        Ok(())
    }

    /// Append an ambient row `{timestampMillis, db, label}`.
    pub fn append_sample(&mut self, sample: &DecibelSample, label: &str) -> Result<(), SensorError> {
        let timestamp = sample.timestamp_millis().to_string();
        let db = sample.value.to_string();
        self.append(&[timestamp.as_str(), db.as_str(), label])
    }

    /// Flush and release the file handle, returning the finished segment.
    ///
    /// Closing an already closed sink returns the same segment again.
    pub fn close(&mut self) -> Result<ClosedSegment, SensorError> {
        if let Some(closed) = &self.closed {
            return Ok(closed.clone());
        }

        let flushed = match self.writer.take() {
            Some(mut writer) => writer.flush(),
            None => Ok(()),
        };

        let checksum = sha256_file(&self.file_path).unwrap_or_default();
        let closed = ClosedSegment {
            stream: self.stream,
            file_path: self.file_path.clone(),
            rows: self.rows,
            checksum,
        };
        self.closed = Some(closed.clone());

        flushed.map_err(|e| SensorError::SegmentWriteFailure(format!("flush failed: {}", e)))?;
        Ok(closed)
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Data rows appended so far (header excluded).
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    pub fn stream(&self) -> SensorStream {
        self.stream
    }

    /// Close and delete the file without handing it off.
    pub fn discard(mut self) {
        self.writer = None;
        if let Err(e) = fs::remove_file(&self.file_path) {
            log::warn!("Failed to remove unused segment {:?}: {}", self.file_path, e);
        }
    }

    fn write_row<S: AsRef<str>>(&mut self, fields: &[S]) -> Result<(), SensorError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| SensorError::SegmentWriteFailure("segment is closed".into()))?;

        let mut line = String::new();
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                line.push(FIELD_SEPARATOR);
            }
            push_field(&mut line, field.as_ref());
        }
        line.push('\n');

        writer
            .write_all(line.as_bytes())
            .map_err(|e| SensorError::SegmentWriteFailure(format!("write failed: {}", e)))
    }
}

impl Drop for SegmentSink {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                log::warn!("Failed to flush dropped segment {:?}: {}", self.file_path, e);
            }
        }
    }
}

/// Create `<prefix>_<epoch>.<ext>` in `directory`, adding `_<n>` if the name is taken.
pub(crate) fn create_segment_file(
    directory: &Path,
    stream: SensorStream,
    created_at: DateTime<Utc>,
) -> Result<(PathBuf, File), SensorError> {
    fs::create_dir_all(directory)
        .map_err(|e| SensorError::SegmentWriteFailure(format!("failed to create directory: {}", e)))?;

    let stem = format!("{}_{}", stream.file_prefix(), created_at.timestamp());
    let ext = stream.file_extension();

    for attempt in 0u32.. {
        let name = if attempt == 0 {
            format!("{}.{}", stem, ext)
        } else {
            format!("{}_{}.{}", stem, attempt, ext)
        };
        let path = directory.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(SensorError::SegmentWriteFailure(format!(
                    "failed to create file: {}",
                    e
                )))
            }
        }
    }
    unreachable!("segment name attempts exhausted")
}

fn push_field(line: &mut String, field: &str) {
    let needs_quotes = field.contains(FIELD_SEPARATOR) || field.contains('"') || field.contains('\n');
    if !needs_quotes {
        line.push_str(field);
        return;
    }
    line.push('"');
    for c in field.chars() {
        if c == '"' {
            line.push('"');
        }
        line.push(c);
    }
    line.push('"');
}
