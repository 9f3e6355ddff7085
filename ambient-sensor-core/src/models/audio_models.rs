use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One loudness measurement produced from a single tap buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecibelSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl DecibelSample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }

    /// Milliseconds since the Unix epoch, as written to the `timestamp` column.
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// Format reported by the input hardware before a tap is installed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputFormat {
    pub sample_rate: f64,
    pub channels: u16,
}

impl InputFormat {
    /// Format reported when no input route is available.
    pub fn unavailable() -> Self {
        Self {
            sample_rate: 0.0,
            channels: 0,
        }
    }

    pub fn has_channels(&self) -> bool {
        self.channels > 0
    }
}

/// Transport type for an input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioTransportType {
    BuiltIn,
    Bluetooth,
    BluetoothLE,
    Usb,
    Virtual,
    Unknown,
}

/// An input device available for capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    pub id: String,
    pub name: String,
    pub is_default: bool,
    pub transport_type: Option<AudioTransportType>,
}

/// Which sensor stream a segment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SensorStream {
    Ambient,
    RawAudio,
}

impl SensorStream {
    /// Prefix used in segment file names.
    pub fn file_prefix(&self) -> &'static str {
        match self {
            Self::Ambient => "ambient",
            Self::RawAudio => "audio",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            Self::Ambient => "csv",
            Self::RawAudio => "wav",
        }
    }
}

/// A finished, flushed segment ready for transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedSegment {
    pub stream: SensorStream,
    pub file_path: PathBuf,
    /// Data rows for ambient segments, PCM frames for raw audio segments.
    pub rows: u64,
    /// SHA-256 hex digest of the file contents at close time.
    pub checksum: String,
}

/// Counters for debugging a capture session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorDiagnostics {
    pub readings_received: u64,
    pub rows_written: u64,
    pub rows_dropped: u64,
    pub readings_dropped: u64,
    pub raw_frames_written: u64,
    pub raw_samples_dropped: u64,
    pub segments_handed_off: u64,
    /// Segments that could not be finalized. Their files stay on disk and
    /// are not handed off.
    pub segments_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sample_serializes_for_display_clients() {
        let sample = DecibelSample::new(Utc.timestamp_millis_opt(1_700_000_000_123).unwrap(), -42.5);
        let json = serde_json::to_value(sample).unwrap();

        assert_eq!(json["value"], -42.5);
        assert_eq!(json["timestamp"], "2023-11-14T22:13:20.123Z");
        assert_eq!(sample.timestamp_millis(), 1_700_000_000_123);
    }

    #[test]
    fn diagnostics_use_camel_case_keys() {
        let diagnostics = SensorDiagnostics {
            rows_written: 3,
            ..Default::default()
        };
        let json = serde_json::to_value(&diagnostics).unwrap();
        assert_eq!(json["rowsWritten"], 3);
        assert_eq!(json["segmentsHandedOff"], 0);
        assert_eq!(json["segmentsFailed"], 0);
    }

    #[test]
    fn stream_file_naming() {
        assert_eq!(SensorStream::Ambient.file_prefix(), "ambient");
        assert_eq!(SensorStream::RawAudio.file_extension(), "wav");
        assert!(!InputFormat::unavailable().has_channels());
    }
}
