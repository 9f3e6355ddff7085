use thiserror::Error;

/// Errors surfaced by the ambient sensor pipeline.
///
/// Structural conditions (`PermissionDenied`, `NoInputChannels`,
/// `SessionActivationFailure`, `HardwareStartFailure`) refuse a start.
/// `SegmentWriteFailure` is absorbed per sample by the control context.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SensorError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("input device reports no usable channels")]
    NoInputChannels,

    #[error("audio session activation failed: {0}")]
    SessionActivationFailure(String),

    #[error("segment write failed: {0}")]
    SegmentWriteFailure(String),

    #[error("hardware start failed: {0}")]
    HardwareStartFailure(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("audio session is held by another engine")]
    SessionBusy,

    #[error("capture engine control context is not running")]
    EngineUnavailable,
}

impl SensorError {
    /// Whether the condition is absorbed locally instead of refusing capture.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SegmentWriteFailure(_))
    }
}

impl From<std::io::Error> for SensorError {
    fn from(e: std::io::Error) -> Self {
        Self::SegmentWriteFailure(e.to_string())
    }
}
