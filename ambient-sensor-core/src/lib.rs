//! # ambient-sensor-core
//!
//! Platform-agnostic ambient noise sensor.
//!
//! Measures microphone loudness once per tap buffer, logs each reading as a
//! `timestamp,db,label` row into time-rotated CSV segments, keeps the last
//! 100 readings for display, and survives audio session interruptions.
//! Platform backends (Windows WASAPI) implement [`InputProvider`] and
//! [`AudioSessionHost`] and plug into the generic [`Controller`].
//!
//! ## Architecture
//!
//! ```text
//! ambient-sensor-core (this crate)
//! ├── traits/       ← InputProvider, AudioSessionHost, TransferHandoff, Notifier, SensorDelegate
//! ├── models/       ← SensorError, SensorConfig, CaptureSessionState, DecibelSample, Notification
//! ├── processing/   ← RMS/dB conversion, FFT magnitudes, RollingDisplayBuffer, WAV header
//! ├── session/      ← AudioSession guard, RecoveryStateMachine
//! ├── storage/      ← SegmentSink (CSV), WavSegmentWriter, SHA-256 checksums
//! └── engine/       ← realtime tap, Controller (control context), CaptureEngine (threaded)
//! ```
//!
//! ## Threads
//!
//! The realtime tap only computes a decibel scalar and pushes it into a
//! bounded channel. File writes, rotation, display updates and lifecycle
//! transitions all happen in the control context.

pub mod engine;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use engine::capture_engine::CaptureEngine;
pub use engine::clock::{Clock, ManualClock, SystemClock};
pub use engine::controller::{Controller, SensorServices, SessionSignal};
pub use models::audio_models::{
    AudioTransportType, ClosedSegment, DecibelSample, InputDevice, InputFormat, SensorDiagnostics, SensorStream,
};
pub use models::config::SensorConfig;
pub use models::error::SensorError;
pub use models::notification::{Notification, NotificationKind};
pub use models::state::CaptureSessionState;
pub use processing::display_buffer::RollingDisplayBuffer;
pub use processing::signal::{decibels, magnitude_spectrum, rms};
pub use session::audio_session::AudioSession;
pub use session::recovery::{Effect, LifecycleEvent, RecoveryStateMachine};
pub use storage::segment_sink::SegmentSink;
pub use traits::collaborators::{Notifier, TransferHandoff};
pub use traits::input_provider::{InputLostCallback, InputProvider, TapCallback};
pub use traits::sensor_delegate::SensorDelegate;
pub use traits::session_host::{AudioSessionHost, PermissionCallback};
