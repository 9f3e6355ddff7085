use crate::models::audio_models::{ClosedSegment, DecibelSample};
use crate::models::error::SensorError;
use crate::models::state::CaptureSessionState;

/// Event delegate for sensor notifications.
///
/// All methods are called from the control context, never from the
/// realtime audio thread. Implementations should marshal to a UI thread
/// if needed.
pub trait SensorDelegate: Send + Sync {
    /// Called when the session state changes.
    fn on_state_changed(&self, state: CaptureSessionState);

    /// Called for every decibel sample appended to the display buffer.
    fn on_decibel(&self, sample: &DecibelSample);

    /// Called after a segment has been handed to the transfer layer.
    fn on_segment_closed(&self, segment: &ClosedSegment);

    /// Called when a start is refused or fails.
    fn on_error(&self, error: &SensorError);

    /// Called when an interruption begins, before capture is stopped.
    fn on_interruption_began(&self);

    /// Called when an interruption ends, before the restart is scheduled.
    fn on_interruption_ended(&self);
}
