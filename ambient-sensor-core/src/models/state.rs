use std::fmt;

use serde::Serialize;

/// Capture session state machine.
///
/// State transitions:
/// ```text
/// idle → starting → running ⇄ interrupted
///          ↓           ↓          ↓
///         idle      degraded ← ───┘   (zero input channels)
/// ```
/// `Degraded` is left only through an explicit `stop` or `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureSessionState {
    #[default]
    Idle,
    Starting,
    Running,
    Interrupted,
    Degraded,
}

impl CaptureSessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Interrupted => "interrupted",
            Self::Degraded => "degraded",
        }
    }
}

impl fmt::Display for CaptureSessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
