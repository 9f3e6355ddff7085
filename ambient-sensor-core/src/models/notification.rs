use std::time::Duration;

/// Category every sensor notification is filed under.
pub const NOTIFICATION_CATEGORY: &str = "ambientSensor";

/// Delay before a scheduled notification is delivered.
pub const NOTIFICATION_DELAY: Duration = Duration::from_secs(3);

/// Why a user-facing alert was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// `start` found no input channels; the host process needs a relaunch.
    RebootRequired,
    /// The route vanished mid-session; sensors must be restarted by hand.
    RestartManually,
}

/// A fire-and-forget user notification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub identifier: String,
    pub kind: NotificationKind,
    pub category: &'static str,
    pub title: String,
    pub body: String,
    pub delay: Duration,
}

impl Notification {
    pub fn reboot_required() -> Self {
        Self::new(
            NotificationKind::RebootRequired,
            "Error: Please Restart!",
            "No audio input is available. Please restart the app to resume the sensors.",
        )
    }

    pub fn restart_manually() -> Self {
        Self::new(
            NotificationKind::RestartManually,
            "Error: Please Restart!",
            "The audio session was lost after an interruption. Please restart the sensors manually.",
        )
    }

    fn new(kind: NotificationKind, title: &str, body: &str) -> Self {
        Self {
            identifier: uuid::Uuid::new_v4().to_string(),
            kind,
            category: NOTIFICATION_CATEGORY,
            title: title.to_string(),
            body: body.to_string(),
            delay: NOTIFICATION_DELAY,
        }
    }
}
