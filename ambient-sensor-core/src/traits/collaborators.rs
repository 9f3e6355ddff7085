use std::path::Path;

use crate::models::notification::Notification;

/// Uploads or queues finished segment files.
///
/// Called exactly once per closed segment, after the file is fully flushed.
pub trait TransferHandoff: Send + Sync {
    fn transfer(&self, file_path: &Path, debug: bool);
}

/// Delivers user-facing alerts.
pub trait Notifier: Send + Sync {
    /// Register a notification category. Called at most once per category.
    fn register_category(&self, category: &str);

    /// Schedule `notification` for delivery after its delay. Fire-and-forget.
    fn schedule(&self, notification: &Notification);
}
