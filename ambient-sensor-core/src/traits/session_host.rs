use crate::models::error::SensorError;

/// Receives the user's answer to a record-permission prompt.
pub type PermissionCallback = Box<dyn FnOnce(bool) + Send + 'static>;

/// Platform audio session and authorization layer.
pub trait AudioSessionHost: Send + Sync {
    /// Ask for microphone access. Must not block waiting for the user;
    /// `on_result` may be invoked later from any thread.
    fn request_record_permission(&self, on_result: PermissionCallback);

    /// Configure the process audio session for recording and activate it.
    fn activate_session(&self) -> Result<(), SensorError>;

    /// Release the process audio session.
    fn deactivate_session(&self) -> Result<(), SensorError>;
}
