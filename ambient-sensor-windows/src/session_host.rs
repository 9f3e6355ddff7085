use std::thread;

use ambient_sensor_core::models::error::SensorError;
use ambient_sensor_core::traits::session_host::{AudioSessionHost, PermissionCallback};

use crate::permission_relay::answer_on_worker;
use crate::permissions::check_microphone_permission;

/// Session host for Windows desktop processes.
///
/// Shared-mode WASAPI has no process-wide session category, so activation
/// only verifies that the microphone can be opened. The permission check
/// runs on a short-lived worker thread and answers asynchronously.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsSessionHost;

impl AudioSessionHost for WindowsSessionHost {
    fn request_record_permission(&self, on_result: PermissionCallback) {
        answer_on_worker(
            |job| thread::Builder::new().name("mic-permission".into()).spawn(job).map(|_| ()),
            || {
                check_microphone_permission().unwrap_or_else(|e| {
                    log::warn!("Microphone permission check failed: {}", e);
                    false
                })
            },
            on_result,
        );
    }

    fn activate_session(&self) -> Result<(), SensorError> {
        match check_microphone_permission() {
            Ok(true) => Ok(()),
            Ok(false) => Err(SensorError::SessionActivationFailure(
                "microphone is unavailable or blocked by privacy settings".into(),
            )),
            Err(e) => Err(SensorError::SessionActivationFailure(e.to_string())),
        }
    }

    fn deactivate_session(&self) -> Result<(), SensorError> {
        log::debug!("Audio session released");
        Ok(())
    }
}
