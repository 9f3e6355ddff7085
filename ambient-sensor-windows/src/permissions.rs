//! Windows microphone privacy check.
//!
//! On Windows 10 1803+, microphone access is controlled by Settings >
//! Privacy > Microphone. Unpackaged desktop apps get no consent dialog, so
//! the only way to learn the answer is to try to open the endpoint.

use windows::Win32::Foundation::E_ACCESSDENIED;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use ambient_sensor_core::models::error::SensorError;

use crate::com::{capture_endpoint, ComScope};

/// Whether the default capture endpoint can be opened.
///
/// `Ok(false)` when there is no endpoint, access is denied in the privacy
/// settings, or the device is held exclusively by another process.
pub fn check_microphone_permission() -> Result<bool, SensorError> {
    let _com = ComScope::enter()?;
    unsafe {
        let Some(device) = capture_endpoint(None)? else {
            return Ok(false);
        };

        let result: windows::core::Result<IAudioClient> = device.Activate(CLSCTX_ALL, None);
        match result {
            Ok(_) => Ok(true),
            Err(e) if e.code() == E_ACCESSDENIED || e.code() == AUDCLNT_E_DEVICE_IN_USE => Ok(false),
            Err(e) => {
                log::warn!("Unexpected error checking microphone permission: {}", e);
                Ok(true)
            }
        }
    }
}
