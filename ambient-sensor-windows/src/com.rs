use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use ambient_sensor_core::models::error::SensorError;

/// COM apartment for the current thread, released on drop.
pub(crate) struct ComScope;

impl ComScope {
    pub(crate) fn enter() -> Result<Self, SensorError> {
        unsafe {
            CoInitializeEx(None, COINIT_MULTITHREADED)
                .ok()
                .map_err(|e| SensorError::HardwareStartFailure(format!("CoInitializeEx failed: {}", e)))?;
        }
        Ok(Self)
    }
}

impl Drop for ComScope {
    fn drop(&mut self) {
        unsafe {
            CoUninitialize();
        }
    }
}

/// Resolve a capture endpoint by id, or the default console capture endpoint.
///
/// Returns `None` when no such endpoint is active.
pub(crate) unsafe fn capture_endpoint(device_id: Option<&str>) -> Result<Option<IMMDevice>, SensorError> {
    let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
        .map_err(|e| SensorError::HardwareStartFailure(format!("failed to create enumerator: {}", e)))?;

    let device = match device_id {
        Some(id) => {
            let wide_id: Vec<u16> = id.encode_utf16().chain(std::iter::once(0)).collect();
            enumerator.GetDevice(windows::core::PCWSTR(wide_id.as_ptr())).ok()
        }
        None => enumerator.GetDefaultAudioEndpoint(eCapture, eConsole).ok(),
    };
    Ok(device)
}
