//! Capture endpoint enumeration via the MMDevice API.

use windows::Win32::Devices::FunctionDiscovery::*;
use windows::Win32::Foundation::PROPERTYKEY;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::StructuredStorage::{PropVariantClear, PROPVARIANT};
use windows::Win32::System::Com::*;
use windows::Win32::System::Variant::VT_LPWSTR;
use windows::Win32::UI::Shell::PropertiesSystem::IPropertyStore;

use ambient_sensor_core::models::audio_models::{AudioTransportType, InputDevice};
use ambient_sensor_core::models::error::SensorError;

/// Lists microphones a [`WasapiInput`](crate::WasapiInput) can open.
///
/// Requires COM to be initialized on the calling thread.
pub struct DeviceEnumerator {
    enumerator: IMMDeviceEnumerator,
}

impl DeviceEnumerator {
    pub fn new() -> Result<Self, SensorError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                .map_err(|e| SensorError::HardwareStartFailure(format!("failed to create enumerator: {}", e)))?;
            Ok(Self { enumerator })
        }
    }

    /// Active capture endpoints, default first if present.
    pub fn list_input_devices(&self) -> Result<Vec<InputDevice>, SensorError> {
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(eCapture, DEVICE_STATE_ACTIVE)
                .map_err(|e| SensorError::HardwareStartFailure(format!("EnumAudioEndpoints failed: {}", e)))?;
            let count = collection
                .GetCount()
                .map_err(|e| SensorError::HardwareStartFailure(format!("GetCount failed: {}", e)))?;

            let default_id = self.default_input_device_id().ok();
            let mut devices = Vec::with_capacity(count as usize);

            for i in 0..count {
                let Ok(device) = collection.Item(i) else {
                    continue;
                };
                let Some(id) = device.GetId().ok().and_then(|id| id.to_string().ok()) else {
                    continue;
                };
                let store = device.OpenPropertyStore(STGM_READ).ok();
                let name = store
                    .as_ref()
                    .and_then(|s| read_string(s, &PKEY_Device_FriendlyName))
                    .unwrap_or_else(|| format!("Microphone {}", i));
                let transport = store
                    .as_ref()
                    .and_then(|s| read_string(s, &PKEY_Device_EnumeratorName))
                    .map(|name| transport_from_enumerator(&name))
                    .unwrap_or(AudioTransportType::Unknown);

                devices.push(InputDevice {
                    is_default: default_id.as_deref() == Some(id.as_str()),
                    id,
                    name,
                    transport_type: Some(transport),
                });
            }

            devices.sort_by_key(|d| !d.is_default);
            Ok(devices)
        }
    }

    pub fn default_input_device_id(&self) -> Result<String, SensorError> {
        unsafe {
            let device = self
                .enumerator
                .GetDefaultAudioEndpoint(eCapture, eConsole)
                .map_err(|_| SensorError::NoInputChannels)?;
            let id = device
                .GetId()
                .map_err(|e| SensorError::HardwareStartFailure(format!("GetId failed: {}", e)))?;
            Ok(id.to_string().unwrap_or_default())
        }
    }
}

unsafe fn read_string(store: &IPropertyStore, key: &PROPERTYKEY) -> Option<String> {
    let mut value: PROPVARIANT = store.GetValue(key).ok()?;
    let text = if value.Anonymous.Anonymous.vt == VT_LPWSTR {
        let pwsz = value.Anonymous.Anonymous.Anonymous.pwszVal;
        if pwsz.is_null() {
            None
        } else {
            pwsz.to_string().ok()
        }
    } else {
        None
    };
    let _ = PropVariantClear(&mut value);
    text
}

fn transport_from_enumerator(enumerator_name: &str) -> AudioTransportType {
    if enumerator_name.contains("BTHLEENUM") {
        AudioTransportType::BluetoothLE
    } else if enumerator_name.contains("BTHENUM") {
        AudioTransportType::Bluetooth
    } else if enumerator_name.contains("USB") {
        AudioTransportType::Usb
    } else {
        AudioTransportType::BuiltIn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_enumerator_names_to_transport() {
        assert_eq!(transport_from_enumerator("BTHENUM"), AudioTransportType::Bluetooth);
        assert_eq!(transport_from_enumerator("BTHLEENUM"), AudioTransportType::BluetoothLE);
        assert_eq!(transport_from_enumerator("USB"), AudioTransportType::Usb);
        assert_eq!(transport_from_enumerator("HDAUDIO"), AudioTransportType::BuiltIn);
    }
}
