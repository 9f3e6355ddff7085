//! # ambient-sensor-windows
//!
//! Windows WASAPI backend for the ambient noise sensor.
//!
//! Provides:
//! - `WasapiInput`: microphone input via a shared-mode WASAPI capture endpoint
//! - `WindowsSessionHost`: permission check and session activation
//! - `DeviceEnumerator`: capture endpoint enumeration via MMDevice API
//!
//! ## Platform Requirements
//! - Windows 10 1803+ for the microphone privacy setting
//! - Visual Studio Build Tools 2022 + Windows SDK for linking
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use ambient_sensor_core::{AudioSession, CaptureEngine, SensorConfig, SensorServices};
//! use ambient_sensor_windows::{WasapiInput, WindowsSessionHost};
//!
//! let session = Arc::new(AudioSession::new(Arc::new(WindowsSessionHost)));
//! let services = SensorServices::new(session, transfer, notifier);
//! let engine = CaptureEngine::spawn(WasapiInput::default_device(), services)?;
//! engine.start(SensorConfig::default())?;
//! ```

#[cfg(target_os = "windows")]
mod com;
#[cfg(target_os = "windows")]
pub mod device_enumerator;
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
mod permission_relay;
#[cfg(target_os = "windows")]
pub mod permissions;
#[cfg(target_os = "windows")]
pub mod session_host;
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
mod silence;
#[cfg(target_os = "windows")]
pub mod wasapi_input;

#[cfg(target_os = "windows")]
pub use device_enumerator::DeviceEnumerator;
#[cfg(target_os = "windows")]
pub use session_host::WindowsSessionHost;
#[cfg(target_os = "windows")]
pub use wasapi_input::WasapiInput;
