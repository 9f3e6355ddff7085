//! WASAPI microphone input provider.
//!
//! Opens a capture endpoint in shared mode and drives the tap from a
//! dedicated thread registered with MMCSS. Shared mode delivers Float32
//! interleaved samples at the endpoint's mix format.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use windows::core::PCWSTR;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;
use windows::Win32::System::Threading::*;

use ambient_sensor_core::models::audio_models::{AudioTransportType, InputDevice, InputFormat};
use ambient_sensor_core::models::error::SensorError;
use ambient_sensor_core::traits::input_provider::{InputLostCallback, InputProvider, TapCallback};

use crate::com::{capture_endpoint, ComScope};
use crate::silence::feed_silence;

/// Shared-mode buffer duration in 100-nanosecond units (100 ms).
const BUFFER_DURATION: i64 = 1_000_000;

/// Polling period of the capture thread.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// WASAPI capture endpoint as an [`InputProvider`].
pub struct WasapiInput {
    device_id: Option<String>,
    device_name: String,
    is_default: bool,
    transport_type: Option<AudioTransportType>,
    running: Arc<AtomicBool>,
    capture_handle: Option<thread::JoinHandle<()>>,
}

impl WasapiInput {
    /// Follow the system default microphone.
    pub fn default_device() -> Self {
        Self {
            device_id: None,
            device_name: "Default Microphone".into(),
            is_default: true,
            transport_type: None,
            running: Arc::new(AtomicBool::new(false)),
            capture_handle: None,
        }
    }

    /// Capture from a specific endpoint, e.g. one returned by `DeviceEnumerator`.
    pub fn with_device(device: InputDevice) -> Self {
        Self {
            device_id: Some(device.id),
            device_name: device.name,
            is_default: device.is_default,
            transport_type: device.transport_type,
            running: Arc::new(AtomicBool::new(false)),
            capture_handle: None,
        }
    }
}

impl InputProvider for WasapiInput {
    fn input_format(&self) -> Result<InputFormat, SensorError> {
        let _com = ComScope::enter()?;
        unsafe {
            let Some(device) = capture_endpoint(self.device_id.as_deref())? else {
                return Ok(InputFormat::unavailable());
            };
            let audio_client: IAudioClient = match device.Activate(CLSCTX_ALL, None) {
                Ok(client) => client,
                Err(e) => {
                    log::warn!("Capture endpoint cannot be activated: {}", e);
                    return Ok(InputFormat::unavailable());
                }
            };
            let mix_format_ptr = audio_client
                .GetMixFormat()
                .map_err(|e| SensorError::HardwareStartFailure(format!("GetMixFormat failed: {}", e)))?;
            let mix_format = &*mix_format_ptr;
            let format = InputFormat {
                sample_rate: mix_format.nSamplesPerSec as f64,
                channels: mix_format.nChannels,
            };
            CoTaskMemFree(Some(mix_format_ptr as *const _ as *const _));
            Ok(format)
        }
    }

    fn start(&mut self, tap: TapCallback, on_lost: InputLostCallback) -> Result<(), SensorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(SensorError::HardwareStartFailure("input already running".into()));
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let device_id = self.device_id.clone();
        let (started_tx, started_rx) = crossbeam_channel::bounded(1);

        let handle = thread::Builder::new()
            .name("wasapi-input".into())
            .spawn(move || {
                let opened = ComScope::enter().and_then(|com| {
                    let stream = unsafe { CaptureStream::open(device_id.as_deref())? };
                    Ok((com, stream))
                });
                let (_com, mut stream) = match opened {
                    Ok(opened) => opened,
                    Err(e) => {
                        running.store(false, Ordering::SeqCst);
                        let _ = started_tx.send(Err(e));
                        return;
                    }
                };
                let _ = started_tx.send(Ok(()));

                let mut tap = tap;
                let result = unsafe { stream.pump(&running, &mut tap) };
                drop(stream);

                // Still flagged as running means nobody asked us to stop.
                let lost = running.swap(false, Ordering::SeqCst);
                match result {
                    Err(e) if lost => {
                        log::error!("WASAPI input lost: {}", e);
                        on_lost(e);
                    }
                    Err(e) => log::warn!("WASAPI input error while stopping: {}", e),
                    Ok(()) => {}
                }
                log::info!("WASAPI input stopped");
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                SensorError::HardwareStartFailure(format!("failed to spawn input thread: {}", e))
            })?;

        let started = started_rx
            .recv()
            .unwrap_or_else(|_| Err(SensorError::HardwareStartFailure("input thread exited".into())));
        if started.is_err() {
            self.running.store(false, Ordering::SeqCst);
            let _ = handle.join();
            return started;
        }

        self.capture_handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SensorError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.capture_handle.take() {
            if handle.join().is_err() {
                log::error!("WASAPI input thread panicked");
            }
        }
        Ok(())
    }

    fn device_info(&self) -> InputDevice {
        InputDevice {
            id: self.device_id.clone().unwrap_or_else(|| "default-input".into()),
            name: self.device_name.clone(),
            is_default: self.is_default,
            transport_type: self.transport_type,
        }
    }
}

impl Drop for WasapiInput {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// A started shared-mode capture stream. Stopped on drop.
struct CaptureStream {
    audio_client: IAudioClient,
    capture_client: IAudioCaptureClient,
    sample_rate: f64,
    channels: u16,
    silence: Vec<f32>,
}

impl CaptureStream {
    /// Resolve the endpoint, initialize `IAudioClient` in shared mode,
    /// register with MMCSS and start the stream.
    ///
    /// Requires COM on the calling thread.
    unsafe fn open(device_id: Option<&str>) -> Result<Self, SensorError> {
        let device = capture_endpoint(device_id)?.ok_or(SensorError::NoInputChannels)?;

        let audio_client: IAudioClient = device
            .Activate(CLSCTX_ALL, None)
            .map_err(|e| SensorError::HardwareStartFailure(format!("Activate failed: {}", e)))?;

        let mix_format_ptr = audio_client
            .GetMixFormat()
            .map_err(|e| SensorError::HardwareStartFailure(format!("GetMixFormat failed: {}", e)))?;
        let mix_format = &*mix_format_ptr;
        let sample_rate = mix_format.nSamplesPerSec as f64;
        let channels = mix_format.nChannels;

        let initialized = audio_client.Initialize(
            AUDCLNT_SHAREMODE_SHARED,
            AUDCLNT_STREAMFLAGS_NOPERSIST,
            BUFFER_DURATION,
            0,
            mix_format,
            None,
        );
        CoTaskMemFree(Some(mix_format_ptr as *const _ as *const _));
        initialized
            .map_err(|e| SensorError::HardwareStartFailure(format!("IAudioClient::Initialize failed: {}", e)))?;

        // No packet is larger than the endpoint buffer.
        let buffer_frames = audio_client
            .GetBufferSize()
            .map_err(|e| SensorError::HardwareStartFailure(format!("GetBufferSize failed: {}", e)))?;

        let capture_client: IAudioCaptureClient = audio_client
            .GetService()
            .map_err(|e| SensorError::HardwareStartFailure(format!("GetService failed: {}", e)))?;

        let mut task_index: u32 = 0;
        let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
        let _mmcss_handle = AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index);

        audio_client
            .Start()
            .map_err(|e| SensorError::HardwareStartFailure(format!("IAudioClient::Start failed: {}", e)))?;
        log::info!(
            "WASAPI input running ({} Hz, {} ch, {} frame buffer)",
            sample_rate,
            channels,
            buffer_frames
        );

        Ok(Self {
            audio_client,
            capture_client,
            sample_rate,
            channels,
            silence: vec![0.0; buffer_frames.max(1) as usize * channels.max(1) as usize],
        })
    }

    /// Poll packets into `tap` until `running` clears or the endpoint fails.
    unsafe fn pump(&mut self, running: &AtomicBool, tap: &mut TapCallback) -> Result<(), SensorError> {
        let sample_rate = self.sample_rate;
        let channels = self.channels;

        while running.load(Ordering::SeqCst) {
            thread::sleep(POLL_INTERVAL);

            let mut packet_length = self
                .capture_client
                .GetNextPacketSize()
                .map_err(|e| SensorError::HardwareStartFailure(format!("GetNextPacketSize failed: {}", e)))?;

            while packet_length > 0 {
                let mut buffer_ptr: *mut u8 = std::ptr::null_mut();
                let mut num_frames: u32 = 0;
                let mut flags: u32 = 0;

                self.capture_client
                    .GetBuffer(&mut buffer_ptr, &mut num_frames, &mut flags, None, None)
                    .map_err(|e| SensorError::HardwareStartFailure(format!("GetBuffer failed: {}", e)))?;

                if num_frames > 0 && !buffer_ptr.is_null() {
                    let total_samples = num_frames as usize * channels as usize;
                    if flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 {
                        feed_silence(&self.silence, total_samples, |chunk| tap(chunk, sample_rate, channels));
                    } else {
                        let samples = std::slice::from_raw_parts(buffer_ptr as *const f32, total_samples);
                        tap(samples, sample_rate, channels);
                    }
                }

                self.capture_client
                    .ReleaseBuffer(num_frames)
                    .map_err(|e| SensorError::HardwareStartFailure(format!("ReleaseBuffer failed: {}", e)))?;

                packet_length = self
                    .capture_client
                    .GetNextPacketSize()
                    .map_err(|e| SensorError::HardwareStartFailure(format!("GetNextPacketSize failed: {}", e)))?;
            }
        }
        Ok(())
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        unsafe {
            let _ = self.audio_client.Stop();
        }
    }
}
