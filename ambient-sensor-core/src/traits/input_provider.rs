use crate::models::audio_models::{InputDevice, InputFormat};
use crate::models::error::SensorError;

/// Tap callback invoked once per delivered audio buffer.
///
/// Parameters:
/// - `samples`: Interleaved f32 samples.
/// - `sample_rate`: The actual sample rate of the delivered audio.
/// - `channels`: Number of interleaved channels.
///
/// Runs on the realtime audio thread: the callback must not block, lock,
/// log, or grow containers.
pub type TapCallback = Box<dyn FnMut(&[f32], f64, u16) + Send + 'static>;

/// Invoked at most once when a started input stops delivering buffers on
/// its own, e.g. the endpoint was unplugged or reconfigured.
///
/// Never called for a failure that `start` itself returns, nor after `stop`.
pub type InputLostCallback = Box<dyn FnOnce(SensorError) + Send + 'static>;

/// Interface for platform-specific audio input hardware.
///
/// Implemented by:
/// - `WasapiInput` (Windows)
pub trait InputProvider: Send {
    /// Format the input route currently reports. Zero channels means the
    /// route is unusable and capture must not start.
    fn input_format(&self) -> Result<InputFormat, SensorError>;

    /// Install `tap` and start delivering buffers to it. `on_lost` reports
    /// a later failure of the running stream.
    fn start(&mut self, tap: TapCallback, on_lost: InputLostCallback) -> Result<(), SensorError>;

    /// Remove the tap and stop the hardware. Once this returns the tap is
    /// never invoked again. Calling it when stopped is a no-op.
    fn stop(&mut self) -> Result<(), SensorError>;

    /// Information about the device backing this provider.
    fn device_info(&self) -> InputDevice;
}
