use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::engine::controller::{Command, Controller, SensorServices, SessionSignal, SharedStatus};
use crate::models::audio_models::{DecibelSample, SensorDiagnostics};
use crate::models::config::SensorConfig;
use crate::models::error::SensorError;
use crate::models::state::CaptureSessionState;
use crate::processing::display_buffer::RollingDisplayBuffer;
use crate::session::audio_session::AudioSession;
use crate::traits::input_provider::InputProvider;

/// Name of the thread that runs the control context.
pub const CONTROL_THREAD_NAME: &str = "ambient-control";

/// Handle to a [`Controller`] running on its own thread.
///
/// Every method posts a command and, except [`set_label`](Self::set_label),
/// waits until the control context has processed it. Do not call the
/// blocking methods from a [`SensorDelegate`](crate::SensorDelegate)
/// callback: those run on the control thread itself.
///
/// Dropping the handle stops capture and joins the thread. Use
/// [`shutdown`](Self::shutdown) to also release the process audio session.
pub struct CaptureEngine {
    id: Uuid,
    commands: Sender<Command>,
    status: Arc<Mutex<SharedStatus>>,
    display: Arc<Mutex<RollingDisplayBuffer>>,
    session: Arc<AudioSession>,
    worker: Option<JoinHandle<()>>,
}

impl CaptureEngine {
    /// Spawn the control context for `provider`.
    pub fn spawn<P>(provider: P, services: SensorServices) -> Result<Self, SensorError>
    where
        P: InputProvider + 'static,
    {
        let session = Arc::clone(&services.session);
        let controller = Controller::new(provider, services);
        let id = controller.id();
        let commands = controller.sender();
        let status = controller.status_handle();
        let display = controller.display_handle();

        let worker = thread::Builder::new()
            .name(CONTROL_THREAD_NAME.into())
            .spawn(move || controller.run())
            .map_err(|e| SensorError::HardwareStartFailure(format!("failed to spawn control thread: {}", e)))?;

        Ok(Self {
            id,
            commands,
            status,
            display,
            session,
            worker: Some(worker),
        })
    }

    /// Start both configured sensors.
    ///
    /// Fails synchronously with `NoInputChannels` when the route has no
    /// input; the reboot notification has been scheduled by then.
    pub fn start(&self, config: SensorConfig) -> Result<(), SensorError> {
        config.validate()?;
        let (reply, response) = crossbeam_channel::bounded(1);
        self.send(Command::Start { config, reply })?;
        response.recv().map_err(|_| SensorError::EngineUnavailable)?
    }

    /// Stop capture and hand off every open segment. Safe in any state.
    pub fn stop(&self) -> Result<(), SensorError> {
        let (reply, response) = crossbeam_channel::bounded(1);
        self.send(Command::Stop { reply })?;
        response.recv().map_err(|_| SensorError::EngineUnavailable)
    }

    /// Deliver a platform session signal and wait until it has been applied.
    pub fn signal(&self, signal: SessionSignal) -> Result<(), SensorError> {
        let (reply, response) = crossbeam_channel::bounded(1);
        self.send(Command::Signal { signal, reply })?;
        response.recv().map_err(|_| SensorError::EngineUnavailable)
    }

    pub fn begin_interruption(&self) -> Result<(), SensorError> {
        self.signal(SessionSignal::BeginInterruption)
    }

    pub fn end_interruption(&self) -> Result<(), SensorError> {
        self.signal(SessionSignal::EndInterruption)
    }

    pub fn zero_channels_detected(&self) -> Result<(), SensorError> {
        self.signal(SessionSignal::ZeroChannelsDetected)
    }

    /// Set the label written with subsequent ambient rows.
    pub fn set_label(&self, label: impl Into<String>) -> Result<(), SensorError> {
        self.send(Command::SetLabel(label.into()))
    }

    /// Identity this engine holds the audio session under.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> CaptureSessionState {
        self.status.lock().state
    }

    /// Up to the last 100 decibel samples, oldest first.
    pub fn decibels(&self) -> Vec<DecibelSample> {
        self.display.lock().snapshot()
    }

    pub fn diagnostics(&self) -> SensorDiagnostics {
        self.status.lock().diagnostics.clone()
    }

    /// Stop capture, join the control thread and deactivate the audio
    /// session unless another engine holds it.
    pub fn shutdown(mut self) -> Result<(), SensorError> {
        self.join();
        self.session.teardown(self.id)
    }

    fn send(&self, command: Command) -> Result<(), SensorError> {
        self.commands.send(command).map_err(|_| SensorError::EngineUnavailable)
    }

    fn join(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let (reply, response) = crossbeam_channel::bounded(1);
        if self.commands.send(Command::Shutdown { reply }).is_ok() {
            let _ = response.recv();
        }
        if worker.join().is_err() {
            log::error!("Control thread panicked");
        }
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        self.join();
    }
}
