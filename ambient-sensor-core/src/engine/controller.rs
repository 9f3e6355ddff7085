//! The control context.
//!
//! Everything except the realtime tap runs here, on one thread: sample
//! logging, rotation, display updates, the recovery state machine and its
//! effects. Hosts either drive a [`Controller`] from their own loop via
//! [`Controller::pump`] and [`Controller::on_tick`], or let
//! [`CaptureEngine`](super::capture_engine::CaptureEngine) run it on a
//! dedicated thread.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::engine::clock::{Clock, SystemClock};
use crate::engine::raw_audio::{RawAudioRecorder, SegmentClose};
use crate::engine::tap::{Tap, TapCounters, TapReading, READING_QUEUE_CAPACITY};
use crate::models::audio_models::{ClosedSegment, DecibelSample, SensorDiagnostics};
use crate::models::config::SensorConfig;
use crate::models::error::SensorError;
use crate::models::notification::{Notification, NOTIFICATION_CATEGORY};
use crate::models::state::CaptureSessionState;
use crate::processing::display_buffer::RollingDisplayBuffer;
use crate::processing::signal::loggable_decibels;
use crate::session::audio_session::AudioSession;
use crate::session::recovery::{Effect, LifecycleEvent, RecoveryStateMachine};
use crate::storage::segment_sink::SegmentSink;
use crate::traits::collaborators::{Notifier, TransferHandoff};
use crate::traits::input_provider::{InputLostCallback, InputProvider};
use crate::traits::sensor_delegate::SensorDelegate;

/// How often deadlines and the raw audio ring are serviced.
pub const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Session-lifecycle signals delivered by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    BeginInterruption,
    EndInterruption,
    /// The input route reports zero channels while the app is live.
    ZeroChannelsDetected,
}

/// Collaborators shared by every engine in the process.
#[derive(Clone)]
pub struct SensorServices {
    pub session: Arc<AudioSession>,
    pub transfer: Arc<dyn TransferHandoff>,
    pub notifier: Arc<dyn Notifier>,
    pub delegate: Option<Arc<dyn SensorDelegate>>,
    pub clock: Arc<dyn Clock>,
}

impl SensorServices {
    pub fn new(
        session: Arc<AudioSession>,
        transfer: Arc<dyn TransferHandoff>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            session,
            transfer,
            notifier,
            delegate: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_delegate(mut self, delegate: Arc<dyn SensorDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Requests posted into the control context.
pub(crate) enum Command {
    Start {
        config: SensorConfig,
        reply: Sender<Result<(), SensorError>>,
    },
    Stop {
        reply: Sender<()>,
    },
    Signal {
        signal: SessionSignal,
        reply: Sender<()>,
    },
    SetLabel(String),
    /// Completion of an asynchronous step, e.g. the permission prompt.
    Lifecycle(LifecycleEvent),
    /// The provider stopped delivering buffers for the capture `capture`.
    InputLost {
        capture: Uuid,
        error: SensorError,
    },
    Shutdown {
        reply: Sender<()>,
    },
}

/// State readable from outside the control context.
#[derive(Debug, Default)]
pub(crate) struct SharedStatus {
    pub(crate) state: CaptureSessionState,
    pub(crate) diagnostics: SensorDiagnostics,
}

struct ActiveCapture {
    id: Uuid,
    config: SensorConfig,
    ambient: Option<SegmentSink>,
    last_rotation: Instant,
    raw: Option<RawAudioRecorder>,
}

pub struct Controller<P: InputProvider> {
    id: Uuid,
    provider: P,
    services: SensorServices,
    machine: RecoveryStateMachine,
    commands_tx: Sender<Command>,
    commands_rx: Receiver<Command>,
    readings_tx: Sender<TapReading>,
    readings_rx: Receiver<TapReading>,
    tap_counters: Arc<TapCounters>,
    capture: Option<ActiveCapture>,
    pending_restart: Option<(Uuid, Instant)>,
    label: String,
    display: Arc<Mutex<RollingDisplayBuffer>>,
    status: Arc<Mutex<SharedStatus>>,
}

impl<P: InputProvider> Controller<P> {
    pub fn new(provider: P, services: SensorServices) -> Self {
        let (commands_tx, commands_rx) = crossbeam_channel::unbounded();
        let (readings_tx, readings_rx) = crossbeam_channel::bounded(READING_QUEUE_CAPACITY);
        Self {
            id: Uuid::new_v4(),
            provider,
            services,
            machine: RecoveryStateMachine::new(),
            commands_tx,
            commands_rx,
            readings_tx,
            readings_rx,
            tap_counters: Arc::default(),
            capture: None,
            pending_restart: None,
            label: String::new(),
            display: Arc::new(Mutex::new(RollingDisplayBuffer::new())),
            status: Arc::default(),
        }
    }

    /// Identity used to claim the shared audio session.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> CaptureSessionState {
        self.machine.state()
    }

    /// Most recent samples, oldest first.
    pub fn decibels(&self) -> Vec<DecibelSample> {
        self.display.lock().snapshot()
    }

    pub fn diagnostics(&self) -> SensorDiagnostics {
        self.publish_tap_counters();
        self.status.lock().diagnostics.clone()
    }

    /// Label written into the `label` column of subsequent rows.
    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Begin capture with `config`.
    ///
    /// Returns `NoInputChannels` synchronously when the route has no input
    /// channels. Permission and hardware start complete asynchronously;
    /// their failures arrive through the delegate and the state.
    pub fn start(&mut self, config: SensorConfig) -> Result<(), SensorError> {
        config.validate()?;
        let input_channels = self.input_channels();
        let live = matches!(
            self.state(),
            CaptureSessionState::Starting | CaptureSessionState::Running
        );
        let refused = input_channels == 0 && !live;

        self.dispatch(LifecycleEvent::Start { config, input_channels });

        if refused {
            return Err(SensorError::NoInputChannels);
        }
        Ok(())
    }

    /// Stop capture, flushing and handing off every open segment. Idempotent.
    pub fn stop(&mut self) {
        self.dispatch(LifecycleEvent::Stop);
    }

    pub fn signal(&mut self, signal: SessionSignal) {
        let event = match signal {
            SessionSignal::BeginInterruption => LifecycleEvent::BeginInterruption,
            SessionSignal::EndInterruption => LifecycleEvent::EndInterruption,
            SessionSignal::ZeroChannelsDetected => LifecycleEvent::ZeroChannelsDetected,
        };
        self.dispatch(event);
    }

    /// Process every queued command and reading without blocking.
    pub fn pump(&mut self) {
        loop {
            if let Ok(command) = self.commands_rx.try_recv() {
                self.handle_command(command);
                continue;
            }
            if let Ok(reading) = self.readings_rx.try_recv() {
                self.handle_reading(reading);
                continue;
            }
            break;
        }
    }

    /// Service time-based work: the restart deadline and raw audio rotation.
    pub fn on_tick(&mut self) {
        let now = self.services.clock.now();

        if let Some((attempt, due)) = self.pending_restart {
            if now >= due {
                self.pending_restart = None;
                let input_channels = self.input_channels();
                self.dispatch(LifecycleEvent::RestartDue { attempt, input_channels });
            }
        }

        self.service_raw_audio(now);
        self.publish_tap_counters();
    }

    /// Run until shutdown, multiplexing commands, readings and ticks.
    pub(crate) fn run(mut self) {
        let ticker = crossbeam_channel::tick(TICK_INTERVAL);
        let commands = self.commands_rx.clone();
        let readings = self.readings_rx.clone();
        log::debug!("Control context {} running", self.id);

        loop {
            crossbeam_channel::select! {
                recv(commands) -> msg => match msg {
                    Ok(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                recv(readings) -> msg => {
                    if let Ok(reading) = msg {
                        self.handle_reading(reading);
                    }
                }
                recv(ticker) -> _ => self.on_tick(),
            }
        }

        self.stop();
        log::debug!("Control context {} exited", self.id);
    }

    pub(crate) fn sender(&self) -> Sender<Command> {
        self.commands_tx.clone()
    }

    pub(crate) fn display_handle(&self) -> Arc<Mutex<RollingDisplayBuffer>> {
        Arc::clone(&self.display)
    }

    pub(crate) fn status_handle(&self) -> Arc<Mutex<SharedStatus>> {
        Arc::clone(&self.status)
    }

    /// Returns `false` when the control context should exit.
    pub(crate) fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Start { config, reply } => {
                let result = self.start(config);
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                self.stop();
                let _ = reply.send(());
            }
            Command::Signal { signal, reply } => {
                self.signal(signal);
                let _ = reply.send(());
            }
            Command::SetLabel(label) => self.set_label(label),
            Command::Lifecycle(event) => self.dispatch(event),
            Command::InputLost { capture, error } => self.input_lost(capture, error),
            Command::Shutdown { reply } => {
                self.stop();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    /// Log one reading: append the row, update the display, rotate if due.
    pub(crate) fn handle_reading(&mut self, reading: TapReading) {
        self.status.lock().diagnostics.readings_received += 1;

        let Some(capture) = self.capture.as_mut() else {
            return;
        };
        let Some(value) = loggable_decibels(reading.decibels) else {
            return;
        };
        let now = self.services.clock.now();
        let sample = DecibelSample::new(self.services.clock.wall(), value);
        let debug = capture.config.debug;

        if capture.ambient.is_none() && capture.config.activate_ambient_noise_sensor {
            match SegmentSink::open_ambient(&capture.config.output_directory, sample.timestamp) {
                Ok(sink) => capture.ambient = Some(sink),
                Err(e) if debug => log::debug!("Ambient segment unavailable: {}", e),
                Err(_) => {}
            }
        }

        let appended = match capture.ambient.as_mut() {
            Some(sink) => sink.append_sample(&sample, &self.label),
            None => Err(SensorError::SegmentWriteFailure("no open segment".into())),
        };
        {
            let mut status = self.status.lock();
            match &appended {
                Ok(()) => status.diagnostics.rows_written += 1,
                Err(_) => status.diagnostics.rows_dropped += 1,
            }
        }
        if let Err(e) = appended {
            if debug {
                log::debug!("Dropped sample {:.2} dB: {}", value, e);
            }
        } else if debug {
            log::debug!("{} dB at {}", value, sample.timestamp_millis());
        }

        self.display.lock().push(sample);
        if let Some(delegate) = &self.services.delegate {
            delegate.on_decibel(&sample);
        }

        let due = now.duration_since(capture.last_rotation) >= capture.config.rotation_interval();
        if due {
            self.rotate_ambient(now);
        }
    }

    fn rotate_ambient(&mut self, now: Instant) {
        let Some(capture) = self.capture.as_mut() else {
            return;
        };
        capture.last_rotation = now;
        let debug = capture.config.debug;
        let closed = capture.ambient.take().map(|mut sink| sink.close());

        if let Some(result) = closed {
            self.hand_off_result(result, debug);
        }

        let wall = self.services.clock.wall();
        if let Some(capture) = self.capture.as_mut() {
            match SegmentSink::open_ambient(&capture.config.output_directory, wall) {
                Ok(sink) => capture.ambient = Some(sink),
                Err(e) => log::warn!("Failed to open next ambient segment: {}", e),
            }
        }
    }

    fn service_raw_audio(&mut self, now: Instant) {
        let wall = self.services.clock.wall();
        let Some(capture) = self.capture.as_mut() else {
            return;
        };
        let debug = capture.config.debug;
        let Some(raw) = capture.raw.as_mut() else {
            return;
        };

        if let Err(e) = raw.drain(wall) {
            if debug {
                log::debug!("Raw audio write failed: {}", e);
            }
        }
        let rotated = raw.rotate_if_due(now, wall);
        self.status.lock().diagnostics.raw_frames_written = raw.frames_written();

        match rotated {
            Ok(closed) => {
                for result in closed {
                    self.hand_off_result(result, debug);
                }
            }
            Err(e) => log::warn!("Raw audio rotation failed: {}", e),
        }
    }

    /// A running input died on its own; treat it like a route with no input.
    fn input_lost(&mut self, capture: Uuid, error: SensorError) {
        if self.capture.as_ref().map(|c| c.id) != Some(capture) {
            log::debug!("Ignoring input loss for finished capture {}", capture);
            return;
        }
        log::error!("Input stopped delivering audio: {}", error);
        self.dispatch(LifecycleEvent::ZeroChannelsDetected);
    }

    fn dispatch(&mut self, event: LifecycleEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            for effect in self.machine.handle(event) {
                self.execute(effect, &mut queue);
            }
        }
    }

    fn execute(&mut self, effect: Effect, queue: &mut VecDeque<LifecycleEvent>) {
        match effect {
            Effect::NotifyRebootRequired => self.notify(Notification::reboot_required()),
            Effect::NotifyRestartManually => self.notify(Notification::restart_manually()),
            Effect::RequestPermission { attempt } => {
                let commands = self.commands_tx.clone();
                self.services
                    .session
                    .request_record_permission(Box::new(move |granted| {
                        let _ = commands.send(Command::Lifecycle(LifecycleEvent::PermissionResolved {
                            attempt,
                            granted,
                        }));
                    }));
            }
            Effect::BeginCapture { attempt, config } => {
                let event = match self.begin_capture(&config) {
                    Ok(()) => LifecycleEvent::CaptureStarted { attempt },
                    Err(error) => LifecycleEvent::CaptureFailed { attempt, error },
                };
                queue.push_back(event);
            }
            Effect::StopCapture => self.end_capture(),
            Effect::ScheduleRestart { attempt, delay } => {
                self.pending_restart = Some((attempt, self.services.clock.now() + delay));
            }
            Effect::CancelRestart => self.pending_restart = None,
            Effect::ReportError(error) => {
                if error.is_recoverable() {
                    log::warn!("Sensor error: {}", error);
                } else {
                    log::error!("Sensor error: {}", error);
                }
                if let Some(delegate) = &self.services.delegate {
                    delegate.on_error(&error);
                }
            }
            Effect::InterruptionBegan => {
                log::info!("Audio interruption began");
                if let Some(delegate) = &self.services.delegate {
                    delegate.on_interruption_began();
                }
            }
            Effect::InterruptionEnded => {
                log::info!("Audio interruption ended");
                if let Some(delegate) = &self.services.delegate {
                    delegate.on_interruption_ended();
                }
            }
            Effect::EmitState(state) => {
                self.status.lock().state = state;
                if let Some(delegate) = &self.services.delegate {
                    delegate.on_state_changed(state);
                }
            }
        }
    }

    fn begin_capture(&mut self, config: &SensorConfig) -> Result<(), SensorError> {
        let session = Arc::clone(&self.services.session);
        session.acquire(self.id)?;

        let result = session.ensure_active().and_then(|_| self.install_capture(config));
        if result.is_err() {
            session.release(self.id);
        }
        result
    }

    fn install_capture(&mut self, config: &SensorConfig) -> Result<(), SensorError> {
        let format = self.provider.input_format()?;
        if !format.has_channels() {
            return Err(SensorError::NoInputChannels);
        }

        let now = self.services.clock.now();
        let wall = self.services.clock.wall();

        let ambient = if config.activate_ambient_noise_sensor {
            Some(SegmentSink::open_ambient(&config.output_directory, wall)?)
        } else {
            None
        };

        let (raw, producer) = if config.activate_raw_audio_sensor {
            match RawAudioRecorder::open(
                config.output_directory.clone(),
                format.sample_rate.round() as u32,
                config.rotation_interval(),
                now,
                wall,
            ) {
                Ok((recorder, producer)) => (Some(recorder), Some(producer)),
                Err(e) => {
                    if let Some(sink) = ambient {
                        sink.discard();
                    }
                    return Err(e);
                }
            }
        } else {
            (None, None)
        };

        let tap = Tap::new(
            self.readings_tx.clone(),
            config.activate_ambient_noise_sensor,
            producer,
            Arc::clone(&self.tap_counters),
        );
        let capture_id = Uuid::new_v4();
        let commands = self.commands_tx.clone();
        let on_lost: InputLostCallback = Box::new(move |error| {
            let _ = commands.send(Command::InputLost {
                capture: capture_id,
                error,
            });
        });

        if let Err(e) = self.provider.start(tap.into_callback(), on_lost) {
            if let Some(sink) = ambient {
                sink.discard();
            }
            if let Some(recorder) = raw {
                recorder.discard();
            }
            return Err(match e {
                SensorError::HardwareStartFailure(_) => e,
                other => SensorError::HardwareStartFailure(other.to_string()),
            });
        }

        log::info!(
            "Capture started on {} ({} Hz, {} ch)",
            self.provider.device_info().name,
            format.sample_rate,
            format.channels
        );
        self.capture = Some(ActiveCapture {
            id: capture_id,
            config: config.clone(),
            ambient,
            last_rotation: now,
            raw,
        });
        Ok(())
    }

    fn end_capture(&mut self) {
        if self.capture.is_none() {
            return;
        }
        if let Err(e) = self.provider.stop() {
            log::warn!("Failed to stop input hardware: {}", e);
        }

        // The tap is gone; log what it already queued.
        while let Ok(reading) = self.readings_rx.try_recv() {
            self.handle_reading(reading);
        }

        let Some(mut capture) = self.capture.take() else {
            return;
        };
        let debug = capture.config.debug;

        if let Some(mut sink) = capture.ambient.take() {
            let result = sink.close();
            self.hand_off_result(result, debug);
        }
        if let Some(mut raw) = capture.raw.take() {
            let wall = self.services.clock.wall();
            if let Err(e) = raw.drain(wall) {
                log::warn!("Raw audio write failed: {}", e);
            }
            self.status.lock().diagnostics.raw_frames_written = raw.frames_written();
            for result in raw.finish(wall) {
                self.hand_off_result(result, debug);
            }
        }

        self.services.session.release(self.id);
        self.publish_tap_counters();
        log::info!("Capture stopped");
    }

    /// Hand off a closed segment. A segment that failed to finalize stays
    /// on disk as written, is never handed off and counts toward
    /// `segments_failed`.
    fn hand_off_result(&self, result: SegmentClose, debug: bool) {
        match result {
            Ok(segment) => self.hand_off(segment, debug),
            Err(e) => {
                log::warn!("Failed to close segment, leaving it on disk: {}", e);
                self.status.lock().diagnostics.segments_failed += 1;
            }
        }
    }

    fn hand_off(&self, segment: ClosedSegment, debug: bool) {
        log::info!(
            "Segment closed: {} ({} rows)",
            segment.file_path.display(),
            segment.rows
        );
        self.services.transfer.transfer(&segment.file_path, debug);
        self.status.lock().diagnostics.segments_handed_off += 1;
        if let Some(delegate) = &self.services.delegate {
            delegate.on_segment_closed(&segment);
        }
    }

    fn notify(&mut self, notification: Notification) {
        if self.services.session.claim_notification_category() {
            self.services.notifier.register_category(NOTIFICATION_CATEGORY);
        }
        log::warn!("Scheduling notification: {}", notification.title);
        self.services.notifier.schedule(&notification);
    }

    fn input_channels(&self) -> u16 {
        match self.provider.input_format() {
            Ok(format) => format.channels,
            Err(e) => {
                log::warn!("Input format unavailable: {}", e);
                0
            }
        }
    }

    fn publish_tap_counters(&self) {
        let mut status = self.status.lock();
        status.diagnostics.readings_dropped = self.tap_counters.readings_dropped.load(Ordering::Relaxed);
        status.diagnostics.raw_samples_dropped = self.tap_counters.raw_samples_dropped.load(Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    use crate::models::audio_models::{InputDevice, InputFormat};
    use crate::traits::input_provider::TapCallback;
    use crate::traits::session_host::{AudioSessionHost, PermissionCallback};

    struct SilentInput;

    impl InputProvider for SilentInput {
        fn input_format(&self) -> Result<InputFormat, SensorError> {
            Ok(InputFormat {
                sample_rate: 16_000.0,
                channels: 1,
            })
        }

        fn start(&mut self, _tap: TapCallback, _on_lost: InputLostCallback) -> Result<(), SensorError> {
            Ok(())
        }

        fn stop(&mut self) -> Result<(), SensorError> {
            Ok(())
        }

        fn device_info(&self) -> InputDevice {
            InputDevice {
                id: "silent".into(),
                name: "Silent".into(),
                is_default: true,
                transport_type: None,
            }
        }
    }

    struct GrantingHost;

    impl AudioSessionHost for GrantingHost {
        fn request_record_permission(&self, on_result: PermissionCallback) {
            on_result(true);
        }

        fn activate_session(&self) -> Result<(), SensorError> {
            Ok(())
        }

        fn deactivate_session(&self) -> Result<(), SensorError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Collected {
        transferred: Mutex<Vec<PathBuf>>,
    }

    impl TransferHandoff for Collected {
        fn transfer(&self, file_path: &Path, _debug: bool) {
            self.transferred.lock().push(file_path.to_path_buf());
        }
    }

    impl Notifier for Collected {
        fn register_category(&self, _category: &str) {}

        fn schedule(&self, _notification: &Notification) {}
    }

    #[test]
    fn failed_close_is_counted_and_not_handed_off() {
        let collected = Arc::new(Collected::default());
        let session = Arc::new(AudioSession::new(Arc::new(GrantingHost)));
        let controller = Controller::new(
            SilentInput,
            SensorServices::new(session, collected.clone(), collected.clone()),
        );

        controller.hand_off_result(Err(SensorError::SegmentWriteFailure("disk full".into())), false);
        controller.hand_off_result(
            Ok(ClosedSegment {
                stream: crate::models::audio_models::SensorStream::Ambient,
                file_path: PathBuf::from("ambient_1.csv"),
                rows: 1,
                checksum: String::new(),
            }),
            false,
        );

        let diagnostics = controller.diagnostics();
        assert_eq!(diagnostics.segments_failed, 1);
        assert_eq!(diagnostics.segments_handed_off, 1);
        assert_eq!(collected.transferred.lock().as_slice(), [PathBuf::from("ambient_1.csv")]);
    }
}
