#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use ambient_sensor_core::{
    AudioSession, AudioSessionHost, CaptureSessionState, ClosedSegment, Controller, DecibelSample, InputDevice,
    InputFormat, InputLostCallback, InputProvider, ManualClock, Notification, Notifier, PermissionCallback, SensorConfig,
    SensorDelegate, SensorError, SensorServices, TapCallback, TransferHandoff,
};
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use tempfile::TempDir;

pub const SAMPLE_RATE: f64 = 48_000.0;

#[derive(Default)]
pub struct InputState {
    pub channels: u16,
    pub tap: Option<TapCallback>,
    pub on_lost: Option<InputLostCallback>,
    pub starts: usize,
    pub stops: usize,
    pub fail_start: bool,
}

/// Test control over a [`MockInput`] after it has been moved into a controller.
#[derive(Clone, Default)]
pub struct InputHandle {
    inner: Arc<Mutex<InputState>>,
}

impl InputHandle {
    /// Deliver one buffer to the installed tap. Returns false when no tap is installed.
    pub fn feed(&self, samples: &[f32]) -> bool {
        let mut state = self.inner.lock();
        let channels = state.channels.max(1);
        match state.tap.as_mut() {
            Some(tap) => {
                tap(samples, SAMPLE_RATE, channels);
                true
            }
            None => false,
        }
    }

    /// Simulate the device dying mid-stream: the tap goes quiet and the
    /// loss is reported. Returns false when nothing was running.
    pub fn lose_input(&self, error: SensorError) -> bool {
        let on_lost = {
            let mut state = self.inner.lock();
            state.tap = None;
            state.on_lost.take()
        };
        match on_lost {
            Some(on_lost) => {
                on_lost(error);
                true
            }
            None => false,
        }
    }

    pub fn set_channels(&self, channels: u16) {
        self.inner.lock().channels = channels;
    }

    pub fn fail_next_start(&self) {
        self.inner.lock().fail_start = true;
    }

    pub fn is_tapped(&self) -> bool {
        self.inner.lock().tap.is_some()
    }

    pub fn starts(&self) -> usize {
        self.inner.lock().starts
    }

    pub fn stops(&self) -> usize {
        self.inner.lock().stops
    }
}

pub struct MockInput {
    handle: InputHandle,
}

impl MockInput {
    pub fn new(channels: u16) -> (Self, InputHandle) {
        let handle = InputHandle::default();
        handle.set_channels(channels);
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl InputProvider for MockInput {
    fn input_format(&self) -> Result<InputFormat, SensorError> {
        Ok(InputFormat {
            sample_rate: SAMPLE_RATE,
            channels: self.handle.inner.lock().channels,
        })
    }

    fn start(&mut self, tap: TapCallback, on_lost: InputLostCallback) -> Result<(), SensorError> {
        let mut state = self.handle.inner.lock();
        if std::mem::take(&mut state.fail_start) {
            return Err(SensorError::HardwareStartFailure("device busy".into()));
        }
        state.tap = Some(tap);
        state.on_lost = Some(on_lost);
        state.starts += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SensorError> {
        let mut state = self.handle.inner.lock();
        state.on_lost = None;
        if state.tap.take().is_some() {
            state.stops += 1;
        }
        Ok(())
    }

    fn device_info(&self) -> InputDevice {
        InputDevice {
            id: "mock-mic".into(),
            name: "Mock Microphone".into(),
            is_default: true,
            transport_type: None,
        }
    }
}

/// Answers permission prompts synchronously with `grant`.
pub struct MockHost {
    pub grant: AtomicBool,
    pub activations: AtomicUsize,
    pub deactivations: AtomicUsize,
}

impl MockHost {
    pub fn granting() -> Self {
        Self {
            grant: AtomicBool::new(true),
            activations: AtomicUsize::new(0),
            deactivations: AtomicUsize::new(0),
        }
    }
}

impl AudioSessionHost for MockHost {
    fn request_record_permission(&self, on_result: PermissionCallback) {
        on_result(self.grant.load(Ordering::SeqCst));
    }

    fn activate_session(&self) -> Result<(), SensorError> {
        self.activations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn deactivate_session(&self) -> Result<(), SensorError> {
        self.deactivations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingTransfer {
    pub handed_off: Mutex<Vec<(PathBuf, bool)>>,
}

impl RecordingTransfer {
    pub fn paths(&self) -> Vec<PathBuf> {
        self.handed_off.lock().iter().map(|(p, _)| p.clone()).collect()
    }
}

impl TransferHandoff for RecordingTransfer {
    fn transfer(&self, file_path: &Path, debug: bool) {
        self.handed_off.lock().push((file_path.to_path_buf(), debug));
    }
}

#[derive(Default)]
pub struct CountingNotifier {
    pub categories: Mutex<Vec<String>>,
    pub scheduled: Mutex<Vec<Notification>>,
}

impl Notifier for CountingNotifier {
    fn register_category(&self, category: &str) {
        self.categories.lock().push(category.to_string());
    }

    fn schedule(&self, notification: &Notification) {
        self.scheduled.lock().push(notification.clone());
    }
}

#[derive(Default)]
pub struct RecordingDelegate {
    pub states: Mutex<Vec<CaptureSessionState>>,
    pub errors: Mutex<Vec<SensorError>>,
    pub segments: Mutex<Vec<ClosedSegment>>,
    pub decibels: AtomicUsize,
    pub interruptions_began: AtomicUsize,
    pub interruptions_ended: AtomicUsize,
}

impl SensorDelegate for RecordingDelegate {
    fn on_state_changed(&self, state: CaptureSessionState) {
        self.states.lock().push(state);
    }

    fn on_decibel(&self, _sample: &DecibelSample) {
        self.decibels.fetch_add(1, Ordering::SeqCst);
    }

    fn on_segment_closed(&self, segment: &ClosedSegment) {
        self.segments.lock().push(segment.clone());
    }

    fn on_error(&self, error: &SensorError) {
        self.errors.lock().push(error.clone());
    }

    fn on_interruption_began(&self) {
        self.interruptions_began.fetch_add(1, Ordering::SeqCst);
    }

    fn on_interruption_ended(&self) {
        self.interruptions_ended.fetch_add(1, Ordering::SeqCst);
    }
}

/// Collaborators plus a temp output directory, shared by the scenario tests.
pub struct Fixture {
    pub input: InputHandle,
    pub host: Arc<MockHost>,
    pub session: Arc<AudioSession>,
    pub transfer: Arc<RecordingTransfer>,
    pub notifier: Arc<CountingNotifier>,
    pub delegate: Arc<RecordingDelegate>,
    pub clock: Arc<ManualClock>,
    pub dir: TempDir,
}

impl Fixture {
    pub fn new(channels: u16) -> (Self, MockInput) {
        let (provider, input) = MockInput::new(channels);
        let host = Arc::new(MockHost::granting());
        let fixture = Self {
            input,
            session: Arc::new(AudioSession::new(host.clone())),
            host,
            transfer: Arc::default(),
            notifier: Arc::default(),
            delegate: Arc::default(),
            clock: Arc::new(ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap())),
            dir: tempfile::tempdir().unwrap(),
        };
        (fixture, provider)
    }

    pub fn services(&self) -> SensorServices {
        SensorServices::new(self.session.clone(), self.transfer.clone(), self.notifier.clone())
            .with_delegate(self.delegate.clone())
            .with_clock(self.clock.clone())
    }

    pub fn controller(channels: u16) -> (Self, Controller<MockInput>) {
        let (fixture, provider) = Self::new(channels);
        let controller = Controller::new(provider, fixture.services());
        (fixture, controller)
    }

    pub fn config(&self, interval_secs: u64) -> SensorConfig {
        SensorConfig {
            auto_file_transfer_interval: interval_secs,
            output_directory: self.dir.path().to_path_buf(),
            ..SensorConfig::default()
        }
    }

    pub fn files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(self.dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        files.sort();
        files
    }
}

/// Data rows of a CSV segment, header excluded.
pub fn data_rows(path: &Path) -> Vec<String> {
    let contents = fs::read_to_string(path).unwrap();
    let mut lines = contents.lines();
    assert_eq!(lines.next(), Some("timestamp,db,label"));
    lines.map(str::to_string).collect()
}

/// Bring `controller` to Running with `config`.
pub fn run(controller: &mut Controller<MockInput>, config: SensorConfig) {
    controller.start(config).unwrap();
    controller.pump();
    assert_eq!(controller.state(), CaptureSessionState::Running);
}
