//! Interruption recovery state machine.
//!
//! Pure transition logic: every lifecycle event maps to one rule that
//! returns the effects the control context must execute. The machine owns
//! no hardware or files; it only tracks the session state, the active
//! configuration and the id of the current start/restart attempt.
//!
//! Attempt ids make asynchronous completions safe: a permission answer or
//! restart deadline carrying a superseded id is ignored.

use std::time::Duration;

use uuid::Uuid;

use crate::models::config::SensorConfig;
use crate::models::error::SensorError;
use crate::models::state::CaptureSessionState;

/// Pause between the end of an interruption and the restart attempt.
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Events that can trigger state transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// Caller asked to start; `input_channels` is the route's current channel count.
    Start {
        config: SensorConfig,
        input_channels: u16,
    },
    /// Caller asked to stop.
    Stop,
    /// The user answered the record-permission prompt.
    PermissionResolved { attempt: Uuid, granted: bool },
    /// Tap installed and hardware running.
    CaptureStarted { attempt: Uuid },
    /// Session activation, sink creation, or hardware start failed.
    CaptureFailed { attempt: Uuid, error: SensorError },
    /// The OS revoked the input route (call, assistant, ...).
    BeginInterruption,
    /// The OS handed the input route back.
    EndInterruption,
    /// The settle delay for `attempt` elapsed.
    RestartDue { attempt: Uuid, input_channels: u16 },
    /// The route reports zero usable input channels.
    ZeroChannelsDetected,
}

/// Effects to be executed by the control context after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    NotifyRebootRequired,
    NotifyRestartManually,
    RequestPermission { attempt: Uuid },
    BeginCapture { attempt: Uuid, config: SensorConfig },
    /// Remove the tap, close open segments and hand them off. Idempotent.
    StopCapture,
    ScheduleRestart { attempt: Uuid, delay: Duration },
    CancelRestart,
    ReportError(SensorError),
    InterruptionBegan,
    InterruptionEnded,
    EmitState(CaptureSessionState),
}

#[derive(Debug, Default)]
pub struct RecoveryStateMachine {
    state: CaptureSessionState,
    config: Option<SensorConfig>,
    attempt: Option<Uuid>,
}

impl RecoveryStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CaptureSessionState {
        self.state
    }

    pub fn config(&self) -> Option<&SensorConfig> {
        self.config.as_ref()
    }

    /// Id of the pending permission request or scheduled restart, if any.
    pub fn attempt(&self) -> Option<Uuid> {
        self.attempt
    }

    /// Apply `event` and return the effects to execute, in order.
    pub fn handle(&mut self, event: LifecycleEvent) -> Vec<Effect> {
        use CaptureSessionState::*;
        use LifecycleEvent::*;

        match (self.state, event) {
            (Starting | Running, Start { .. }) => Vec::new(),

            (Idle, Start { config, input_channels: 0 }) => {
                self.config = Some(config);
                vec![
                    Effect::NotifyRebootRequired,
                    Effect::ReportError(SensorError::NoInputChannels),
                ]
            }
            (Degraded, Start { config, input_channels: 0 }) => {
                self.config = Some(config);
                vec![Effect::ReportError(SensorError::NoInputChannels)]
            }
            (Interrupted, Start { config, input_channels: 0 }) => {
                self.config = Some(config);
                self.enter_degraded(vec![Effect::CancelRestart])
            }
            (Idle | Interrupted | Degraded, Start { config, .. }) => {
                self.config = Some(config);
                let mut effects = vec![Effect::CancelRestart];
                effects.extend(self.begin_start());
                effects
            }

            (Starting, PermissionResolved { attempt, granted }) if self.attempt == Some(attempt) => {
                if granted {
                    match self.config.clone() {
                        Some(config) => vec![Effect::BeginCapture { attempt, config }],
                        None => self.transition(Idle, Vec::new()),
                    }
                } else {
                    self.attempt = None;
                    self.transition(Idle, vec![Effect::ReportError(SensorError::PermissionDenied)])
                }
            }
            (Starting, CaptureStarted { attempt }) if self.attempt == Some(attempt) => {
                self.attempt = None;
                self.transition(Running, Vec::new())
            }
            (Starting, CaptureFailed { attempt, error }) if self.attempt == Some(attempt) => {
                self.attempt = None;
                self.transition(Idle, vec![Effect::ReportError(error)])
            }

            (Running, BeginInterruption) => {
                self.transition(Interrupted, vec![Effect::InterruptionBegan, Effect::StopCapture])
            }
            (Starting, BeginInterruption) => {
                self.attempt = None;
                self.transition(Interrupted, vec![Effect::InterruptionBegan])
            }

            (Interrupted, EndInterruption) => {
                let attempt = Uuid::new_v4();
                self.attempt = Some(attempt);
                vec![
                    Effect::InterruptionEnded,
                    Effect::ScheduleRestart {
                        attempt,
                        delay: SETTLE_DELAY,
                    },
                ]
            }

            (Interrupted, RestartDue { attempt, input_channels }) if self.attempt == Some(attempt) => {
                if input_channels == 0 {
                    self.attempt = None;
                    self.enter_degraded(Vec::new())
                } else {
                    self.begin_start()
                }
            }

            (Degraded, ZeroChannelsDetected) => Vec::new(),
            (Running, ZeroChannelsDetected) => {
                self.attempt = None;
                self.enter_degraded(vec![Effect::StopCapture])
            }
            (Idle | Starting | Interrupted, ZeroChannelsDetected) => {
                self.attempt = None;
                self.enter_degraded(vec![Effect::CancelRestart])
            }

            (Idle, Stop) => Vec::new(),
            (Running, Stop) => {
                self.attempt = None;
                self.transition(Idle, vec![Effect::StopCapture])
            }
            (Starting | Interrupted | Degraded, Stop) => {
                self.attempt = None;
                self.transition(Idle, vec![Effect::CancelRestart, Effect::StopCapture])
            }

            (state, event) => {
                log::debug!("Ignoring {:?} in state {}", event, state);
                Vec::new()
            }
        }
    }

    fn begin_start(&mut self) -> Vec<Effect> {
        let attempt = Uuid::new_v4();
        self.attempt = Some(attempt);
        self.transition(
            CaptureSessionState::Starting,
            vec![Effect::RequestPermission { attempt }],
        )
    }

    fn enter_degraded(&mut self, mut effects: Vec<Effect>) -> Vec<Effect> {
        effects.push(Effect::NotifyRestartManually);
        effects.push(Effect::ReportError(SensorError::NoInputChannels));
        self.transition(CaptureSessionState::Degraded, effects)
    }

    fn transition(&mut self, next: CaptureSessionState, mut effects: Vec<Effect>) -> Vec<Effect> {
        if next != self.state {
            log::info!("Capture state {} -> {}", self.state, next);
            self.state = next;
            effects.push(Effect::EmitState(next));
        }
        effects
    }
}
