//! Measurement session: one physiological measurement from start command to
//! frozen result.
//!
//! The session is a plain state machine driven by decoded protocol events
//! and explicit clock ticks, which keeps it testable under a paused tokio
//! clock. [`run_measurement`] is the async driver that wires a live
//! notification stream, a command channel, and the two deadlines (the
//! acquisition timer and the 2-second push-ack budget) into that machine.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace, warn};

use crate::ble::codec::{Frame, CMD_HEART_RATE, SUB_MEASURE};
use crate::ble::dispatcher::{dispatch, ProtocolEvent};
use crate::ble::session::{FrameSender, GattEvent};
use crate::config::MeasurementConfig;
use crate::error::{MeasurementError, TransportError};
use crate::models::{HeartRateResult, MeasurementOutcome};

/// Session lifecycle. `Completed`, `Cancelled`, and `Errored` are terminal
/// until [`MeasurementSession::reset`].
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementState {
    Idle,
    Starting,
    Measuring,
    Finishing,
    Completed,
    Cancelled,
    Errored(MeasurementError),
}

/// Caller-issued controls for a running measurement driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementCommand {
    /// Finish early: keep accumulated data, resolve pending acks, complete.
    Stop,
    /// Abort: discard accumulated data immediately.
    Cancel,
}

/// Updates published while a measurement runs.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementEvent {
    HeartRate(HeartRateResult),
    Progress(u8),
    Waveform { seq: u8, appended: usize },
    RrIntervals(Vec<u16>),
    /// An RR frame declared more intervals than it carried.
    ShortRead { declared: u8, parsed: usize },
    UnknownFrame { command: u8, subcommand: Option<u8> },
    Malformed { command: u8, payload_len: usize },
    /// Notification bytes that did not decode into a frame at all.
    Undecodable { len: usize },
    /// A device push went unacknowledged past its deadline. Recoverable;
    /// the firmware may retry the push.
    AckDeadlineMissed { frame_id: u8 },
    Completed(MeasurementOutcome),
}

#[derive(Debug)]
struct PendingAck {
    frame_id: u8,
    deadline: Instant,
    /// A send was attempted and failed; keep the deadline so the miss is
    /// still observable, but do not retry.
    attempted: bool,
}

/// State machine for one measurement.
///
/// Holds the GATT session's send capability, never the transport itself.
/// Exactly one may be active per GATT session: `begin` on a non-idle
/// session fails with `SessionBusy`.
pub struct MeasurementSession {
    sender: FrameSender,
    config: MeasurementConfig,
    state: MeasurementState,
    result: Option<HeartRateResult>,
    waveform: Vec<u8>,
    rr_intervals: Vec<u16>,
    started_at: Option<Instant>,
    pending_ack: Option<PendingAck>,
}

impl MeasurementSession {
    pub fn new(sender: FrameSender, config: MeasurementConfig) -> Self {
        Self {
            sender,
            config,
            state: MeasurementState::Idle,
            result: None,
            waveform: Vec::new(),
            rr_intervals: Vec::new(),
            started_at: None,
            pending_ack: None,
        }
    }

    pub fn state(&self) -> &MeasurementState {
        &self.state
    }

    /// Send the start-measurement command and enter `Measuring`.
    ///
    /// Fails with `SessionBusy` unless idle, and with `DeviceNotReady`
    /// (no state change) when the GATT session is not ready.
    pub async fn begin(&mut self) -> Result<(), MeasurementError> {
        if self.state != MeasurementState::Idle {
            return Err(MeasurementError::SessionBusy);
        }
        if !self.sender.is_ready() {
            return Err(MeasurementError::DeviceNotReady);
        }

        self.state = MeasurementState::Starting;
        let start = Frame::command(CMD_HEART_RATE, SUB_MEASURE, self.config.start_payload());
        debug!(frame_id = start.frame_id, "sending start-measurement command");

        if let Err(e) = self.sender.send(&start).await {
            let error = MeasurementError::from(e);
            self.state = MeasurementState::Errored(error.clone());
            return Err(error);
        }

        self.started_at = Some(Instant::now());
        self.state = MeasurementState::Measuring;
        info!(
            duration_secs = self.config.duration_secs,
            sample_rate_hz = self.config.sample_rate_hz,
            "measurement started"
        );
        Ok(())
    }

    /// Fold one dispatched protocol event into the session, returning the
    /// updates to publish.
    ///
    /// Only `Measuring` accepts data; during `Finishing` frames are dropped
    /// (the acquisition window is over, only a scheduled ack may still go
    /// out), and terminal states ignore everything.
    pub fn apply(&mut self, event: ProtocolEvent) -> Vec<MeasurementEvent> {
        match self.state {
            MeasurementState::Measuring => {}
            MeasurementState::Finishing => {
                trace!(?event, "frame after acquisition window, dropped");
                return Vec::new();
            }
            _ => return Vec::new(),
        }

        match event {
            ProtocolEvent::HeartRate(result) => {
                self.result = Some(result.clone());
                vec![MeasurementEvent::HeartRate(result)]
            }
            ProtocolEvent::HeartRatePush { result, frame_id } => {
                if let Some(previous) = &self.pending_ack {
                    warn!(
                        superseded = previous.frame_id,
                        frame_id, "new push before previous ack resolved"
                    );
                }
                self.pending_ack = Some(PendingAck {
                    frame_id,
                    deadline: Instant::now() + self.config.ack_deadline(),
                    attempted: false,
                });
                self.result = Some(result.clone());
                vec![MeasurementEvent::HeartRate(result)]
            }
            ProtocolEvent::Waveform(data) => {
                self.waveform.extend_from_slice(&data.samples);
                vec![MeasurementEvent::Waveform {
                    seq: data.seq,
                    appended: data.samples.len(),
                }]
            }
            ProtocolEvent::RrIntervals { data, truncated } => {
                let parsed = data.intervals.len();
                self.rr_intervals.extend_from_slice(&data.intervals);
                let mut events = vec![MeasurementEvent::RrIntervals(data.intervals)];
                if truncated {
                    events.push(MeasurementEvent::ShortRead {
                        declared: data.declared_count,
                        parsed,
                    });
                }
                events
            }
            ProtocolEvent::Progress(percent) => vec![MeasurementEvent::Progress(percent)],
            ProtocolEvent::Unknown {
                command,
                subcommand,
            } => vec![MeasurementEvent::UnknownFrame {
                command,
                subcommand,
            }],
            ProtocolEvent::Malformed {
                command,
                payload_len,
            } => vec![MeasurementEvent::Malformed {
                command,
                payload_len,
            }],
        }
    }

    /// Deadline of the unacknowledged push, if one is owed.
    pub fn pending_ack_deadline(&self) -> Option<Instant> {
        self.pending_ack.as_ref().map(|ack| ack.deadline)
    }

    /// Send the owed acknowledgment, if any.
    ///
    /// On success the ack is resolved and its frame id returned. On failure
    /// the pending entry is kept (without retry) so the deadline miss still
    /// surfaces; an ack failure never fails the measurement.
    pub async fn send_pending_ack(&mut self) -> Result<Option<u8>, TransportError> {
        let Some(ack) = self.pending_ack.as_mut() else {
            return Ok(None);
        };
        if ack.attempted {
            return Ok(None);
        }

        let frame_id = ack.frame_id;
        ack.attempted = true;
        match self.sender.send(&Frame::ack(frame_id)).await {
            Ok(()) => {
                self.pending_ack = None;
                debug!(frame_id, "push acknowledged");
                Ok(Some(frame_id))
            }
            Err(e) => Err(e),
        }
    }

    /// Expire the pending ack against `now`. Past the deadline this yields
    /// an [`MeasurementEvent::AckDeadlineMissed`] diagnostic and the
    /// measurement carries on unaffected.
    pub fn expire_ack(&mut self, now: Instant) -> Option<MeasurementEvent> {
        let ack = self.pending_ack.as_ref()?;
        if now < ack.deadline {
            return None;
        }

        let frame_id = ack.frame_id;
        self.pending_ack = None;
        warn!(frame_id, "push acknowledgment deadline missed");
        Some(MeasurementEvent::AckDeadlineMissed { frame_id })
    }

    /// When the acquisition timer should fire, while measuring.
    pub fn acquisition_deadline(&self) -> Option<Instant> {
        if self.state != MeasurementState::Measuring {
            return None;
        }
        self.started_at
            .map(|started| started + self.config.acquisition_duration())
    }

    /// Move a running measurement into `Finishing`. Safe to call from any
    /// state and idempotent.
    pub fn stop(&mut self) {
        if matches!(
            self.state,
            MeasurementState::Starting | MeasurementState::Measuring
        ) {
            self.state = MeasurementState::Finishing;
            info!("measurement finishing");
        }
    }

    /// Abort immediately, discarding accumulated data. Safe from any state,
    /// idempotent, and does not wait for in-flight acknowledgments.
    pub fn cancel(&mut self) {
        if matches!(
            self.state,
            MeasurementState::Cancelled | MeasurementState::Completed
        ) {
            return;
        }
        self.result = None;
        self.waveform.clear();
        self.rr_intervals.clear();
        self.pending_ack = None;
        self.state = MeasurementState::Cancelled;
        info!("measurement cancelled");
    }

    /// Record a fatal error, keeping accumulated data for salvage.
    pub fn fail(&mut self, error: MeasurementError) {
        self.state = MeasurementState::Errored(error);
    }

    /// Complete the session once `Finishing` and no acknowledgment is
    /// outstanding, freezing the accumulated data.
    pub fn try_complete(&mut self) -> Option<MeasurementOutcome> {
        if self.state != MeasurementState::Finishing || self.pending_ack.is_some() {
            return None;
        }
        self.state = MeasurementState::Completed;
        info!(
            heart_rate = self.result.as_ref().map(|r| r.heart_rate),
            waveform_bytes = self.waveform.len(),
            rr_count = self.rr_intervals.len(),
            "measurement completed"
        );
        Some(self.outcome())
    }

    /// Snapshot of the accumulated data. `complete` only once the session
    /// reached `Completed`; anything else is partial data.
    pub fn outcome(&self) -> MeasurementOutcome {
        MeasurementOutcome {
            heart_rate: self.result.as_ref().map(|r| r.heart_rate),
            hrv: self.result.as_ref().map(|r| r.hrv),
            stress: self.result.as_ref().map(|r| r.stress),
            temperature: self.result.as_ref().and_then(|r| r.temperature),
            waveform: self.waveform.clone(),
            rr_intervals: self.rr_intervals.clone(),
            complete: self.state == MeasurementState::Completed,
        }
    }

    /// Return a terminal session to `Idle`, discarding all data.
    pub fn reset(&mut self) {
        self.result = None;
        self.waveform.clear();
        self.rr_intervals.clear();
        self.pending_ack = None;
        self.started_at = None;
        self.state = MeasurementState::Idle;
    }
}

/// Drive one measurement to termination.
///
/// Starts the measurement, then folds notification frames, caller commands,
/// and the two deadlines into the session until it completes, cancels, or
/// errors. Pending acknowledgments are sent before anything else is awaited
/// so the 2-second budget holds even under load; the notification path
/// itself is never blocked because frames arrive over an unbounded channel.
pub async fn run_measurement(
    mut session: MeasurementSession,
    mut frames: mpsc::UnboundedReceiver<GattEvent>,
    mut commands: mpsc::UnboundedReceiver<MeasurementCommand>,
    events: mpsc::UnboundedSender<MeasurementEvent>,
) -> Result<MeasurementOutcome, MeasurementError> {
    session.begin().await?;
    let mut commands_open = true;

    loop {
        // Any owed ack goes out before waiting on anything else.
        match session.send_pending_ack().await {
            Ok(Some(frame_id)) => trace!(frame_id, "acknowledgment dispatched"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "push acknowledgment send failed"),
        }

        if session.state() == &MeasurementState::Cancelled {
            return Ok(session.outcome());
        }
        if let Some(outcome) = session.try_complete() {
            let _ = events.send(MeasurementEvent::Completed(outcome.clone()));
            return Ok(outcome);
        }

        let acquisition = session.acquisition_deadline();
        let ack = session.pending_ack_deadline();

        tokio::select! {
            _ = sleep_until(acquisition.unwrap_or_else(far_future)), if acquisition.is_some() => {
                info!("acquisition timer elapsed");
                session.stop();
            }
            _ = sleep_until(ack.unwrap_or_else(far_future)), if ack.is_some() => {
                if let Some(event) = session.expire_ack(Instant::now()) {
                    let _ = events.send(event);
                }
            }
            command = commands.recv(), if commands_open => match command {
                Some(MeasurementCommand::Stop) => session.stop(),
                Some(MeasurementCommand::Cancel) => session.cancel(),
                None => commands_open = false,
            },
            incoming = frames.recv() => match incoming {
                Some(GattEvent::Frame(frame)) => {
                    for event in session.apply(dispatch(&frame)) {
                        let _ = events.send(event);
                    }
                }
                Some(GattEvent::DecodeFailure { len }) => {
                    let _ = events.send(MeasurementEvent::Undecodable { len });
                }
                None => {
                    let error = MeasurementError::Transport(TransportError::SessionClosed);
                    session.fail(error.clone());
                    return Err(error);
                }
            },
        }
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400)
}

/// Convenience for the common case: bind the channels and spawn the driver.
pub fn spawn_measurement(
    session: MeasurementSession,
    frames: mpsc::UnboundedReceiver<GattEvent>,
    events: mpsc::UnboundedSender<MeasurementEvent>,
) -> (
    mpsc::UnboundedSender<MeasurementCommand>,
    tokio::task::JoinHandle<Result<MeasurementOutcome, MeasurementError>>,
) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(run_measurement(session, frames, command_rx, events));
    (command_tx, handle)
}
