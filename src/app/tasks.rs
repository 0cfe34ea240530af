//! Reporting tasks: sensor-poll, alarm-report, heartbeat.
//!
//! [`Reporter`] owns everything the three tasks share: the derived alarm
//! condition, the uplink sequence counters and the task counters.  The
//! dispatcher calls exactly one method per task and only while the session
//! is `Online`.  Every uplink goes through [`NetworkSession::send`]; a
//! failed send is counted and left for the task's next natural trigger.

use log::{debug, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, RadioPort, SensorPort};
use crate::config::RelayConfig;
use crate::error::Error;
use crate::led::LedStatus;
use crate::power::{BootCause, Snapshot};
use crate::session::NetworkSession;
use crate::uplink::{self, AlarmReport, Heartbeat, UplinkKind};

/// Consecutive read errors after which the detector counts as faulty.
pub const SENSOR_FAULT_AFTER_ERRORS: u8 = 3;

// ───────────────────────────────────────────────────────────────
// Derived alarm state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlarmState {
    /// Derived alarm condition from the last good reading.
    pub active: bool,
    /// Detector-reported fault, or too many failed reads in a row.
    pub fault: bool,
    pub concentration_lel: u8,
    /// One-shot: an alarm pending at power loss is still owed.
    pub replay_latched: bool,
    consecutive_read_errors: u8,
    last_attempt_ms: Option<u64>,
}

impl AlarmState {
    /// An alarm uplink is owed (live condition or recovered replay).
    pub fn wants_report(&self) -> bool {
        self.active || self.replay_latched
    }

    fn guard_open(&self, now_ms: u64, min_interval_ms: u64) -> bool {
        self.last_attempt_ms
            .is_none_or(|last| now_ms.saturating_sub(last) >= min_interval_ms)
    }
}

/// Uplink sequence numbers.  Survive power loss through the snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sequences {
    pub alarm: u32,
    pub heartbeat: u32,
    pub uplink: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounters {
    pub alarms_sent: u32,
    pub alarms_failed: u32,
    pub heartbeats_sent: u32,
    pub heartbeats_failed: u32,
    pub sensor_errors: u32,
    pub recovery_replays: u32,
}

impl TaskCounters {
    /// Failed uplinks of either kind.
    pub fn uplink_failures(&self) -> u32 {
        self.alarms_failed.saturating_add(self.heartbeats_failed)
    }
}

// ───────────────────────────────────────────────────────────────
// Reporter
// ───────────────────────────────────────────────────────────────

pub struct Reporter {
    alarm: AlarmState,
    seq: Sequences,
    counters: TaskCounters,
    boot_cause: BootCause,
    alarm_port: u8,
    heartbeat_port: u8,
    alarm_min_interval_ms: u64,
}

impl Reporter {
    pub fn new(cfg: &RelayConfig) -> Self {
        Self {
            alarm: AlarmState::default(),
            seq: Sequences::default(),
            counters: TaskCounters::default(),
            boot_cause: BootCause::Clean,
            alarm_port: cfg.alarm_port,
            heartbeat_port: cfg.heartbeat_port,
            alarm_min_interval_ms: u64::from(cfg.alarm_report_min_interval_ms),
        }
    }

    pub fn alarm(&self) -> &AlarmState {
        &self.alarm
    }

    pub fn sequences(&self) -> Sequences {
        self.seq
    }

    pub fn counters(&self) -> TaskCounters {
        self.counters
    }

    pub fn boot_cause(&self) -> BootCause {
        self.boot_cause
    }

    /// Continue the sequence counters of the previous run.
    pub fn restore(&mut self, snap: &Snapshot) {
        self.seq = Sequences {
            alarm: snap.alarm_seq,
            heartbeat: snap.heartbeat_seq,
            uplink: snap.uplink_seq,
        };
        self.boot_cause = BootCause::PowerLoss;
    }

    /// Owe exactly one alarm report on behalf of the previous run.
    pub fn arm_replay(&mut self) {
        self.alarm.replay_latched = true;
    }

    /// Snapshot of the runtime state as of now.
    pub fn snapshot(&self, dev_addr: Option<u32>) -> Snapshot {
        Snapshot {
            pending_alarm: self.alarm.wants_report(),
            alarm_seq: self.seq.alarm,
            heartbeat_seq: self.seq.heartbeat,
            uplink_seq: self.seq.uplink,
            dev_addr,
        }
    }

    // ── Sensor-poll ───────────────────────────────────────────

    /// Read the detector and update the derived alarm condition.
    /// Never transmits.
    pub fn sensor_poll(
        &mut self,
        sensor: &mut impl SensorPort,
        sink: &mut impl EventSink,
    ) -> Result<(), Error> {
        let reading = match sensor.read_alarm_state() {
            Ok(r) => r,
            Err(e) => {
                self.counters.sensor_errors = self.counters.sensor_errors.saturating_add(1);
                self.alarm.consecutive_read_errors =
                    self.alarm.consecutive_read_errors.saturating_add(1);
                if self.alarm.consecutive_read_errors >= SENSOR_FAULT_AFTER_ERRORS {
                    self.alarm.fault = true;
                }
                sink.emit(&AppEvent::SensorFailed(e));
                return Err(e.into());
            }
        };

        self.alarm.consecutive_read_errors = 0;
        self.alarm.fault = reading.fault;
        self.alarm.concentration_lel = reading.concentration_lel;

        if reading.alarm != self.alarm.active {
            self.alarm.active = reading.alarm;
            info!(
                "Alarm condition {} ({}%LEL)",
                if reading.alarm { "RAISED" } else { "cleared" },
                reading.concentration_lel
            );
            sink.emit(&AppEvent::AlarmChanged {
                active: reading.alarm,
                concentration_lel: reading.concentration_lel,
            });
        }
        Ok(())
    }

    // ── Alarm-report ──────────────────────────────────────────

    /// Evaluated every iteration.  Returns `Ok(true)` if a report left the
    /// radio, `Ok(false)` if none was due.
    pub fn alarm_report(
        &mut self,
        now_ms: u64,
        session: &mut NetworkSession,
        radio: &mut impl RadioPort,
        sink: &mut impl EventSink,
    ) -> Result<bool, Error> {
        if !self.alarm.wants_report() || !self.alarm.guard_open(now_ms, self.alarm_min_interval_ms)
        {
            return Ok(false);
        }

        // The guard counts attempts, so a failing link is not flooded either.
        self.alarm.last_attempt_ms = Some(now_ms);

        let replayed = self.alarm.replay_latched;
        let seq = self.seq.alarm.wrapping_add(1);
        let payload = uplink::encode(&AlarmReport {
            seq,
            concentration_lel: self.alarm.concentration_lel,
            detector_fault: self.alarm.fault,
            replayed,
        })?;

        match session.send(now_ms, radio, self.alarm_port, &payload) {
            Ok(()) => {
                self.seq.alarm = seq;
                self.seq.uplink = self.seq.uplink.wrapping_add(1);
                self.counters.alarms_sent = self.counters.alarms_sent.saturating_add(1);
                info!("Alarm report #{} sent{}", seq, if replayed { " (replay)" } else { "" });
                sink.emit(&AppEvent::UplinkSent { kind: UplinkKind::Alarm, seq });
                if replayed {
                    self.alarm.replay_latched = false;
                    self.counters.recovery_replays =
                        self.counters.recovery_replays.saturating_add(1);
                    sink.emit(&AppEvent::AlarmReplayed);
                }
                Ok(true)
            }
            Err(e) => {
                self.counters.alarms_failed = self.counters.alarms_failed.saturating_add(1);
                warn!("Alarm report #{} failed: {}", seq, e);
                sink.emit(&AppEvent::UplinkFailed { kind: UplinkKind::Alarm, error: e });
                Err(e.into())
            }
        }
    }

    // ── Heartbeat ─────────────────────────────────────────────

    /// Send one liveness uplink.  The counters fields come from the
    /// dispatcher's [`RelayStats`](crate::diagnostics::RelayStats).
    pub fn heartbeat(
        &mut self,
        now_ms: u64,
        session: &mut NetworkSession,
        radio: &mut impl RadioPort,
        led: LedStatus,
        join_failures: u16,
        sink: &mut impl EventSink,
    ) -> Result<(), Error> {
        let seq = self.seq.heartbeat.wrapping_add(1);
        let body = Heartbeat {
            seq,
            led,
            alarm_active: self.alarm.active,
            detector_fault: self.alarm.fault,
            concentration_lel: self.alarm.concentration_lel,
            boot_cause: self.boot_cause,
            join_failures,
            uplink_failures: crate::diagnostics::narrow(self.counters.uplink_failures()),
            sensor_errors: crate::diagnostics::narrow(self.counters.sensor_errors),
        };
        let payload = uplink::encode(&body)?;

        match session.send(now_ms, radio, self.heartbeat_port, &payload) {
            Ok(()) => {
                self.seq.heartbeat = seq;
                self.seq.uplink = self.seq.uplink.wrapping_add(1);
                self.counters.heartbeats_sent = self.counters.heartbeats_sent.saturating_add(1);
                debug!("Heartbeat #{} sent ({} bytes)", seq, payload.len());
                sink.emit(&AppEvent::UplinkSent { kind: UplinkKind::Heartbeat, seq });
                Ok(())
            }
            Err(e) => {
                self.counters.heartbeats_failed = self.counters.heartbeats_failed.saturating_add(1);
                warn!("Heartbeat #{} failed: {}", seq, e);
                sink.emit(&AppEvent::UplinkFailed { kind: UplinkKind::Heartbeat, error: e });
                Err(e.into())
            }
        }
    }
}
