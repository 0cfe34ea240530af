//! Relay service: the task dispatcher.
//!
//! [`RelayService`] owns the network session and the reporting tasks.  One
//! call to [`run_once`](RelayService::run_once) is one main-loop iteration;
//! the binary sleeps `loop_interval_ms` between calls.  All I/O flows
//! through port traits, so the whole dispatcher runs on the host against
//! mock adapters.
//!
//! ```text
//!  FlagBus ──take──▶ ┌──────────────────────────────┐ ──▶ RadioPort
//!  SensorPort ─────▶ │         RelayService         │ ──▶ EventSink
//!  StoragePort ◀───▶ │ Session · Reporter · Recovery│ ──▶ WatchdogPort
//!                    └──────────────┬───────────────┘
//!                                   └──prepare──▶ PowerLossHandler
//! ```
//!
//! ## Iteration order
//!
//! 0. power bookkeeping (report `Flag::PowerDown`, erase a ride-through record)
//! 1. connectivity gate (session poll)
//! 2. power-on recovery (once, on the first `Online`)
//! 3. sensor-poll     (on `Flag::SensorPoll`)
//! 4. alarm-report    (every iteration)
//! 5. heartbeat       (on `Flag::Heartbeat`)
//! 6. snapshot prepare
//! 7. watchdog kick
//!
//! Steps 3–5 run only while the session is `Online`, re-checked before each
//! one.  Flags are not taken while offline, so a trigger that arrives during
//! a rejoin stays pending and fires exactly once afterwards.

use log::{debug, info, warn};

use crate::config::RelayConfig;
use crate::diagnostics::{self, RelayStats};
use crate::flags::{Flag, FlagBus};
use crate::led::LedStatus;
use crate::power::{self, BootCause, PowerLossHandler, Snapshot};
use crate::session::{NetworkSession, SessionState, SessionTiming};

use super::events::AppEvent;
use super::ports::{EventSink, RadioPort, SensorPort, SessionInfo, StoragePort, WatchdogPort};
use super::tasks::Reporter;

// ───────────────────────────────────────────────────────────────
// Port bundle
// ───────────────────────────────────────────────────────────────

/// Everything one iteration talks to.
pub struct Ports<'p, R, S, St, W, E> {
    pub radio: &'p mut R,
    pub sensor: &'p mut S,
    pub store: &'p mut St,
    pub watchdog: &'p mut W,
    pub sink: &'p mut E,
}

/// Recovery progress for a snapshot found at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recovery {
    /// Clean boot, or recovery finished.
    Idle,
    /// Snapshot loaded; waiting for the first `Online`.
    Pending(Snapshot),
    /// Replay armed; the stored record is erased once it has been sent.
    Replaying,
    /// Nothing left to replay; the stored record still needs erasing.
    Clearing,
}

// ───────────────────────────────────────────────────────────────
// RelayService
// ───────────────────────────────────────────────────────────────

pub struct RelayService<'a> {
    flags: &'a FlagBus,
    power: &'a PowerLossHandler,
    session: NetworkSession,
    reporter: Reporter,
    recovery: Recovery,
    led: LedStatus,
    iterations: u64,
    last_now_ms: u64,
}

impl<'a> RelayService<'a> {
    /// Construct from configuration.  Call [`boot`](Self::boot) next.
    pub fn new(config: &RelayConfig, flags: &'a FlagBus, power: &'a PowerLossHandler) -> Self {
        Self {
            flags,
            power,
            session: NetworkSession::new(SessionTiming::from(config)),
            reporter: Reporter::new(config),
            recovery: Recovery::Idle,
            led: LedStatus::Off,
            iterations: 0,
            last_now_ms: 0,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Read the power-loss snapshot (the only read it ever gets) and
    /// restore counters and the last session identifiers from it.
    ///
    /// Also prepares the first in-memory snapshot, so the voltage-sense
    /// interrupt may be armed as soon as this returns.
    pub fn boot(&mut self, store: &impl StoragePort, sink: &mut impl EventSink) -> BootCause {
        let recovered = power::load_snapshot(store);

        if let Some(snap) = recovered {
            self.reporter.restore(&snap);
            if let Some(dev_addr) = snap.dev_addr {
                self.session.restore_info(SessionInfo { dev_addr });
            }
            self.recovery = Recovery::Pending(snap);
        }

        self.prepare_snapshot();
        sink.emit(&AppEvent::Started { recovered: recovered.is_some() });
        info!(
            "RelayService started ({:?} boot)",
            self.reporter.boot_cause()
        );
        self.reporter.boot_cause()
    }

    // ── Per-iteration dispatch ────────────────────────────────

    /// Run one dispatcher iteration.  Never fails; every task result is
    /// consumed here.  Returns the LED status to display.
    pub fn run_once<R, S, St, W, E>(
        &mut self,
        now_ms: u64,
        ports: &mut Ports<'_, R, S, St, W, E>,
    ) -> LedStatus
    where
        R: RadioPort,
        S: SensorPort,
        St: StoragePort,
        W: WatchdogPort,
        E: EventSink,
    {
        self.iterations = self.iterations.wrapping_add(1);
        self.last_now_ms = now_ms;

        if self.flags.take(Flag::PowerDown) {
            let stored = self.power.last_write_ok();
            debug!(
                "Power: writes={} failures={}",
                self.power.writes(),
                self.power.write_failures()
            );
            ports.sink.emit(&AppEvent::PowerDown { stored });
        }

        // A ride-through record must not survive into the next boot.  While
        // recovery is unfinished the record still owes the replay, and
        // finishing recovery clears it anyway.
        if self.recovery == Recovery::Idle {
            match self.power.discard_outdated(ports.store) {
                Ok(true) => ports.sink.emit(&AppEvent::PowerRestored),
                Ok(false) => {}
                Err(e) => warn!("Power: stale snapshot not erased ({}), retrying", e),
            }
        }

        // 1. Connectivity gate
        if let Some(t) = self.session.poll(now_ms, ports.radio) {
            ports.sink.emit(&AppEvent::SessionChanged { from: t.from, to: t.to });
        }

        if self.session.is_online() {
            // 2. Power-on recovery
            self.run_recovery(ports.store);

            // 3. Sensor-poll
            if self.flags.take(Flag::SensorPoll) {
                if let Err(e) = self.reporter.sensor_poll(ports.sensor, ports.sink) {
                    debug!("sensor-poll: {}", e);
                }
            }

            // 4. Alarm-report
            if self.session.is_online() {
                if let Err(e) = self
                    .reporter
                    .alarm_report(now_ms, &mut self.session, ports.radio, ports.sink)
                {
                    debug!("alarm-report: {}", e);
                }
            }

            // 5. Heartbeat
            if self.session.is_online() && self.flags.take(Flag::Heartbeat) {
                let led = self.derive_led();
                let join_failures = diagnostics::narrow(self.session.stats().join_failures);
                match self.reporter.heartbeat(
                    now_ms,
                    &mut self.session,
                    ports.radio,
                    led,
                    join_failures,
                    ports.sink,
                ) {
                    Ok(()) => self.emit_stats(ports.sink),
                    Err(e) => debug!("heartbeat: {}", e),
                }
            }

            self.finish_recovery(ports.store);

            // A send may have dropped the session mid-iteration.
            if !self.session.is_online() {
                ports.sink.emit(&AppEvent::SessionChanged {
                    from: SessionState::Online,
                    to: self.session.state(),
                });
            }
        }

        // 6. Snapshot prepare
        self.prepare_snapshot();
        self.led = self.derive_led();

        // 7. Watchdog kick
        ports.watchdog.feed();
        self.led
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn led_status(&self) -> LedStatus {
        self.led
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// A recovered snapshot has not been fully consumed yet.
    pub fn recovery_pending(&self) -> bool {
        self.recovery != Recovery::Idle
    }

    /// Assemble the diagnostic counters.
    pub fn stats(&self) -> RelayStats {
        let session = self.session.stats();
        let tasks = self.reporter.counters();
        let coalesced = Flag::ALL
            .iter()
            .map(|f| u32::from(self.flags.coalesced(*f)))
            .sum();
        RelayStats {
            uptime_secs: self.last_now_ms / 1000,
            iterations: self.iterations,
            join_attempts: session.join_attempts,
            join_failures: session.join_failures,
            link_losses: session.link_losses,
            alarms_sent: tasks.alarms_sent,
            alarms_failed: tasks.alarms_failed,
            heartbeats_sent: tasks.heartbeats_sent,
            heartbeats_failed: tasks.heartbeats_failed,
            sensor_errors: tasks.sensor_errors,
            recovery_replays: tasks.recovery_replays,
            snapshot_write_failures: u32::from(self.power.write_failures()),
            flags_coalesced: coalesced,
        }
    }

    /// Emit a counter dump through the sink.
    pub fn emit_stats(&self, sink: &mut impl EventSink) {
        sink.emit(&AppEvent::Stats(self.stats()));
    }

    // ── Internal ──────────────────────────────────────────────

    fn run_recovery(&mut self, store: &mut impl StoragePort) {
        let Recovery::Pending(snap) = self.recovery else {
            return;
        };

        if snap.pending_alarm {
            info!("Recovery: alarm was pending at power loss, replaying once");
            self.reporter.arm_replay();
            self.recovery = Recovery::Replaying;
        } else {
            info!("Recovery: nothing pending");
            self.recovery = Recovery::Clearing;
        }
        self.finish_recovery(store);
    }

    fn finish_recovery(&mut self, store: &mut impl StoragePort) {
        match self.recovery {
            Recovery::Replaying if !self.reporter.alarm().replay_latched => {
                self.recovery = Recovery::Clearing;
            }
            Recovery::Clearing => {}
            _ => return,
        }

        match power::clear_snapshot(store) {
            Ok(()) => {
                info!("Recovery: snapshot cleared");
                self.recovery = Recovery::Idle;
            }
            // Retried next iteration.
            Err(e) => warn!("Recovery: snapshot clear failed ({})", e),
        }
    }

    fn prepare_snapshot(&self) {
        let mut snap = self.reporter.snapshot(self.session.info().map(|i| i.dev_addr));
        // Before the first Online the recovered alarm is not latched yet.
        if let Recovery::Pending(recovered) = self.recovery {
            snap.pending_alarm |= recovered.pending_alarm;
        }
        self.power.prepare(&snap);
    }

    fn derive_led(&self) -> LedStatus {
        let alarm = self.reporter.alarm();
        LedStatus::derive(self.session.state(), alarm.active, alarm.fault)
    }
}
