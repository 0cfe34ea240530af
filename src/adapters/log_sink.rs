//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by rendering application events as one-line
//! tagged records on the diagnostic UART.  Verbosity follows the `log`
//! max level set from `RelayConfig::log_level`.

use log::{debug, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { recovered } => {
                info!("START | recovered_snapshot={}", recovered);
            }
            AppEvent::SessionChanged { from, to } => {
                info!("SESSION | {:?} -> {:?}", from, to);
            }
            AppEvent::UplinkSent { kind, seq } => {
                debug!("UPLINK | {:?} #{} sent", kind, seq);
            }
            AppEvent::UplinkFailed { kind, error } => {
                warn!("UPLINK | {:?} failed: {}", kind, error);
            }
            AppEvent::AlarmChanged { active, concentration_lel } => {
                info!(
                    "ALARM | {} | {}%LEL",
                    if *active { "ACTIVE" } else { "clear" },
                    concentration_lel
                );
            }
            AppEvent::SensorFailed(e) => {
                warn!("SENSOR | read failed: {}", e);
            }
            AppEvent::AlarmReplayed => {
                info!("ALARM | pending alarm from before power loss delivered");
            }
            AppEvent::PowerDown { stored } => {
                warn!(
                    "POWER | supply low, snapshot {}",
                    if *stored { "stored" } else { "NOT stored" }
                );
            }
            AppEvent::PowerRestored => {
                info!("POWER | supply restored, power-loss record discarded");
            }
            AppEvent::Stats(s) => {
                info!(
                    "STATS | up={}s iter={} | joins={}/{} lost={} | alarm={}/{} hb={}/{} | \
                     sensor_err={} replays={} snap_fail={} coalesced={}",
                    s.uptime_secs,
                    s.iterations,
                    s.join_attempts,
                    s.join_failures,
                    s.link_losses,
                    s.alarms_sent,
                    s.alarms_failed,
                    s.heartbeats_sent,
                    s.heartbeats_failed,
                    s.sensor_errors,
                    s.recovery_replays,
                    s.snapshot_write_failures,
                    s.flags_coalesced,
                );
            }
        }
    }
}
