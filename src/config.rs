//! System configuration parameters
//!
//! Every cadence, guard interval and threshold the dispatcher uses lives
//! here rather than falling out of loop speed.  Values can be overridden
//! from NVS at boot.

use serde::{Deserialize, Serialize};

/// Radio exchanges one online iteration can make: link check, alarm
/// report and heartbeat.
pub const MAX_RADIO_EXCHANGES_PER_ITERATION: u64 = 3;

/// Core relay configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    // --- Dispatcher ---
    /// Delay between dispatcher iterations (milliseconds)
    pub loop_interval_ms: u32,
    /// Task watchdog timeout (milliseconds)
    pub watchdog_timeout_ms: u32,

    // --- Reporting cadence ---
    /// Detector poll period (milliseconds)
    pub sensor_poll_interval_ms: u32,
    /// Heartbeat uplink period (seconds)
    pub heartbeat_interval_secs: u32,
    /// Minimum spacing between alarm-report attempts (milliseconds)
    pub alarm_report_min_interval_ms: u32,

    // --- Network session ---
    /// Minimum spacing between join attempts (milliseconds)
    pub join_retry_interval_ms: u32,
    /// Give up on a join that has not been acknowledged (milliseconds)
    pub join_timeout_ms: u32,
    /// Period of the module status query while online (milliseconds)
    pub link_check_interval_ms: u32,
    /// Consecutive transient uplink failures that count as link loss
    pub max_consecutive_send_failures: u8,

    // --- Bounded waits ---
    /// Radio module response timeout (milliseconds)
    pub radio_response_timeout_ms: u32,
    /// Detector response timeout (milliseconds)
    pub sensor_response_timeout_ms: u32,

    // --- Uplink ports ---
    /// LoRaWAN application port for alarm reports
    pub alarm_port: u8,
    /// LoRaWAN application port for heartbeats
    pub heartbeat_port: u8,

    // --- Diagnostics ---
    /// Log level: 0 = off, 1 = error … 5 = trace
    pub log_level: u8,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            // Dispatcher
            loop_interval_ms: 200,
            watchdog_timeout_ms: 10_000,

            // Reporting cadence
            sensor_poll_interval_ms: 2_000,
            heartbeat_interval_secs: 3_600, // 1/h
            alarm_report_min_interval_ms: 60_000,

            // Network session
            join_retry_interval_ms: 30_000,
            join_timeout_ms: 20_000,
            link_check_interval_ms: 300_000,
            max_consecutive_send_failures: 3,

            // Bounded waits
            radio_response_timeout_ms: 3_000,
            sensor_response_timeout_ms: 500,

            // Uplink ports
            alarm_port: 10,
            heartbeat_port: 11,

            log_level: 3,
        }
    }
}

impl RelayConfig {
    /// Heartbeat period in milliseconds.
    pub fn heartbeat_interval_ms(&self) -> u64 {
        u64::from(self.heartbeat_interval_secs) * 1000
    }

    /// Longest one dispatcher iteration can go between watchdog feeds:
    /// the loop delay, every radio exchange at its full deadline and one
    /// detector read.
    pub fn worst_case_iteration_ms(&self) -> u64 {
        u64::from(self.loop_interval_ms)
            + MAX_RADIO_EXCHANGES_PER_ITERATION * u64::from(self.radio_response_timeout_ms)
            + u64::from(self.sensor_response_timeout_ms)
    }

    /// Map `log_level` onto the `log` crate's filter.
    pub fn level_filter(&self) -> log::LevelFilter {
        match self.log_level {
            0 => log::LevelFilter::Off,
            1 => log::LevelFilter::Error,
            2 => log::LevelFilter::Warn,
            3 => log::LevelFilter::Info,
            4 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}
