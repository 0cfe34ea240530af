//! Software periodic timers that raise flags.
//!
//! On the device the esp_timer callbacks in
//! [`drivers::hw_timer`](crate::drivers::hw_timer) set the flags.  On the
//! host (simulation and tests) [`FlagTimers::fire_due`] plays the same role
//! from a caller-supplied clock, so a whole run can be driven
//! deterministically.

use crate::config::RelayConfig;
use crate::flags::{Flag, FlagBus};

/// Fixed-period deadline.  Missed periods collapse into one firing.
#[derive(Debug, Clone, Copy)]
pub struct PeriodicTimer {
    period_ms: u64,
    next_due_ms: u64,
}

impl PeriodicTimer {
    /// First firing one full period after `start_ms`.
    pub fn new(period_ms: u64, start_ms: u64) -> Self {
        let period_ms = period_ms.max(1);
        Self {
            period_ms,
            next_due_ms: start_ms.saturating_add(period_ms),
        }
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    /// `true` once per elapsed period.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        if now_ms < self.next_due_ms {
            return false;
        }
        let late = now_ms - self.next_due_ms;
        // Skip whole periods we slept through instead of bursting.
        self.next_due_ms = self
            .next_due_ms
            .saturating_add(self.period_ms.saturating_mul(late / self.period_ms + 1));
        true
    }
}

/// The two periodic producers of the flag bus.
pub struct FlagTimers {
    sensor_poll: PeriodicTimer,
    heartbeat: PeriodicTimer,
}

impl FlagTimers {
    pub fn new(cfg: &RelayConfig, start_ms: u64) -> Self {
        Self {
            sensor_poll: PeriodicTimer::new(u64::from(cfg.sensor_poll_interval_ms), start_ms),
            heartbeat: PeriodicTimer::new(cfg.heartbeat_interval_ms(), start_ms),
        }
    }

    /// Set every flag whose period has elapsed.
    pub fn fire_due(&mut self, now_ms: u64, flags: &FlagBus) {
        if self.sensor_poll.poll(now_ms) {
            flags.set(Flag::SensorPoll);
        }
        if self.heartbeat.poll(now_ms) {
            flags.set(Flag::Heartbeat);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_per_period() {
        let mut t = PeriodicTimer::new(100, 0);
        assert!(!t.poll(0));
        assert!(!t.poll(99));
        assert!(t.poll(100));
        assert!(!t.poll(150));
        assert!(t.poll(200));
    }

    #[test]
    fn long_stall_fires_once() {
        let mut t = PeriodicTimer::new(100, 0);
        assert!(t.poll(1_050));
        assert!(!t.poll(1_099));
        assert!(t.poll(1_100));
    }

    #[test]
    fn poll_near_clock_end_saturates() {
        let mut t = PeriodicTimer::new(1_000, 0);
        assert!(t.poll(u64::MAX - 1));
        assert!(!t.poll(u64::MAX - 1));
    }

    #[test]
    fn zero_period_is_clamped() {
        let mut t = PeriodicTimer::new(0, 0);
        assert_eq!(t.period_ms(), 1);
        assert!(t.poll(1));
    }

    #[test]
    fn flag_timers_follow_config() {
        let cfg = RelayConfig {
            sensor_poll_interval_ms: 1_000,
            heartbeat_interval_secs: 5,
            ..RelayConfig::default()
        };
        let flags = FlagBus::new();
        let mut timers = FlagTimers::new(&cfg, 0);

        let mut polls = 0;
        let mut beats = 0;
        for now in (0..=10_000).step_by(100) {
            timers.fire_due(now, &flags);
            polls += u32::from(flags.take(Flag::SensorPoll));
            beats += u32::from(flags.take(Flag::Heartbeat));
        }
        assert_eq!(polls, 10);
        assert_eq!(beats, 2);
    }
}
