//! Status LED: derived status plus a blink-pattern engine.
//!
//! The status is recomputed from session and alarm state every iteration;
//! it is operator feedback only and nothing reads it back as truth.
//!
//! ## Priority (highest first)
//!
//! 1. **Alarm** — gas alarm active
//! 2. **SensorFault** — detector reports a fault or stopped answering
//! 3. **Session** — joining / disconnected / online
//!
//! ## Patterns (single-colour LED)
//!
//! | Status       | Pattern                         | Period |
//! |--------------|---------------------------------|--------|
//! | Off          | dark                            | —      |
//! | Joining      | 50 % square wave                | 1 s    |
//! | Disconnected | two quick flashes, then pause   | 2 s    |
//! | Online       | 50 ms blip                      | 4 s    |
//! | Alarm        | fast square wave                | 250 ms |
//! | SensorFault  | long on, short off              | 1 s    |

use serde::{Deserialize, Serialize};

use crate::session::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum LedStatus {
    Off = 0,
    Joining = 1,
    Disconnected = 2,
    Online = 3,
    Alarm = 4,
    SensorFault = 5,
}

impl LedStatus {
    /// Derive the operator-facing status.
    pub fn derive(session: SessionState, alarm_active: bool, detector_fault: bool) -> Self {
        if alarm_active {
            Self::Alarm
        } else if detector_fault {
            Self::SensorFault
        } else {
            match session {
                SessionState::Disconnected => Self::Disconnected,
                SessionState::Joining => Self::Joining,
                SessionState::Online => Self::Online,
            }
        }
    }
}

/// Blink pattern generator.  Stack-allocated, no heap.
pub struct LedPatternEngine {
    phase_ms: u32,
    status: LedStatus,
}

impl Default for LedPatternEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LedPatternEngine {
    pub fn new() -> Self {
        Self {
            phase_ms: 0,
            status: LedStatus::Off,
        }
    }

    pub fn status(&self) -> LedStatus {
        self.status
    }

    /// Switch pattern.  The phase restarts only when the status changes.
    pub fn set_status(&mut self, status: LedStatus) {
        if status != self.status {
            self.status = status;
            self.phase_ms = 0;
        }
    }

    /// Advance by `delta_ms` and return whether the LED should be lit.
    pub fn tick(&mut self, delta_ms: u32) -> bool {
        self.phase_ms = self.phase_ms.wrapping_add(delta_ms);
        Self::lit(self.status, self.phase_ms)
    }

    fn lit(status: LedStatus, phase_ms: u32) -> bool {
        match status {
            LedStatus::Off => false,
            LedStatus::Joining => (phase_ms % 1000) < 500,
            LedStatus::Disconnected => {
                let cycle = phase_ms % 2000;
                cycle < 100 || (200..300).contains(&cycle)
            }
            LedStatus::Online => (phase_ms % 4000) < 50,
            LedStatus::Alarm => (phase_ms % 250) < 125,
            LedStatus::SensorFault => (phase_ms % 1000) < 800,
        }
    }
}
