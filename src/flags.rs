//! Interrupt-safe flag bus.
//!
//! Flags are produced by:
//! - Timer callbacks (sensor-poll cadence, heartbeat cadence)
//! - The voltage-sense ISR (power-down in progress)
//!
//! and consumed by the dispatcher, which clears each flag immediately
//! before running the task it triggers.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Timer cb    │────▶│  Flag Bus    │────▶│  Dispatcher  │
//! │ Vdetect ISR │────▶│ (atomic bits)│     │  (consumer)  │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Unlike a queue, a flag cannot overflow: setting a flag that is already
//! pending coalesces into the single pending execution.  Coalesced sets are
//! counted so the heartbeat can report a dispatcher falling behind.

use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

/// Every flag the dispatcher knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Flag {
    /// Periodic detector poll is due.
    SensorPoll = 0,
    /// Periodic heartbeat uplink is due.
    Heartbeat = 1,
    /// Supply voltage collapsed; diagnostic marker only.
    PowerDown = 2,
}

impl Flag {
    pub const COUNT: usize = 3;

    pub const ALL: [Flag; Flag::COUNT] = [Flag::SensorPoll, Flag::Heartbeat, Flag::PowerDown];

    const fn index(self) -> usize {
        self as usize
    }
}

/// A fixed set of take-and-clear cells, one per [`Flag`].
///
/// Single consumer by construction: only the dispatcher calls
/// [`take`](Self::take).  Any context may call [`set`](Self::set).
pub struct FlagBus {
    pending: [AtomicBool; Flag::COUNT],
    coalesced: [AtomicU16; Flag::COUNT],
}

impl Default for FlagBus {
    fn default() -> Self {
        Self::new()
    }
}

impl FlagBus {
    pub const fn new() -> Self {
        Self {
            pending: [const { AtomicBool::new(false) }; Flag::COUNT],
            coalesced: [const { AtomicU16::new(0) }; Flag::COUNT],
        }
    }

    /// Raise a flag.  Safe to call from ISR context (one atomic swap).
    ///
    /// Returns `true` if the flag was newly raised, `false` if it was
    /// already pending and the set was coalesced.
    pub fn set(&self, flag: Flag) -> bool {
        let was_pending = self.pending[flag.index()].swap(true, Ordering::AcqRel);
        if was_pending {
            // Saturating.
            let _ = self.coalesced[flag.index()].fetch_update(
                Ordering::Relaxed,
                Ordering::Relaxed,
                |n| n.checked_add(1),
            );
        }
        !was_pending
    }

    /// Read-and-clear.  Returns `true` exactly once per raised flag.
    pub fn take(&self, flag: Flag) -> bool {
        self.pending[flag.index()].swap(false, Ordering::AcqRel)
    }

    /// Peek without clearing (diagnostics and tests only).
    pub fn is_pending(&self, flag: Flag) -> bool {
        self.pending[flag.index()].load(Ordering::Acquire)
    }

    /// Number of sets absorbed while `flag` was already pending.
    pub fn coalesced(&self, flag: Flag) -> u16 {
        self.coalesced[flag.index()].load(Ordering::Relaxed)
    }
}
