//! Runtime counters and the panic hook.
//!
//! [`RelayStats`] is assembled on demand by the dispatcher from the
//! session, the reporting tasks, the flag bus and the power-loss handler.
//! It travels in heartbeats (narrowed to `u16`) and in
//! [`AppEvent::Stats`](crate::app::events::AppEvent::Stats).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStats {
    pub uptime_secs: u64,
    pub iterations: u64,
    pub join_attempts: u32,
    pub join_failures: u32,
    pub link_losses: u32,
    pub alarms_sent: u32,
    pub alarms_failed: u32,
    pub heartbeats_sent: u32,
    pub heartbeats_failed: u32,
    pub sensor_errors: u32,
    pub recovery_replays: u32,
    pub snapshot_write_failures: u32,
    /// Flag sets that landed on an already-pending flag.
    pub flags_coalesced: u32,
}

/// Narrow a counter for the uplink, pinning at `u16::MAX`.
pub fn narrow(count: u32) -> u16 {
    u16::try_from(count).unwrap_or(u16::MAX)
}

// ───────────────────────────────────────────────────────────────
// Panic hook
// ───────────────────────────────────────────────────────────────

/// Log the panic reason before the default handler resets the chip.
///
/// Nothing is persisted from panic context: the power-loss snapshot path
/// is the only writer the store sees outside the main loop.
pub fn install_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        let reason = if let Some(msg) = info.payload().downcast_ref::<&str>() {
            *msg
        } else if let Some(msg) = info.payload().downcast_ref::<String>() {
            msg.as_str()
        } else {
            "unknown panic"
        };

        match info.location() {
            Some(loc) => log::error!("PANIC at {}:{}: {}", loc.file(), loc.line(), reason),
            None => log::error!("PANIC: {}", reason),
        }
    }));
}
