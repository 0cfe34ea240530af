//! Outbound application events.
//!
//! The [`RelayService`](super::service::RelayService) emits these through
//! the [`EventSink`](super::ports::EventSink) port.  The log adapter renders
//! them on the diagnostic UART; tests record them.

use crate::diagnostics::RelayStats;
use crate::error::{LinkError, SensorError};
use crate::session::SessionState;
use crate::uplink::UplinkKind;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The service booted; `recovered` is true if a power-loss snapshot was found.
    Started { recovered: bool },

    /// The network session moved between states.
    SessionChanged { from: SessionState, to: SessionState },

    /// An uplink left the radio.
    UplinkSent { kind: UplinkKind, seq: u32 },

    /// An uplink attempt failed; it will be retried on its next trigger.
    UplinkFailed { kind: UplinkKind, error: LinkError },

    /// The derived alarm condition changed.
    AlarmChanged { active: bool, concentration_lel: u8 },

    /// The detector could not be read.
    SensorFailed(SensorError),

    /// A pending alarm from before the power loss was replayed.
    AlarmReplayed,

    /// The supply dropped; `stored` tells whether the snapshot reached flash.
    PowerDown { stored: bool },

    /// The supply came back without a reset and the stale record was erased.
    PowerRestored,

    /// Counter dump, sent after each heartbeat.
    Stats(RelayStats),
}
