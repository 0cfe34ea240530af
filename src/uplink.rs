//! Uplink payload construction.
//!
//! Payloads are postcard-encoded into a fixed-capacity buffer sized for the
//! smallest LoRaWAN data rate, so building an uplink never touches the heap.
//! Each kind travels on its own application port (see
//! [`RelayConfig`](crate::config::RelayConfig)), which is how the gateway
//! tells them apart.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::led::LedStatus;
use crate::power::BootCause;

/// Largest application payload accepted at DR0.
pub const MAX_UPLINK_LEN: usize = 51;

pub type UplinkBuf = heapless::Vec<u8, MAX_UPLINK_LEN>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UplinkKind {
    Alarm,
    Heartbeat,
}

/// Alarm report body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmReport {
    pub seq: u32,
    pub concentration_lel: u8,
    pub detector_fault: bool,
    /// Sent on behalf of an alarm that was pending when power failed.
    pub replayed: bool,
}

/// Liveness report body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub seq: u32,
    pub led: LedStatus,
    pub alarm_active: bool,
    pub detector_fault: bool,
    pub concentration_lel: u8,
    pub boot_cause: BootCause,
    pub join_failures: u16,
    pub uplink_failures: u16,
    pub sensor_errors: u16,
}

/// Encode any uplink body into a bounded buffer.
pub fn encode<T: Serialize>(body: &T) -> Result<UplinkBuf, Error> {
    let mut raw = [0u8; MAX_UPLINK_LEN];
    let used = postcard::to_slice(body, &mut raw).map_err(|_| Error::Encode)?;
    UplinkBuf::from_slice(used).map_err(|_| Error::Encode)
}
