//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ RelayService (domain)
//! ```
//!
//! Driven adapters (detector, radio, store, watchdog, event sinks) implement
//! these traits.  The [`RelayService`](super::service::RelayService) consumes
//! them via generics, so the dispatcher never touches a UART or a flash page
//! directly.
//!
//! ## Timing contract
//!
//! Every call that talks to a peripheral returns within its bounded wait
//! (see [`RelayConfig`]); a peripheral that does not answer in time is a
//! failed exchange, never a blocked dispatcher.

use serde::{Deserialize, Serialize};

use crate::config::RelayConfig;
use crate::error::{LinkError, SensorError};

pub use crate::error::StorageError;

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: detector → domain)
// ───────────────────────────────────────────────────────────────

/// One decoded answer from the gas detector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorReading {
    /// The detector's own alarm output is asserted.
    pub alarm: bool,
    /// The detector reports a sensing-element fault.
    pub fault: bool,
    /// Gas concentration in %LEL (0–100).
    pub concentration_lel: u8,
}

/// Read-side port: the dispatcher calls this to query the detector.
pub trait SensorPort {
    /// Ask the detector for its current alarm state.
    fn read_alarm_state(&mut self) -> Result<SensorReading, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Radio port (driven adapter: domain ↔ LoRaWAN module)
// ───────────────────────────────────────────────────────────────

/// Factory 64-bit identifier of the radio module.
pub type DeviceEui = [u8; 8];

/// Identifiers handed out by the network on a successful join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub dev_addr: u32,
}

/// Progress of an outstanding join request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPoll {
    /// No answer from the network yet.
    Pending,
    /// Join accepted.
    Joined(SessionInfo),
    /// Join rejected or the module gave up.
    Failed,
}

/// Result of a module status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Joined,
    NotJoined,
}

/// Command/response port to the radio module.  The command grammar is the
/// adapter's business; the dispatcher only sees these operations.
pub trait RadioPort {
    /// Reset the module and push the static network configuration.
    fn configure(&mut self) -> Result<(), LinkError>;

    /// Read the module's factory DevEUI.
    fn device_eui(&mut self) -> Result<DeviceEui, LinkError>;

    /// Start an over-the-air join.  Returns once the module accepted the
    /// request; the outcome arrives through [`poll_join`](Self::poll_join).
    fn request_join(&mut self) -> Result<(), LinkError>;

    /// Non-blocking check on the outstanding join.
    fn poll_join(&mut self) -> JoinPoll;

    /// Transmit one uplink on `port`.
    fn send_uplink(&mut self, port: u8, payload: &[u8]) -> Result<(), LinkError>;

    /// Ask the module whether it still holds a network session.
    fn query_status(&mut self) -> Result<LinkStatus, LinkError>;
}

// ───────────────────────────────────────────────────────────────
// Watchdog port
// ───────────────────────────────────────────────────────────────

/// Liveness port: fed once per dispatcher iteration.
pub trait WatchdogPort {
    fn feed(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → diagnostics)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port
// ───────────────────────────────────────────────────────────────

/// Loads and persists relay configuration.
///
/// Implementations MUST validate before persisting; out-of-range values are
/// rejected with [`ConfigError::ValidationFailed`], not clamped.
pub trait ConfigPort {
    /// Returns [`RelayConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<RelayConfig, ConfigError>;

    fn save(&mut self, config: &RelayConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ emulated EEPROM / NVS)
// ───────────────────────────────────────────────────────────────

/// Persistent key→bytes storage.
///
/// # Interrupt safety
///
/// `write` is called from the voltage-sense interrupt.  Implementations
/// must not allocate or iterate without bound on that path.  A write torn
/// by total power loss is an accepted loss; callers validate on read.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`;
    /// [`StorageError::NotFound`] means absent.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Erase a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
