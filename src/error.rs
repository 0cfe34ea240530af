//! Unified error types for the GasRelay firmware.
//!
//! One `Copy` enum per subsystem plus a top-level [`Error`] every subsystem
//! converts into.  None of these ever escape the dispatcher loop: tasks
//! return them, the dispatcher logs and counts them, and the loop carries on.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The radio link refused or lost an exchange.
    Link(LinkError),
    /// The alarm detector could not be read.
    Sensor(SensorError),
    /// The non-volatile store failed.
    Storage(StorageError),
    /// An uplink payload could not be encoded.
    Encode,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Encode => write!(f, "payload encoding failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Radio link errors
// ---------------------------------------------------------------------------

/// Failures reported by the radio module or the session gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// No network session: the module (or the session gate) refused.
    NotJoined,
    /// The module reported the network session as lost.
    LinkLost,
    /// No response within the bounded wait.
    Timeout,
    /// The module is busy with a previous exchange (duty-cycle limit).
    Busy,
    /// The module answered with something the adapter could not parse.
    BadResponse,
    /// Payload exceeds the maximum uplink size.
    PayloadTooLarge,
}

impl LinkError {
    /// Whether the error means the session is gone, not just this exchange.
    pub const fn is_link_loss(self) -> bool {
        matches!(self, Self::NotJoined | Self::LinkLost)
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotJoined => write!(f, "not joined"),
            Self::LinkLost => write!(f, "link lost"),
            Self::Timeout => write!(f, "response timeout"),
            Self::Busy => write!(f, "module busy"),
            Self::BadResponse => write!(f, "unparseable response"),
            Self::PayloadTooLarge => write!(f, "payload too large"),
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Detector errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// The detector did not answer within the bounded wait.
    Timeout,
    /// The answer failed framing or checksum validation.
    BadFrame,
    /// The serial link itself failed.
    LinkFailed,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "detector timeout"),
            Self::BadFrame => write!(f, "bad detector frame"),
            Self::LinkFailed => write!(f, "detector link failed"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Errors from [`StoragePort`](crate::app::ports::StoragePort) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// The store has no room for another key or the value is too large.
    Full,
    /// Generic I/O error from the backend.
    IoError,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
