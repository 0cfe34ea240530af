//! Power-loss detect and recover.
//!
//! Two halves with very different urgency:
//!
//! ```text
//!  main loop (every iteration)          voltage-sense ISR (once)
//!  ───────────────────────────          ────────────────────────
//!  Snapshot ──encode──▶ prepared bytes ──copy──▶ StoragePort::write
//!                                                   │
//!  boot ◀──────────── load_snapshot ◀───────────────┘
//!   │
//!   └─▶ first Online: replay pending alarm once, clear_snapshot
//! ```
//!
//! The interrupt half only copies bytes the main loop already encoded, so
//! it never allocates, never serialises and never talks to the radio.  The
//! hold-up capacitance has to cover exactly one small store write.
//!
//! A write cut short by total power loss is an accepted loss: the record
//! carries a magic byte and version, and anything that does not decode
//! cleanly at boot is treated as "no snapshot".
//!
//! If the supply comes back without a reset the record describes a moment
//! that has passed.  [`PowerLossHandler::discard_outdated`] erases it, so a
//! later watchdog or panic reset boots clean.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use critical_section::Mutex;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{StorageError, StoragePort};
use crate::flags::{Flag, FlagBus};

pub const SNAPSHOT_NAMESPACE: &str = "pwr";
pub const SNAPSHOT_KEY: &str = "snap";

const SNAPSHOT_MAGIC: u8 = 0xA5;
const SNAPSHOT_VERSION: u8 = 1;

/// Upper bound of an encoded record (header + worst-case varints).
pub const SNAPSHOT_MAX_LEN: usize = 32;

pub type SnapshotBuf = heapless::Vec<u8, SNAPSHOT_MAX_LEN>;

// ---------------------------------------------------------------------------
// Snapshot record
// ---------------------------------------------------------------------------

/// Runtime state that must survive a power cut.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// An alarm was active (or still owed to the gateway) at power loss.
    pub pending_alarm: bool,
    pub alarm_seq: u32,
    pub heartbeat_seq: u32,
    pub uplink_seq: u32,
    /// DevAddr of the last network session.
    pub dev_addr: Option<u32>,
}

#[derive(Serialize, Deserialize)]
struct Record {
    magic: u8,
    version: u8,
    snapshot: Snapshot,
}

impl Snapshot {
    pub fn encode(&self) -> Option<SnapshotBuf> {
        let record = Record {
            magic: SNAPSHOT_MAGIC,
            version: SNAPSHOT_VERSION,
            snapshot: *self,
        };
        let mut raw = [0u8; SNAPSHOT_MAX_LEN];
        let used = postcard::to_slice(&record, &mut raw).ok()?;
        SnapshotBuf::from_slice(used).ok()
    }

    /// Decode a stored record.  `None` for anything torn, foreign or stale.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let (record, rest) = postcard::take_from_bytes::<Record>(bytes).ok()?;
        if !rest.is_empty() || record.magic != SNAPSHOT_MAGIC || record.version != SNAPSHOT_VERSION
        {
            return None;
        }
        Some(record.snapshot)
    }
}

/// Why the device is running, as far as the core can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootCause {
    /// No snapshot at boot.
    Clean,
    /// A power-loss snapshot was found at boot.
    PowerLoss,
}

// ---------------------------------------------------------------------------
// Detect-and-snapshot half
// ---------------------------------------------------------------------------

/// Holds the pre-encoded snapshot and performs the urgent write.
///
/// `const`-constructible so firmware can keep it in a `static` shared with
/// the voltage-sense ISR.
pub struct PowerLossHandler {
    prepared: Mutex<RefCell<SnapshotBuf>>,
    latched: AtomicBool,
    /// The supply came back after a write; the stored record is stale.
    outdated: AtomicBool,
    last_write_ok: AtomicBool,
    writes: AtomicU16,
    write_failures: AtomicU16,
}

impl Default for PowerLossHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerLossHandler {
    pub const fn new() -> Self {
        Self {
            prepared: Mutex::new(RefCell::new(heapless::Vec::new())),
            latched: AtomicBool::new(false),
            outdated: AtomicBool::new(false),
            last_write_ok: AtomicBool::new(false),
            writes: AtomicU16::new(0),
            write_failures: AtomicU16::new(0),
        }
    }

    /// Main-loop side: encode the latest runtime state so the ISR has
    /// nothing left to compute.
    pub fn prepare(&self, snapshot: &Snapshot) {
        let Some(encoded) = snapshot.encode() else {
            warn!("Power: snapshot does not fit {} bytes", SNAPSHOT_MAX_LEN);
            return;
        };
        critical_section::with(|cs| {
            *self.prepared.borrow_ref_mut(cs) = encoded;
        });
    }

    /// Interrupt side: supply voltage crossed the low threshold.
    ///
    /// Raises [`Flag::PowerDown`] and writes the prepared bytes.  Fires at
    /// most once until [`on_voltage_restored`](Self::on_voltage_restored).
    /// Returns `true` if the record reached the store.  Does not log.
    pub fn on_voltage_low(&self, flags: &FlagBus, store: &mut impl StoragePort) -> bool {
        if self.latched.swap(true, Ordering::AcqRel) {
            return false;
        }
        flags.set(Flag::PowerDown);

        let written = critical_section::with(|cs| {
            let prepared = self.prepared.borrow_ref(cs);
            !prepared.is_empty()
                && store
                    .write(SNAPSHOT_NAMESPACE, SNAPSHOT_KEY, prepared.as_slice())
                    .is_ok()
        });

        self.last_write_ok.store(written, Ordering::Release);
        if written {
            self.writes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
        }
        written
    }

    /// The supply recovered without a reset (brown-out ride-through).
    ///
    /// Marks the record written on the way down as outdated; the main loop
    /// erases it through [`discard_outdated`](Self::discard_outdated).
    pub fn on_voltage_restored(&self) {
        if self.latched.swap(false, Ordering::AcqRel) {
            self.outdated.store(true, Ordering::Release);
        }
    }

    /// A ride-through left a record behind that has not been erased yet.
    pub fn has_outdated_record(&self) -> bool {
        self.outdated.load(Ordering::Acquire)
    }

    /// Main-loop side: erase the record a ride-through left behind.
    ///
    /// Returns `Ok(true)` if a record was superseded.  Does nothing while a
    /// new supply drop is latched, since that drop owns the record now.
    pub fn discard_outdated(&self, store: &mut impl StoragePort) -> Result<bool, StorageError> {
        if !self.has_outdated_record() {
            return Ok(false);
        }
        critical_section::with(|_| {
            if self.is_latched() {
                return Ok(false);
            }
            match clear_snapshot(store) {
                Ok(()) | Err(StorageError::NotFound) => {
                    self.outdated.store(false, Ordering::Release);
                    Ok(true)
                }
                Err(e) => Err(e),
            }
        })
    }

    /// A power-down write has happened and the supply has not recovered.
    pub fn is_latched(&self) -> bool {
        self.latched.load(Ordering::Acquire)
    }

    /// Outcome of the most recent supply-drop write.
    pub fn last_write_ok(&self) -> bool {
        self.last_write_ok.load(Ordering::Acquire)
    }

    pub fn writes(&self) -> u16 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn write_failures(&self) -> u16 {
        self.write_failures.load(Ordering::Relaxed)
    }

    /// Copy of the currently prepared bytes.
    pub fn prepared(&self) -> SnapshotBuf {
        critical_section::with(|cs| self.prepared.borrow_ref(cs).clone())
    }
}

// ---------------------------------------------------------------------------
// Recover-on-boot half
// ---------------------------------------------------------------------------

/// Read the snapshot once at boot.  Absent or undecodable means no recovery.
pub fn load_snapshot(store: &impl StoragePort) -> Option<Snapshot> {
    let mut buf = [0u8; SNAPSHOT_MAX_LEN];
    match store.read(SNAPSHOT_NAMESPACE, SNAPSHOT_KEY, &mut buf) {
        Ok(len) => match Snapshot::decode(&buf[..len]) {
            Some(snap) => {
                info!(
                    "Power: snapshot found (pending_alarm={}, uplink_seq={})",
                    snap.pending_alarm, snap.uplink_seq
                );
                Some(snap)
            }
            None => {
                warn!("Power: snapshot record invalid ({} bytes), ignoring", len);
                None
            }
        },
        Err(StorageError::NotFound) => {
            info!("Power: no snapshot, clean boot");
            None
        }
        Err(e) => {
            warn!("Power: snapshot read failed ({}), ignoring", e);
            None
        }
    }
}

/// Supersede the stored snapshot once recovery has consumed it.
pub fn clear_snapshot(store: &mut impl StoragePort) -> Result<(), StorageError> {
    store.delete(SNAPSHOT_NAMESPACE, SNAPSHOT_KEY)
}
