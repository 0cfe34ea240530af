//! Fuzz target: `Snapshot::decode`
//!
//! The snapshot record is read back from flash after an unclean power cut,
//! so any byte pattern (torn write, erased page, stale layout) can show up.
//! Decoding must never panic, and anything it accepts must survive a
//! re-encode unchanged.
//!
//! cargo fuzz run fuzz_snapshot_decode

#![no_main]

use gasrelay::power::{Snapshot, SNAPSHOT_MAX_LEN};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Some(snap) = Snapshot::decode(data) {
        assert!(data.len() <= SNAPSHOT_MAX_LEN, "accepted an oversized record");
        let again = snap.encode().expect("decoded snapshot must re-encode");
        assert_eq!(Snapshot::decode(&again), Some(snap));
    }
});
