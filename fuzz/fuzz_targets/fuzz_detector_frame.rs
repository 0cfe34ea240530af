//! Fuzz target: `detector::decode_frame`
//!
//! Feeds arbitrary text lines from the detector UART into the frame
//! decoder.  It must never panic, and every accepted frame must survive a
//! re-encode unchanged (modulo case and surrounding whitespace).
//!
//! cargo fuzz run fuzz_detector_frame

#![no_main]

use gasrelay::adapters::detector::{decode_frame, encode_frame};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(line) = core::str::from_utf8(data) else {
        return;
    };
    if let Ok(body) = decode_frame(line) {
        let encoded = encode_frame(&body);
        assert!(encoded.eq_ignore_ascii_case(line.trim()));
        assert_eq!(decode_frame(&encoded), Ok(body));
    }
});
