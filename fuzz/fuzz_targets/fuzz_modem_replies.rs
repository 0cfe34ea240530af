//! Fuzz target: `LoraModem` reply parsing
//!
//! Scripts the simulated modem link with arbitrary reply lines (split on
//! newlines) and runs every `RadioPort` operation against them.  Nothing
//! may panic, and an exchange must always terminate once the scripted
//! lines run out.
//!
//! cargo fuzz run fuzz_modem_replies

#![no_main]

use gasrelay::adapters::radio::LoraModem;
use gasrelay::adapters::uart::SimLink;
use gasrelay::app::ports::RadioPort;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    let lines: Vec<&str> = text.lines().collect();

    let mut link = SimLink::new();
    for cmd in ["AT", "AT+DEVEUI?", "AT+JOIN", "AT+SEND", "AT+STATUS?"] {
        link.reply_always(cmd, &lines);
    }
    for line in &lines {
        link.push_unsolicited(line);
    }

    let mut modem = LoraModem::new(link, 10);
    let _ = modem.configure();
    let _ = modem.device_eui();
    let _ = modem.request_join();
    let _ = modem.poll_join();
    let _ = modem.send_uplink(10, data.get(..51).unwrap_or(data));
    let _ = modem.query_status();
    let _ = modem.poll_join();
});
