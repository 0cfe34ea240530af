//! LoRaWAN modem adapter (AT command set over a [`LineLink`]).
//!
//! ```text
//!  configure   AT / AT+OTAA=1 / AT+CLASS=A / AT+ADR=1   → OK
//!  device_eui  AT+DEVEUI?        → +DEVEUI:70B3D57ED0001234, OK
//!  join        AT+JOIN=1         → OK     … later URC +JOIN:OK,2601ABCD | +JOIN:FAIL
//!  send        AT+SEND=<port>,<hex>  → OK | ERROR:<reason>
//!  status      AT+STATUS?        → +STATUS:JOINED | +STATUS:IDLE, OK
//! ```
//!
//! Every exchange, from command to final `OK`/`ERROR`, is bounded by
//! `radio_response_timeout_ms`.  The join
//! outcome arrives as an unsolicited line, so it may show up in the middle
//! of another exchange; it is parked until [`poll_join`](RadioPort::poll_join)
//! collects it.

use core::fmt::Write;

use log::{debug, warn};

use super::uart::{Line, LineLink, UartError};
use crate::app::ports::{DeviceEui, JoinPoll, LinkStatus, RadioPort, SessionInfo};
use crate::error::LinkError;
use crate::uplink::MAX_UPLINK_LEN;

/// `AT+SEND=223,` + two hex chars per payload byte.
type CommandBuf = heapless::String<{ 16 + 2 * MAX_UPLINK_LEN }>;

const CONFIG_COMMANDS: [&str; 4] = ["AT", "AT+OTAA=1", "AT+CLASS=A", "AT+ADR=1"];

pub struct LoraModem<L> {
    link: L,
    response_timeout_ms: u32,
    /// Join outcome seen outside `poll_join`.
    parked_join: Option<JoinPoll>,
}

impl<L: LineLink> LoraModem<L> {
    pub fn new(link: L, response_timeout_ms: u32) -> Self {
        Self {
            link,
            response_timeout_ms,
            parked_join: None,
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Send one command and collect its reply up to `OK`/`ERROR`.
    /// Returns the `+…` data line, if the reply carried one.
    ///
    /// The whole exchange shares one `response_timeout_ms` budget, however
    /// many lines the module sends before the final result.
    fn exchange(&mut self, command: &str) -> Result<Option<Line>, LinkError> {
        self.link.write_line(command).map_err(|_| LinkError::BadResponse)?;

        let deadline = self
            .link
            .now_ms()
            .saturating_add(u64::from(self.response_timeout_ms));
        let mut data = None;
        loop {
            let remaining = deadline.saturating_sub(self.link.now_ms());
            let read = if remaining == 0 {
                Err(UartError::Timeout)
            } else {
                self.link.read_line(remaining as u32)
            };
            let line = match read {
                Ok(line) => line,
                Err(UartError::Timeout) => {
                    warn!("Radio: no final reply to '{}'", command);
                    self.link.flush_input();
                    return Err(LinkError::Timeout);
                }
                Err(_) => return Err(LinkError::BadResponse),
            };

            if let Some(join) = parse_join_urc(&line) {
                self.parked_join = Some(join);
                continue;
            }
            match line.as_str() {
                "OK" => return Ok(data),
                l if l.starts_with("ERROR") => return Err(parse_error(l)),
                l if l.starts_with('+') => data = Some(line),
                other => debug!("Radio: ignoring '{}'", other),
            }
        }
    }
}

impl<L: LineLink> RadioPort for LoraModem<L> {
    fn configure(&mut self) -> Result<(), LinkError> {
        self.link.flush_input();
        self.parked_join = None;
        for cmd in CONFIG_COMMANDS {
            self.exchange(cmd)?;
        }
        Ok(())
    }

    fn device_eui(&mut self) -> Result<DeviceEui, LinkError> {
        let line = self.exchange("AT+DEVEUI?")?.ok_or(LinkError::BadResponse)?;
        let hex = line
            .strip_prefix("+DEVEUI:")
            .ok_or(LinkError::BadResponse)?;
        let mut eui: DeviceEui = [0; 8];
        decode_hex(hex.trim(), &mut eui).ok_or(LinkError::BadResponse)?;
        Ok(eui)
    }

    fn request_join(&mut self) -> Result<(), LinkError> {
        self.parked_join = None;
        self.exchange("AT+JOIN=1").map(|_| ())
    }

    fn poll_join(&mut self) -> JoinPoll {
        if let Some(outcome) = self.parked_join.take() {
            return outcome;
        }
        // Only lines already buffered; never waits.
        while let Ok(line) = self.link.read_line(0) {
            if let Some(outcome) = parse_join_urc(&line) {
                return outcome;
            }
        }
        JoinPoll::Pending
    }

    fn send_uplink(&mut self, port: u8, payload: &[u8]) -> Result<(), LinkError> {
        if payload.len() > MAX_UPLINK_LEN {
            return Err(LinkError::PayloadTooLarge);
        }
        let mut cmd = CommandBuf::new();
        write!(cmd, "AT+SEND={},", port).map_err(|_| LinkError::PayloadTooLarge)?;
        for b in payload {
            write!(cmd, "{:02X}", b).map_err(|_| LinkError::PayloadTooLarge)?;
        }
        self.exchange(&cmd).map(|_| ())
    }

    fn query_status(&mut self) -> Result<LinkStatus, LinkError> {
        let line = self.exchange("AT+STATUS?")?.ok_or(LinkError::BadResponse)?;
        match line.strip_prefix("+STATUS:") {
            Some("JOINED") => Ok(LinkStatus::Joined),
            Some(_) => Ok(LinkStatus::NotJoined),
            None => Err(LinkError::BadResponse),
        }
    }
}

// ── Reply parsing ─────────────────────────────────────────────

fn parse_join_urc(line: &str) -> Option<JoinPoll> {
    let rest = line.strip_prefix("+JOIN:")?;
    if let Some(addr) = rest.strip_prefix("OK,") {
        return match u32::from_str_radix(addr.trim(), 16) {
            Ok(dev_addr) => Some(JoinPoll::Joined(SessionInfo { dev_addr })),
            Err(_) => Some(JoinPoll::Failed),
        };
    }
    Some(JoinPoll::Failed)
}

fn parse_error(line: &str) -> LinkError {
    match line.strip_prefix("ERROR:") {
        Some("NOT_JOINED") => LinkError::NotJoined,
        Some("NO_NETWORK") => LinkError::LinkLost,
        Some("BUSY") => LinkError::Busy,
        Some("TOO_LONG") => LinkError::PayloadTooLarge,
        _ => LinkError::BadResponse,
    }
}

fn decode_hex(hex: &str, out: &mut [u8]) -> Option<()> {
    if hex.len() != out.len() * 2 {
        return None;
    }
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(hex.get(i * 2..i * 2 + 2)?, 16).ok()?;
    }
    Some(())
}
