//! Gas detector adapter (ASCII-hex frames over a [`LineLink`]).
//!
//! Frame: `*` + 8 bytes as hex + checksum byte as hex, CR/LF terminated.
//! The checksum is the bitwise NOT of the wrapping byte sum.
//!
//! | Byte | Query        | Reply                           |
//! |------|--------------|---------------------------------|
//! | 0    | `04` command | `04` echo                       |
//! | 1    | `01` read    | status: bit0 alarm, bit1 fault  |
//! | 2    | `00`         | concentration, %LEL             |
//! | 3–7  | `00`         | reserved                        |
//!
//! The read query therefore goes out as `*0401000000000000FA`.

use core::fmt::Write;

use log::debug;

use super::uart::{LineLink, UartError};
use crate::app::ports::{SensorPort, SensorReading};
use crate::error::SensorError;

const CMD_READ: u8 = 0x04;
const FRAME_BODY_LEN: usize = 8;
const STATUS_ALARM: u8 = 0x01;
const STATUS_FAULT: u8 = 0x02;

type FrameString = heapless::String<{ 1 + 2 * (FRAME_BODY_LEN + 1) }>;

fn checksum(body: &[u8]) -> u8 {
    !body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

pub fn encode_frame(body: &[u8; FRAME_BODY_LEN]) -> FrameString {
    let mut s = FrameString::new();
    let _ = s.push('*');
    for b in body.iter().chain(core::iter::once(&checksum(body))) {
        let _ = write!(s, "{:02X}", b);
    }
    s
}

pub fn decode_frame(line: &str) -> Result<[u8; FRAME_BODY_LEN], SensorError> {
    let hex = line.trim().strip_prefix('*').ok_or(SensorError::BadFrame)?;
    if hex.len() != 2 * (FRAME_BODY_LEN + 1) || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(SensorError::BadFrame);
    }
    let mut raw = [0u8; FRAME_BODY_LEN + 1];
    for (i, byte) in raw.iter_mut().enumerate() {
        let pair = hex.get(i * 2..i * 2 + 2).ok_or(SensorError::BadFrame)?;
        *byte = u8::from_str_radix(pair, 16).map_err(|_| SensorError::BadFrame)?;
    }
    let mut body = [0u8; FRAME_BODY_LEN];
    body.copy_from_slice(&raw[..FRAME_BODY_LEN]);
    if checksum(&body) != raw[FRAME_BODY_LEN] {
        return Err(SensorError::BadFrame);
    }
    Ok(body)
}

pub struct GasDetector<L> {
    link: L,
    response_timeout_ms: u32,
}

impl<L: LineLink> GasDetector<L> {
    pub fn new(link: L, response_timeout_ms: u32) -> Self {
        Self { link, response_timeout_ms }
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }
}

impl<L: LineLink> SensorPort for GasDetector<L> {
    fn read_alarm_state(&mut self) -> Result<SensorReading, SensorError> {
        let query = encode_frame(&[CMD_READ, 0x01, 0, 0, 0, 0, 0, 0]);
        self.link.flush_input();
        self.link.write_line(&query).map_err(|_| SensorError::LinkFailed)?;

        let line = self
            .link
            .read_line(self.response_timeout_ms)
            .map_err(|e| match e {
                UartError::Timeout => SensorError::Timeout,
                _ => SensorError::LinkFailed,
            })?;

        let body = decode_frame(&line)?;
        if body[0] != CMD_READ {
            debug!("Detector: unexpected reply command {:02X}", body[0]);
            return Err(SensorError::BadFrame);
        }
        Ok(SensorReading {
            alarm: body[1] & STATUS_ALARM != 0,
            fault: body[1] & STATUS_FAULT != 0,
            concentration_lel: body[2].min(100),
        })
    }
}
