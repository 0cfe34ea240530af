//! Line-oriented serial transport shared by the radio and detector adapters.
//!
//! Both peripherals speak CR/LF-terminated ASCII.  [`LineLink`] is the
//! smallest surface they need: write a line, read a line within a bounded
//! wait.  A read that runs out of time fails with [`UartError::Timeout`];
//! nothing on this path can block the dispatcher indefinitely.
//!
//! - **`target_os = "espidf"`**: [`EspLineLink`] over an esp-idf-hal
//!   `UartDriver`.
//! - **host**: [`SimLink`], a scripted peer for simulation and tests.

/// One received line without its terminator.
pub type Line = heapless::String<128>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UartError {
    /// No complete line within the allotted time.
    Timeout,
    /// The line did not fit the receive buffer.
    Overflow,
    /// Driver-level failure.
    Io,
}

impl core::fmt::Display for UartError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Timeout => write!(f, "UART timeout"),
            Self::Overflow => write!(f, "UART line overflow"),
            Self::Io => write!(f, "UART I/O error"),
        }
    }
}

pub trait LineLink {
    /// Send `line` followed by CR/LF.
    fn write_line(&mut self, line: &str) -> Result<(), UartError>;

    /// Receive one line, waiting at most `timeout_ms`.  `0` only returns
    /// a line that is already buffered.
    fn read_line(&mut self, timeout_ms: u32) -> Result<Line, UartError>;

    /// Discard anything buffered (stale replies from a timed-out exchange).
    fn flush_input(&mut self);

    /// Monotonic milliseconds, used to bound multi-line exchanges.
    fn now_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF backend
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp::EspLineLink;

#[cfg(target_os = "espidf")]
mod esp {
    use esp_idf_svc::hal::delay::TickType;
    use esp_idf_svc::hal::uart::UartDriver;

    use super::{Line, LineLink, UartError};
    use crate::adapters::time::MonotonicClock;

    pub struct EspLineLink {
        uart: UartDriver<'static>,
        partial: Line,
        clock: MonotonicClock,
    }

    impl EspLineLink {
        pub fn new(uart: UartDriver<'static>) -> Self {
            Self { uart, partial: Line::new(), clock: MonotonicClock::new() }
        }
    }

    impl LineLink for EspLineLink {
        fn write_line(&mut self, line: &str) -> Result<(), UartError> {
            self.uart.write(line.as_bytes()).map_err(|_| UartError::Io)?;
            self.uart.write(b"\r\n").map_err(|_| UartError::Io)?;
            Ok(())
        }

        fn read_line(&mut self, timeout_ms: u32) -> Result<Line, UartError> {
            let deadline = self.clock.now_ms() + u64::from(timeout_ms);
            loop {
                let remaining = deadline.saturating_sub(self.clock.now_ms());
                let mut byte = [0u8; 1];
                let n = self
                    .uart
                    .read(&mut byte, TickType::new_millis(remaining).ticks())
                    .map_err(|_| UartError::Io)?;
                if n == 0 {
                    // Keep the partial line; the rest may arrive on the next call.
                    return Err(UartError::Timeout);
                }
                match byte[0] {
                    b'\n' => {
                        let line = core::mem::take(&mut self.partial);
                        if !line.is_empty() {
                            return Ok(line);
                        }
                        // A stream of bare CR/LF must not outlive the deadline.
                        if self.clock.now_ms() >= deadline {
                            return Err(UartError::Timeout);
                        }
                    }
                    b'\r' => {}
                    b => {
                        if self.partial.push(char::from(b)).is_err() {
                            self.partial.clear();
                            return Err(UartError::Overflow);
                        }
                    }
                }
            }
        }

        fn flush_input(&mut self) {
            let _ = self.uart.clear_rx();
            self.partial.clear();
        }

        fn now_ms(&self) -> u64 {
            self.clock.now_ms()
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Host backend
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
pub use sim::SimLink;

#[cfg(not(target_os = "espidf"))]
mod sim {
    use std::collections::{HashMap, VecDeque};

    use super::{Line, LineLink, UartError};

    /// Scripted serial peer.
    ///
    /// Replies are keyed by the command line that triggers them; lines
    /// pushed with [`push_unsolicited`](Self::push_unsolicited) arrive
    /// without a command (module URCs).  Every written line is recorded.
    ///
    /// Time is simulated: each delivered line costs
    /// [`set_line_delay`](Self::set_line_delay) milliseconds and a read that
    /// finds nothing costs its whole timeout.
    #[derive(Default)]
    pub struct SimLink {
        replies: HashMap<String, VecDeque<Vec<String>>>,
        default_replies: HashMap<String, Vec<String>>,
        rx: VecDeque<String>,
        pub sent: Vec<String>,
        clock_ms: u64,
        line_delay_ms: u64,
    }

    impl SimLink {
        pub fn new() -> Self {
            Self::default()
        }

        /// Reply once to the next `command` with `lines`.
        pub fn reply_once(&mut self, command: &str, lines: &[&str]) {
            self.replies
                .entry(command.to_owned())
                .or_default()
                .push_back(lines.iter().map(|l| (*l).to_owned()).collect());
        }

        /// Reply to every `command` with `lines` once the one-shot replies
        /// are used up.
        pub fn reply_always(&mut self, command: &str, lines: &[&str]) {
            self.default_replies
                .insert(command.to_owned(), lines.iter().map(|l| (*l).to_owned()).collect());
        }

        /// Queue a line the peer sends on its own.
        pub fn push_unsolicited(&mut self, line: &str) {
            self.rx.push_back(line.to_owned());
        }

        pub fn set_line_delay(&mut self, ms: u64) {
            self.line_delay_ms = ms;
        }

        /// Number of times `prefix` was written.
        pub fn count_sent(&self, prefix: &str) -> usize {
            self.sent.iter().filter(|l| l.starts_with(prefix)).count()
        }
    }

    impl LineLink for SimLink {
        fn write_line(&mut self, line: &str) -> Result<(), UartError> {
            self.sent.push(line.to_owned());
            // Commands with arguments are matched on the part before '='.
            let key = if self.replies.contains_key(line) || self.default_replies.contains_key(line) {
                line
            } else {
                line.split('=').next().unwrap_or(line)
            };
            let lines = self
                .replies
                .get_mut(key)
                .and_then(VecDeque::pop_front)
                .or_else(|| self.default_replies.get(key).cloned());
            if let Some(lines) = lines {
                self.rx.extend(lines);
            }
            Ok(())
        }

        fn read_line(&mut self, timeout_ms: u32) -> Result<Line, UartError> {
            let Some(raw) = self.rx.pop_front() else {
                self.clock_ms += u64::from(timeout_ms);
                return Err(UartError::Timeout);
            };
            self.clock_ms += self.line_delay_ms;
            let mut line = Line::new();
            line.push_str(&raw).map_err(|()| UartError::Overflow)?;
            Ok(line)
        }

        fn flush_input(&mut self) {
            self.rx.clear();
        }

        fn now_ms(&self) -> u64 {
            self.clock_ms
        }
    }
}
