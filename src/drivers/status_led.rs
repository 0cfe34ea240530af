//! Single-colour status LED driver.
//!
//! Generic over an `embedded-hal` [`OutputPin`], so the firmware hands it an
//! esp-idf-hal `PinDriver` and tests hand it a recording pin.  The blink
//! timing lives in [`LedPatternEngine`]; this driver only applies it.

use embedded_hal::digital::OutputPin;

use crate::led::{LedPatternEngine, LedStatus};

pub struct StatusLed<P> {
    pin: P,
    engine: LedPatternEngine,
    lit: bool,
}

impl<P: OutputPin> StatusLed<P> {
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            engine: LedPatternEngine::new(),
            lit: false,
        }
    }

    /// Advance the pattern for `status` by `delta_ms` and drive the pin.
    /// The pin is only touched when the level changes.
    pub fn update(&mut self, status: LedStatus, delta_ms: u32) -> Result<(), P::Error> {
        self.engine.set_status(status);
        let lit = self.engine.tick(delta_ms);
        if lit != self.lit {
            if lit {
                self.pin.set_high()?;
            } else {
                self.pin.set_low()?;
            }
            self.lit = lit;
        }
        Ok(())
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }

    pub fn status(&self) -> LedStatus {
        self.engine.status()
    }
}
