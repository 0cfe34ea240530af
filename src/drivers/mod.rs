//! Peripheral drivers: watchdog, status LED, voltage sense, periodic timers.

pub mod hw_timer;
pub mod status_led;
pub mod vdetect;
pub mod watchdog;
