//! GasRelay firmware library.
//!
//! Exposes the pure-logic modules for integration testing and host
//! simulation. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod flags;
pub mod led;
pub mod power;
pub mod session;
pub mod timers;
pub mod uplink;

pub mod adapters;
pub mod drivers;
pub mod pins;
