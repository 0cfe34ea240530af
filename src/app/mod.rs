//! Application core — pure domain logic, zero I/O.
//!
//! The dispatcher, the reporting tasks and their recovery bookkeeping.
//! All interaction with hardware happens through **port traits** defined
//! in [`ports`], keeping this layer fully testable without real peripherals.

pub mod events;
pub mod ports;
pub mod service;
pub mod tasks;
