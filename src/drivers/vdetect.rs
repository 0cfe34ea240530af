//! Voltage-sense monitor.
//!
//! The supervisor output on [`VDETECT_GPIO`](crate::pins::VDETECT_GPIO) drops
//! LOW when the supply falls under the hold-up threshold.  A falling edge
//! runs the power-loss path once; a rising edge re-arms it.
//!
//! Flash writes are not allowed from a GPIO ISR on ESP-IDF, so on the device
//! the monitor is sampled by a dedicated high-priority thread
//! ([`spawn_guard`]) rather than from the interrupt itself.  The thread
//! never touches the radio, the detector or the encoder; it only copies the
//! prepared bytes into the store.

use embedded_hal::digital::InputPin;

use crate::app::ports::StoragePort;
use crate::flags::FlagBus;
use crate::power::PowerLossHandler;

/// Edge seen by one [`VoltageMonitor::poll`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupplyEdge {
    /// Supply went low; carries whether the snapshot reached the store.
    Lost { persisted: bool },
    Restored,
}

pub struct VoltageMonitor<P> {
    pin: P,
    low: bool,
}

impl<P: InputPin> VoltageMonitor<P> {
    /// Starts in the "supply good" state, so a pin that is already low at
    /// boot triggers on the first poll.
    pub fn new(pin: P) -> Self {
        Self { pin, low: false }
    }

    pub fn is_low(&self) -> bool {
        self.low
    }

    /// Sample the pin and run the matching half of the power-loss handler
    /// on a level change.
    pub fn poll(
        &mut self,
        power: &PowerLossHandler,
        flags: &FlagBus,
        store: &mut impl StoragePort,
    ) -> Result<Option<SupplyEdge>, P::Error> {
        let low = self.pin.is_low()?;
        if low == self.low {
            return Ok(None);
        }
        self.low = low;

        if low {
            let persisted = power.on_voltage_low(flags, store);
            Ok(Some(SupplyEdge::Lost { persisted }))
        } else {
            power.on_voltage_restored();
            Ok(Some(SupplyEdge::Restored))
        }
    }
}

/// Run the monitor on its own thread, sampling every millisecond.
///
/// Logging happens after the write, never before it.
#[cfg(target_os = "espidf")]
pub fn spawn_guard<P>(
    mut monitor: VoltageMonitor<P>,
    power: &'static PowerLossHandler,
    flags: &'static FlagBus,
    store: &'static crate::adapters::nvs::StoreCell,
) -> std::io::Result<std::thread::JoinHandle<()>>
where
    P: InputPin + Send + 'static,
{
    use crate::adapters::nvs::SharedStore;

    std::thread::Builder::new()
        .name("vdetect".into())
        .stack_size(4096)
        .spawn(move || {
            let mut shared = SharedStore::new(store);
            loop {
                match monitor.poll(power, flags, &mut shared) {
                    Ok(Some(SupplyEdge::Lost { persisted })) => {
                        log::warn!("VDETECT: supply low, snapshot persisted={}", persisted);
                    }
                    Ok(Some(SupplyEdge::Restored)) => log::info!("VDETECT: supply restored"),
                    Ok(None) => {}
                    Err(_) => log::error!("VDETECT: pin read failed"),
                }
                std::thread::sleep(core::time::Duration::from_millis(1));
            }
        })
}
