//! GasRelay Firmware — Main Entry Point
//!
//! Hexagonal architecture with a single cooperative dispatcher.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  GasDetector     LoraModem      NvStore/SharedStore  Watchdog  │
//! │  (SensorPort)    (RadioPort)    (Config+Storage)     (TWDT)    │
//! │  LogEventSink    MonotonicClock StatusLed                      │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │             RelayService (pure logic)                  │    │
//! │  │  NetworkSession · Reporter · Recovery                  │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  esp_timer ─▶ FlagBus ◀─ vdetect guard ─▶ PowerLossHandler     │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use core::cell::RefCell;

use anyhow::{Context, Result};
use critical_section::Mutex;
use log::{info, warn};

use esp_idf_svc::hal::gpio::{AnyIOPin, AnyOutputPin, PinDriver, Pull};
use esp_idf_svc::hal::prelude::Peripherals;
use esp_idf_svc::hal::uart::{config::Config as UartConfig, UartDriver};
use esp_idf_svc::hal::units::Hertz;

use gasrelay::adapters::detector::GasDetector;
use gasrelay::adapters::device_id;
use gasrelay::adapters::log_sink::LogEventSink;
use gasrelay::adapters::nvs::{NvStore, SharedStore, StoreCell};
use gasrelay::adapters::radio::LoraModem;
use gasrelay::adapters::time::MonotonicClock;
use gasrelay::adapters::uart::EspLineLink;
use gasrelay::app::ports::{ConfigPort, RadioPort};
use gasrelay::app::service::{Ports, RelayService};
use gasrelay::config::RelayConfig;
use gasrelay::diagnostics;
use gasrelay::drivers::hw_timer::HwTimers;
use gasrelay::drivers::status_led::StatusLed;
use gasrelay::drivers::vdetect::{self, VoltageMonitor};
use gasrelay::drivers::watchdog::Watchdog;
use gasrelay::flags::FlagBus;
use gasrelay::pins;
use gasrelay::power::PowerLossHandler;

// ── Shared with the timer task and the vdetect guard ──────────

static FLAGS: FlagBus = FlagBus::new();
static POWER: PowerLossHandler = PowerLossHandler::new();
static STORE: StoreCell = Mutex::new(RefCell::new(None));

fn uart_driver(
    uart: impl esp_idf_svc::hal::peripheral::Peripheral<P = impl esp_idf_svc::hal::uart::Uart> + 'static,
    tx: i32,
    rx: i32,
    baud: u32,
) -> Result<UartDriver<'static>> {
    // SAFETY: pin numbers come from `pins` and are used by nothing else.
    let (tx, rx) = unsafe { (AnyIOPin::new(tx), AnyIOPin::new(rx)) };
    let cfg = UartConfig::new().baudrate(Hertz(baud));
    Ok(UartDriver::new(
        uart,
        tx,
        rx,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &cfg,
    )?)
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  GasRelay v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");
    diagnostics::install_panic_handler();

    let peripherals = Peripherals::take()?;

    // ── 2. Store + config ─────────────────────────────────────
    if let Err(e) = NvStore::init_flash() {
        warn!("NVS init failed ({}), running with defaults and no persistence", e);
    }
    let store = NvStore::new();
    let config = store.load().unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        RelayConfig::default()
    });
    log::set_max_level(config.level_filter());
    critical_section::with(|cs| {
        STORE.borrow_ref_mut(cs).replace(store);
    });
    let mut shared = SharedStore::new(&STORE);

    let mut watchdog = Watchdog::new(config.watchdog_timeout_ms);

    // ── 3. UART peripherals ───────────────────────────────────
    let detector_uart = uart_driver(
        peripherals.uart1,
        pins::DETECTOR_UART_TX_GPIO,
        pins::DETECTOR_UART_RX_GPIO,
        pins::DETECTOR_BAUD,
    )
    .context("detector UART")?;
    let radio_uart = uart_driver(
        peripherals.uart2,
        pins::RADIO_UART_TX_GPIO,
        pins::RADIO_UART_RX_GPIO,
        pins::RADIO_BAUD,
    )
    .context("radio UART")?;

    let mut detector = GasDetector::new(
        EspLineLink::new(detector_uart),
        config.sensor_response_timeout_ms,
    );
    let mut radio = LoraModem::new(EspLineLink::new(radio_uart), config.radio_response_timeout_ms);

    // The session keeps retrying joins, so a failed configure is not fatal.
    if let Err(e) = radio.configure() {
        warn!("Radio configure failed ({}), continuing", e);
    }

    match device_id::load_or_fetch(&mut shared, &mut radio) {
        Ok(eui) => info!(
            "Device ID: {} (DevEUI {})",
            device_id::device_id(&eui),
            device_id::to_hex(&eui)
        ),
        Err(e) => warn!("DevEUI unavailable ({})", e),
    }

    // ── 4. Dispatcher ─────────────────────────────────────────
    let mut sink = LogEventSink::new();
    let mut service = RelayService::new(&config, &FLAGS, &POWER);
    let boot_cause = service.boot(&shared, &mut sink);
    info!("Boot cause: {:?}", boot_cause);

    // ── 5. Flag producers (only after the first snapshot is prepared) ─
    let _timers = HwTimers::start(&config, &FLAGS).map_err(|e| anyhow::anyhow!("{}", e))?;

    // SAFETY: VDETECT_GPIO is dedicated to the supply supervisor.
    let mut vdetect_pin = PinDriver::input(unsafe { AnyIOPin::new(pins::VDETECT_GPIO) })?;
    vdetect_pin.set_pull(Pull::Up)?;
    vdetect::spawn_guard(VoltageMonitor::new(vdetect_pin), &POWER, &FLAGS, &STORE)
        .context("vdetect guard thread")?;

    // SAFETY: STATUS_LED_GPIO is dedicated to the LED.
    let led_pin = PinDriver::output(unsafe { AnyOutputPin::new(pins::STATUS_LED_GPIO) })?;
    let mut status_led = StatusLed::new(led_pin);

    info!("System ready. Entering dispatcher loop.");

    // ── 6. Dispatcher loop ────────────────────────────────────
    let clock = MonotonicClock::new();
    let mut ports = Ports {
        radio: &mut radio,
        sensor: &mut detector,
        store: &mut shared,
        watchdog: &mut watchdog,
        sink: &mut sink,
    };
    let mut last_ms = clock.now_ms();

    loop {
        std::thread::sleep(core::time::Duration::from_millis(u64::from(
            config.loop_interval_ms,
        )));

        let now_ms = clock.now_ms();
        let led = service.run_once(now_ms, &mut ports);

        let delta = now_ms.saturating_sub(last_ms).min(u64::from(u32::MAX)) as u32;
        last_ms = now_ms;
        if let Err(e) = status_led.update(led, delta) {
            log::debug!("Status LED write failed: {:?}", e);
        }
    }
}
