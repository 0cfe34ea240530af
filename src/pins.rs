//! GPIO / peripheral pin assignments for the relay board.
//!
//! Single source of truth; `main` and the drivers reference this module
//! rather than hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Gas detector (UART1, 9600 8N1)
// ---------------------------------------------------------------------------

pub const DETECTOR_UART_TX_GPIO: i32 = 17;
pub const DETECTOR_UART_RX_GPIO: i32 = 18;
pub const DETECTOR_BAUD: u32 = 9_600;

// ---------------------------------------------------------------------------
// LoRaWAN modem (UART2, 115200 8N1)
// ---------------------------------------------------------------------------

pub const RADIO_UART_TX_GPIO: i32 = 4;
pub const RADIO_UART_RX_GPIO: i32 = 5;
pub const RADIO_BAUD: u32 = 115_200;

// ---------------------------------------------------------------------------
// Supply supervisor
// ---------------------------------------------------------------------------

/// Digital input from the voltage supervisor.  LOW = supply below the
/// hold-up threshold, enough energy left for one NVS write.
pub const VDETECT_GPIO: i32 = 7;

// ---------------------------------------------------------------------------
// Status LED (single colour, active HIGH)
// ---------------------------------------------------------------------------

pub const STATUS_LED_GPIO: i32 = 2;
