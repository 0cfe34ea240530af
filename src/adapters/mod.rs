//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements          | Connects to                  |
//! |-------------|---------------------|------------------------------|
//! | `detector`  | SensorPort          | Gas detector over UART       |
//! | `radio`     | RadioPort           | LoRaWAN AT modem over UART   |
//! | `uart`      | LineLink            | esp-idf-hal UART / host sim  |
//! | `nvs`       | ConfigPort          | NVS / in-memory store        |
//! |             | StoragePort         |                              |
//! | `log_sink`  | EventSink           | Serial log output            |
//! | `device_id` | —                   | DevEUI persistence           |
//! | `time`      | —                   | ESP32 system timer           |

pub mod detector;
pub mod device_id;
pub mod log_sink;
pub mod nvs;
pub mod radio;
pub mod time;
pub mod uart;
