//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`ConfigPort`] and [`StoragePort`] for the relay.
//!
//! - Config validation: all fields are range-checked before persistence.
//! - Namespace isolation: each subsystem uses its own namespace
//!   (`gasrelay` config, `pwr` snapshot, `ident` DevEUI).
//! - Atomic writes: ESP-IDF NVS commits are atomic per `nvs_commit()`.
//!
//! The host backend is a fixed-capacity map, so a write never allocates.
//! That keeps it usable on the same interrupt path the firmware uses.
//!
//! [`SharedStore`] is the handle the firmware passes around: the one
//! [`NvStore`] lives in a `critical_section::Mutex` shared by the main
//! loop and the power-loss path.

use core::cell::RefCell;

use critical_section::Mutex;
use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::RelayConfig;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "gasrelay";
const CONFIG_KEY: &str = "syscfg";

/// Largest blob any namespace stores (the encoded config).
pub const MAX_VALUE_LEN: usize = 96;

#[cfg(not(target_os = "espidf"))]
const MAX_ENTRIES: usize = 16;

#[cfg(not(target_os = "espidf"))]
type CompositeKey = heapless::String<32>;

pub struct NvStore {
    #[cfg(not(target_os = "espidf"))]
    entries: heapless::FnvIndexMap<CompositeKey, heapless::Vec<u8, MAX_VALUE_LEN>, MAX_ENTRIES>,
}

impl Default for NvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NvStore {
    /// Host backend: empty in-memory store.
    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            entries: heapless::FnvIndexMap::new(),
        }
    }

    /// Handle to the already initialised NVS partition.
    /// Call [`init_flash`](Self::init_flash) once at boot first.
    #[cfg(target_os = "espidf")]
    pub fn new() -> Self {
        Self {}
    }

    /// Initialise NVS flash.  On first boot or after a version mismatch the
    /// partition is erased and re-initialised.
    #[cfg(target_os = "espidf")]
    pub fn init_flash() -> Result<(), StorageError> {
        // SAFETY: called once from main() before any NVS access.
        let ret = unsafe { nvs_flash_init() };
        if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
            warn!("NVS: erasing and re-initialising flash partition");
            if unsafe { nvs_flash_erase() } != ESP_OK || unsafe { nvs_flash_init() } != ESP_OK {
                return Err(StorageError::IoError);
            }
        } else if ret != ESP_OK {
            return Err(StorageError::IoError);
        }
        info!("NvStore: ESP-IDF NVS initialised");
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn init_flash() -> Result<(), StorageError> {
        info!("NvStore: simulation backend");
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> Result<CompositeKey, StorageError> {
        let mut k = CompositeKey::new();
        k.push_str(namespace)
            .and_then(|()| k.push_str("::"))
            .and_then(|()| k.push_str(key))
            .map_err(|()| StorageError::Full)?;
        Ok(k)
    }

    /// NVS keys and namespaces are NUL-terminated, at most 15 chars.
    #[cfg(target_os = "espidf")]
    fn c_name(name: &str) -> [u8; 16] {
        let mut buf = [0u8; 16];
        let len = name.len().min(15);
        buf[..len].copy_from_slice(&name.as_bytes()[..len]);
        buf
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns = Self::c_name(namespace);
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        // SAFETY: `ns` is NUL-terminated and outlives the call.
        let ret = unsafe { nvs_open(ns.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        // SAFETY: `handle` was opened above and is not used after this.
        unsafe {
            nvs_close(handle);
        }
        result
    }
}

// ───────────────────────────────────────────────────────────────
// Config validation
// ───────────────────────────────────────────────────────────────

pub fn validate_config(cfg: &RelayConfig) -> Result<(), ConfigError> {
    if !(50..=5_000).contains(&cfg.loop_interval_ms) {
        return Err(ConfigError::ValidationFailed("loop_interval_ms must be 50–5000"));
    }
    if !(1_000..=60_000).contains(&cfg.watchdog_timeout_ms) {
        return Err(ConfigError::ValidationFailed(
            "watchdog_timeout_ms must be 1000–60000",
        ));
    }
    if !(200..=600_000).contains(&cfg.sensor_poll_interval_ms) {
        return Err(ConfigError::ValidationFailed(
            "sensor_poll_interval_ms must be 200–600000",
        ));
    }
    if !(60..=86_400).contains(&cfg.heartbeat_interval_secs) {
        return Err(ConfigError::ValidationFailed(
            "heartbeat_interval_secs must be 60–86400",
        ));
    }
    if !(1_000..=3_600_000).contains(&cfg.alarm_report_min_interval_ms) {
        return Err(ConfigError::ValidationFailed(
            "alarm_report_min_interval_ms must be 1000–3600000",
        ));
    }
    if !(1_000..=3_600_000).contains(&cfg.join_retry_interval_ms) {
        return Err(ConfigError::ValidationFailed(
            "join_retry_interval_ms must be 1000–3600000",
        ));
    }
    if !(1_000..=120_000).contains(&cfg.join_timeout_ms) {
        return Err(ConfigError::ValidationFailed("join_timeout_ms must be 1000–120000"));
    }
    if cfg.link_check_interval_ms < 10_000 {
        return Err(ConfigError::ValidationFailed(
            "link_check_interval_ms must be at least 10000",
        ));
    }
    if cfg.max_consecutive_send_failures == 0 {
        return Err(ConfigError::ValidationFailed(
            "max_consecutive_send_failures must be at least 1",
        ));
    }
    if !(100..=10_000).contains(&cfg.radio_response_timeout_ms) {
        return Err(ConfigError::ValidationFailed(
            "radio_response_timeout_ms must be 100–10000",
        ));
    }
    if !(50..=5_000).contains(&cfg.sensor_response_timeout_ms) {
        return Err(ConfigError::ValidationFailed(
            "sensor_response_timeout_ms must be 50–5000",
        ));
    }
    if cfg.worst_case_iteration_ms() >= u64::from(cfg.watchdog_timeout_ms) {
        return Err(ConfigError::ValidationFailed(
            "watchdog_timeout_ms must exceed loop + 3 radio exchanges + one detector read",
        ));
    }
    // LoRaWAN application ports are 1–223.
    for port in [cfg.alarm_port, cfg.heartbeat_port] {
        if !(1..=223).contains(&port) {
            return Err(ConfigError::ValidationFailed("uplink ports must be 1–223"));
        }
    }
    if cfg.alarm_port == cfg.heartbeat_port {
        return Err(ConfigError::ValidationFailed(
            "alarm_port and heartbeat_port must differ",
        ));
    }
    if cfg.log_level > 5 {
        return Err(ConfigError::ValidationFailed("log_level must be 0–5"));
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// ConfigPort
// ───────────────────────────────────────────────────────────────

impl ConfigPort for NvStore {
    fn load(&self) -> Result<RelayConfig, ConfigError> {
        let mut buf = [0u8; MAX_VALUE_LEN];
        match self.read(CONFIG_NAMESPACE, CONFIG_KEY, &mut buf) {
            Ok(len) => {
                let cfg: RelayConfig =
                    postcard::from_bytes(&buf[..len]).map_err(|_| ConfigError::Corrupted)?;
                validate_config(&cfg)?;
                info!("NvStore: loaded config ({} bytes)", len);
                Ok(cfg)
            }
            Err(StorageError::NotFound) => {
                info!("NvStore: no stored config, using defaults");
                Ok(RelayConfig::default())
            }
            Err(e) => {
                warn!("NvStore: config read error ({}), using defaults", e);
                Ok(RelayConfig::default())
            }
        }
    }

    fn save(&mut self, config: &RelayConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let mut buf = [0u8; MAX_VALUE_LEN];
        let bytes = postcard::to_slice(config, &mut buf).map_err(|_| ConfigError::IoError)?;
        self.write(CONFIG_NAMESPACE, CONFIG_KEY, bytes)
            .map_err(|_| ConfigError::IoError)?;
        info!("NvStore: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// StoragePort
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl StoragePort for NvStore {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let k = Self::composite_key(namespace, key)?;
        let data = self.entries.get(&k).ok_or(StorageError::NotFound)?;
        if data.len() > buf.len() {
            return Err(StorageError::IoError);
        }
        buf[..data.len()].copy_from_slice(data);
        Ok(data.len())
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let k = Self::composite_key(namespace, key)?;
        let value = heapless::Vec::from_slice(data).map_err(|()| StorageError::Full)?;
        self.entries
            .insert(k, value)
            .map(|_| ())
            .map_err(|_| StorageError::Full)
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        let k = Self::composite_key(namespace, key)?;
        self.entries.remove(&k);
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        Self::composite_key(namespace, key).is_ok_and(|k| self.entries.contains_key(&k))
    }
}

#[cfg(target_os = "espidf")]
impl StoragePort for NvStore {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let key = Self::c_name(key);
        let result = Self::with_nvs_handle(namespace, false, |handle| {
            let mut size = buf.len();
            // SAFETY: `buf` is valid for `size` bytes; NVS writes at most that.
            let ret = unsafe {
                nvs_get_blob(handle, key.as_ptr() as *const _, buf.as_mut_ptr() as *mut _, &mut size)
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(size)
        });
        match result {
            Ok(size) => Ok(size),
            Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
            Err(_) => Err(StorageError::IoError),
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let key = Self::c_name(key);
        let result = Self::with_nvs_handle(namespace, true, |handle| {
            // SAFETY: `data` is valid for `data.len()` bytes.
            let ret = unsafe {
                nvs_set_blob(handle, key.as_ptr() as *const _, data.as_ptr() as *const _, data.len())
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        });
        match result {
            Ok(()) => Ok(()),
            Err(e) if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE => Err(StorageError::Full),
            Err(_) => Err(StorageError::IoError),
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        let key = Self::c_name(key);
        let result = Self::with_nvs_handle(namespace, true, |handle| {
            let ret = unsafe { nvs_erase_key(handle, key.as_ptr() as *const _) };
            if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        });
        match result {
            Ok(()) => Ok(()),
            // A namespace that was never written has nothing to erase.
            Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Ok(()),
            Err(_) => Err(StorageError::IoError),
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        let key = Self::c_name(key);
        Self::with_nvs_handle(namespace, false, |handle| {
            let ret =
                unsafe { nvs_find_key(handle, key.as_ptr() as *const _, core::ptr::null_mut()) };
            Ok(ret == ESP_OK)
        })
        .unwrap_or(false)
    }
}

// ───────────────────────────────────────────────────────────────
// Shared handle
// ───────────────────────────────────────────────────────────────

/// Slot holding the one store instance; `None` until boot installs it.
pub type StoreCell = Mutex<RefCell<Option<NvStore>>>;

/// [`StoragePort`] over a [`StoreCell`].  Every call takes a critical
/// section, so the main loop and the power-loss path never interleave
/// inside one store operation.
#[derive(Clone, Copy)]
pub struct SharedStore<'a> {
    cell: &'a StoreCell,
}

impl<'a> SharedStore<'a> {
    pub fn new(cell: &'a StoreCell) -> Self {
        Self { cell }
    }

    fn with<T>(&self, f: impl FnOnce(&mut NvStore) -> Result<T, StorageError>) -> Result<T, StorageError> {
        critical_section::with(|cs| match self.cell.borrow_ref_mut(cs).as_mut() {
            Some(store) => f(store),
            None => Err(StorageError::IoError),
        })
    }
}

impl StoragePort for SharedStore<'_> {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.with(|s| s.read(namespace, key, buf))
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.with(|s| s.write(namespace, key, data))
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.with(|s| s.delete(namespace, key))
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.with(|s| Ok(s.exists(namespace, key))).unwrap_or(false)
    }
}
