//! Hardware periodic timers using ESP-IDF's esp_timer API.
//!
//! One timer per periodic flag.  Callbacks run in the esp_timer task (not
//! an ISR) and do nothing but an atomic `FlagBus::set`.  The bus pointer is
//! passed through the callback argument, so it must be `'static`.
//!
//! On the host no timers exist; the simulation loop drives
//! [`FlagTimers`](crate::timers::FlagTimers) instead.

use crate::config::RelayConfig;
use crate::flags::FlagBus;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use crate::flags::Flag;

/// Errors creating or starting a timer (raw esp_err_t).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerError(pub i32);

impl core::fmt::Display for TimerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "esp_timer failed (rc={})", self.0)
    }
}

pub struct HwTimers {
    #[cfg(target_os = "espidf")]
    handles: [esp_timer_handle_t; 2],
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn sensor_poll_cb(arg: *mut core::ffi::c_void) {
    // SAFETY: `arg` is the `&'static FlagBus` handed to `start`.
    let flags = unsafe { &*(arg as *const FlagBus) };
    flags.set(Flag::SensorPoll);
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn heartbeat_cb(arg: *mut core::ffi::c_void) {
    // SAFETY: as above.
    let flags = unsafe { &*(arg as *const FlagBus) };
    flags.set(Flag::Heartbeat);
}

#[cfg(target_os = "espidf")]
unsafe fn start_periodic(
    name: &'static [u8],
    callback: unsafe extern "C" fn(*mut core::ffi::c_void),
    flags: &'static FlagBus,
    period_us: u64,
) -> Result<esp_timer_handle_t, TimerError> {
    let args = esp_timer_create_args_t {
        callback: Some(callback),
        arg: flags as *const FlagBus as *mut _,
        dispatch_method: esp_timer_dispatch_t_ESP_TIMER_TASK,
        name: name.as_ptr() as *const _,
        skip_unhandled_events: true,
    };
    let mut handle: esp_timer_handle_t = core::ptr::null_mut();
    // SAFETY: `args` outlives the call; `name` is a static NUL-terminated string.
    let ret = unsafe { esp_timer_create(&args, &mut handle) };
    if ret != ESP_OK {
        return Err(TimerError(ret));
    }
    // SAFETY: `handle` was just created.
    let ret = unsafe { esp_timer_start_periodic(handle, period_us) };
    if ret != ESP_OK {
        // SAFETY: created above, never started.
        unsafe { esp_timer_delete(handle) };
        return Err(TimerError(ret));
    }
    Ok(handle)
}

impl HwTimers {
    /// Start the sensor-poll and heartbeat timers.
    #[cfg(target_os = "espidf")]
    pub fn start(cfg: &RelayConfig, flags: &'static FlagBus) -> Result<Self, TimerError> {
        let poll_us = u64::from(cfg.sensor_poll_interval_ms) * 1_000;
        let heartbeat_us = cfg.heartbeat_interval_ms() * 1_000;

        // SAFETY: called once from the main task during bring-up.
        let sensor = unsafe { start_periodic(b"sensor_poll\0", sensor_poll_cb, flags, poll_us)? };
        let heartbeat = match unsafe { start_periodic(b"heartbeat\0", heartbeat_cb, flags, heartbeat_us) } {
            Ok(h) => h,
            Err(e) => {
                // SAFETY: `sensor` is a running timer owned here.
                unsafe {
                    esp_timer_stop(sensor);
                    esp_timer_delete(sensor);
                }
                return Err(e);
            }
        };

        log::info!(
            "hw_timer: sensor_poll@{}ms + heartbeat@{}s started",
            cfg.sensor_poll_interval_ms,
            cfg.heartbeat_interval_secs
        );
        Ok(Self { handles: [sensor, heartbeat] })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn start(_cfg: &RelayConfig, _flags: &'static FlagBus) -> Result<Self, TimerError> {
        log::info!("hw_timer(sim): timers not started (flags driven by FlagTimers)");
        Ok(Self {})
    }

    /// Stop every timer.  Flags already set stay pending.
    pub fn stop(&mut self) {
        #[cfg(target_os = "espidf")]
        for handle in &mut self.handles {
            if !handle.is_null() {
                // SAFETY: non-null handles come from `start_periodic`.
                unsafe {
                    esp_timer_stop(*handle);
                    esp_timer_delete(*handle);
                }
                *handle = core::ptr::null_mut();
            }
        }
    }
}

impl Drop for HwTimers {
    fn drop(&mut self) {
        self.stop();
    }
}
