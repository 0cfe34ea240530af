//! Mock adapters for integration tests.
//!
//! Each mock records what the dispatcher asked of it so tests can assert on
//! the full history without real UARTs, flash or timers.

use std::collections::HashMap;

use gasrelay::app::events::AppEvent;
use gasrelay::app::ports::{
    DeviceEui, EventSink, JoinPoll, LinkStatus, RadioPort, SensorPort, SensorReading,
    SessionInfo, StorageError, StoragePort, WatchdogPort,
};
use gasrelay::app::service::{Ports, RelayService};
use gasrelay::error::{LinkError, SensorError};
use gasrelay::led::LedStatus;
use gasrelay::uplink::{AlarmReport, Heartbeat};

pub const DEV_ADDR: u32 = 0x2601_ABCD;

// ── MockRadio ─────────────────────────────────────────────────

pub struct MockRadio {
    pub join_result: JoinPoll,
    pub send_result: Result<(), LinkError>,
    pub join_requests: u32,
    /// Clock value of each join request.
    pub join_times: Vec<u64>,
    /// Set by [`Rig::step`] before each iteration.
    pub now_ms: u64,
    /// Every uplink handed to the module, successful or not.
    pub sends: Vec<(u8, Vec<u8>)>,
}

#[allow(dead_code)]
impl MockRadio {
    pub fn new() -> Self {
        Self {
            join_result: JoinPoll::Joined(SessionInfo { dev_addr: DEV_ADDR }),
            send_result: Ok(()),
            join_requests: 0,
            join_times: Vec::new(),
            now_ms: 0,
            sends: Vec::new(),
        }
    }

    pub fn on_port(&self, port: u8) -> Vec<&[u8]> {
        self.sends
            .iter()
            .filter(|(p, _)| *p == port)
            .map(|(_, b)| b.as_slice())
            .collect()
    }

    pub fn alarm_reports(&self, port: u8) -> Vec<AlarmReport> {
        self.on_port(port)
            .into_iter()
            .map(|b| postcard::from_bytes(b).unwrap())
            .collect()
    }

    pub fn heartbeats(&self, port: u8) -> Vec<Heartbeat> {
        self.on_port(port)
            .into_iter()
            .map(|b| postcard::from_bytes(b).unwrap())
            .collect()
    }
}

impl RadioPort for MockRadio {
    fn configure(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    fn device_eui(&mut self) -> Result<DeviceEui, LinkError> {
        Ok([0x70, 0xB3, 0xD5, 0x7E, 0xD0, 0x00, 0x12, 0x34])
    }

    fn request_join(&mut self) -> Result<(), LinkError> {
        self.join_requests += 1;
        self.join_times.push(self.now_ms);
        Ok(())
    }

    fn poll_join(&mut self) -> JoinPoll {
        self.join_result
    }

    fn send_uplink(&mut self, port: u8, payload: &[u8]) -> Result<(), LinkError> {
        self.sends.push((port, payload.to_vec()));
        self.send_result
    }

    fn query_status(&mut self) -> Result<LinkStatus, LinkError> {
        Ok(LinkStatus::Joined)
    }
}

// ── MockDetector ──────────────────────────────────────────────

pub struct MockDetector {
    pub reading: Result<SensorReading, SensorError>,
    pub reads: u32,
}

#[allow(dead_code)]
impl MockDetector {
    pub fn quiet() -> Self {
        Self { reading: Ok(SensorReading::default()), reads: 0 }
    }

    pub fn set_alarm(&mut self, active: bool, concentration_lel: u8) {
        self.reading = Ok(SensorReading { alarm: active, fault: false, concentration_lel });
    }
}

impl SensorPort for MockDetector {
    fn read_alarm_state(&mut self) -> Result<SensorReading, SensorError> {
        self.reads += 1;
        self.reading
    }
}

// ── MemStore ──────────────────────────────────────────────────

#[derive(Default, Clone)]
pub struct MemStore {
    pub values: HashMap<String, Vec<u8>>,
    pub deletes: u32,
}

impl MemStore {
    fn key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }
}

impl StoragePort for MemStore {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        match self.values.get(&Self::key(namespace, key)) {
            Some(v) if v.len() <= buf.len() => {
                buf[..v.len()].copy_from_slice(v);
                Ok(v.len())
            }
            Some(_) => Err(StorageError::IoError),
            None => Err(StorageError::NotFound),
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.values.insert(Self::key(namespace, key), data.to_vec());
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.deletes += 1;
        self.values.remove(&Self::key(namespace, key));
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.values.contains_key(&Self::key(namespace, key))
    }
}

// ── MockWatchdog ──────────────────────────────────────────────

#[derive(Default)]
pub struct MockWatchdog {
    pub feeds: u32,
}

impl WatchdogPort for MockWatchdog {
    fn feed(&mut self) {
        self.feeds += 1;
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Rig: one set of mocks wired to a service ──────────────────

pub struct Rig {
    pub radio: MockRadio,
    pub detector: MockDetector,
    pub store: MemStore,
    pub watchdog: MockWatchdog,
    pub sink: RecordingSink,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        Self::with_store(MemStore::default())
    }

    pub fn with_store(store: MemStore) -> Self {
        Self {
            radio: MockRadio::new(),
            detector: MockDetector::quiet(),
            store,
            watchdog: MockWatchdog::default(),
            sink: RecordingSink::default(),
        }
    }

    /// Run one dispatcher iteration at `now_ms`.
    pub fn step(&mut self, service: &mut RelayService<'_>, now_ms: u64) -> LedStatus {
        self.radio.now_ms = now_ms;
        let mut ports = Ports {
            radio: &mut self.radio,
            sensor: &mut self.detector,
            store: &mut self.store,
            watchdog: &mut self.watchdog,
            sink: &mut self.sink,
        };
        service.run_once(now_ms, &mut ports)
    }
}
