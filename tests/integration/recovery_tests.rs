//! Power-loss snapshot, boot recovery and the one-shot alarm replay.

use gasrelay::app::events::AppEvent;
use gasrelay::app::ports::StoragePort;
use gasrelay::app::service::RelayService;
use gasrelay::config::RelayConfig;
use gasrelay::error::LinkError;
use gasrelay::flags::{Flag, FlagBus};
use gasrelay::power::{BootCause, PowerLossHandler, Snapshot, SNAPSHOT_KEY, SNAPSHOT_NAMESPACE};

use crate::mock_hw::{MemStore, Rig, DEV_ADDR};

fn store_with(snapshot: Snapshot) -> MemStore {
    let mut store = MemStore::default();
    let bytes = snapshot.encode().unwrap();
    store.write(SNAPSHOT_NAMESPACE, SNAPSHOT_KEY, &bytes).unwrap();
    store
}

fn has_snapshot(store: &MemStore) -> bool {
    store.exists(SNAPSHOT_NAMESPACE, SNAPSHOT_KEY)
}

fn pending_snapshot() -> Snapshot {
    Snapshot {
        pending_alarm: true,
        alarm_seq: 7,
        heartbeat_seq: 3,
        uplink_seq: 10,
        dev_addr: Some(DEV_ADDR),
    }
}

#[test]
fn pending_alarm_is_replayed_exactly_once() {
    let cfg = RelayConfig::default();
    let (flags, power) = (FlagBus::new(), PowerLossHandler::new());
    let mut rig = Rig::with_store(store_with(pending_snapshot()));
    let mut svc = RelayService::new(&cfg, &flags, &power);

    assert_eq!(svc.boot(&rig.store, &mut rig.sink), BootCause::PowerLoss);
    assert_eq!(rig.sink.events[0], AppEvent::Started { recovered: true });
    assert!(svc.recovery_pending());

    rig.step(&mut svc, 0);
    assert!(rig.radio.sends.is_empty());
    assert!(has_snapshot(&rig.store));

    rig.step(&mut svc, 200);
    let reports = rig.radio.alarm_reports(cfg.alarm_port);
    assert_eq!(reports.len(), 1);
    assert!(reports[0].replayed);
    assert_eq!(reports[0].seq, 8);
    assert!(!has_snapshot(&rig.store));
    assert!(!svc.recovery_pending());

    for now in (400..200_000).step_by(200) {
        flags.set(Flag::SensorPoll);
        rig.step(&mut svc, now);
    }
    assert_eq!(rig.radio.alarm_reports(cfg.alarm_port).len(), 1);
    assert_eq!(rig.sink.count(|e| *e == AppEvent::AlarmReplayed), 1);
    assert_eq!(svc.stats().recovery_replays, 1);

    // Second boot, no new power loss: nothing to recover.
    let (flags2, power2) = (FlagBus::new(), PowerLossHandler::new());
    let mut rig2 = Rig::with_store(rig.store.clone());
    let mut svc2 = RelayService::new(&cfg, &flags2, &power2);
    assert_eq!(svc2.boot(&rig2.store, &mut rig2.sink), BootCause::Clean);
    for now in (0..10_000).step_by(200) {
        rig2.step(&mut svc2, now);
    }
    assert!(rig2.radio.sends.is_empty());
}

#[test]
fn recovered_snapshot_restores_counters() {
    let cfg = RelayConfig::default();
    let (flags, power) = (FlagBus::new(), PowerLossHandler::new());
    let snap = Snapshot { pending_alarm: false, ..pending_snapshot() };
    let mut rig = Rig::with_store(store_with(snap));
    let mut svc = RelayService::new(&cfg, &flags, &power);
    svc.boot(&rig.store, &mut rig.sink);

    flags.set(Flag::Heartbeat);
    rig.step(&mut svc, 0);
    rig.step(&mut svc, 200);

    // Nothing pending: cleared without an alarm uplink.
    assert!(rig.radio.on_port(cfg.alarm_port).is_empty());
    assert!(!has_snapshot(&rig.store));

    let beats = rig.radio.heartbeats(cfg.heartbeat_port);
    assert_eq!(beats.len(), 1);
    assert_eq!(beats[0].seq, 4);
    assert_eq!(beats[0].boot_cause, BootCause::PowerLoss);
    assert_eq!(svc.reporter().sequences().uplink, 11);
}

#[test]
fn corrupt_snapshot_means_clean_boot() {
    let cfg = RelayConfig::default();
    let (flags, power) = (FlagBus::new(), PowerLossHandler::new());
    let mut store = MemStore::default();
    store.write(SNAPSHOT_NAMESPACE, SNAPSHOT_KEY, &[0xA5, 0x01]).unwrap();
    let mut rig = Rig::with_store(store);
    let mut svc = RelayService::new(&cfg, &flags, &power);

    assert_eq!(svc.boot(&rig.store, &mut rig.sink), BootCause::Clean);
    assert_eq!(rig.sink.events[0], AppEvent::Started { recovered: false });
    assert!(!svc.recovery_pending());
}

#[test]
fn failed_replay_keeps_snapshot_until_sent() {
    let cfg = RelayConfig::default();
    let (flags, power) = (FlagBus::new(), PowerLossHandler::new());
    let mut rig = Rig::with_store(store_with(pending_snapshot()));
    let mut svc = RelayService::new(&cfg, &flags, &power);
    svc.boot(&rig.store, &mut rig.sink);

    rig.radio.send_result = Err(LinkError::Busy);
    rig.step(&mut svc, 0);
    rig.step(&mut svc, 200);
    assert_eq!(rig.radio.sends.len(), 1);
    assert!(has_snapshot(&rig.store));
    // The prepared snapshot still owes the alarm.
    assert!(Snapshot::decode(&power.prepared()).unwrap().pending_alarm);

    rig.radio.send_result = Ok(());
    for now in (400..60_200).step_by(200) {
        rig.step(&mut svc, now);
    }
    assert_eq!(rig.radio.sends.len(), 1);

    rig.step(&mut svc, 60_200);
    let reports = rig.radio.alarm_reports(cfg.alarm_port);
    assert_eq!(reports.len(), 2);
    assert!(reports[1].replayed);
    assert!(!has_snapshot(&rig.store));
}

#[test]
fn reboot_before_online_keeps_snapshot() {
    let cfg = RelayConfig::default();
    let store = store_with(pending_snapshot());

    {
        let (flags, power) = (FlagBus::new(), PowerLossHandler::new());
        let mut rig = Rig::with_store(store.clone());
        rig.radio.join_result = gasrelay::app::ports::JoinPoll::Pending;
        let mut svc = RelayService::new(&cfg, &flags, &power);
        svc.boot(&rig.store, &mut rig.sink);
        rig.step(&mut svc, 0);
        assert!(has_snapshot(&rig.store));
        // The recovered alarm is carried into the next snapshot too.
        assert!(Snapshot::decode(&power.prepared()).unwrap().pending_alarm);
    }

    let (flags, power) = (FlagBus::new(), PowerLossHandler::new());
    let mut rig = Rig::with_store(store);
    let mut svc = RelayService::new(&cfg, &flags, &power);
    assert_eq!(svc.boot(&rig.store, &mut rig.sink), BootCause::PowerLoss);
}

#[test]
fn power_cut_during_alarm_round_trips_through_store() {
    let cfg = RelayConfig::default();
    let (flags, power) = (FlagBus::new(), PowerLossHandler::new());
    let mut rig = Rig::new();
    let mut svc = RelayService::new(&cfg, &flags, &power);
    svc.boot(&rig.store, &mut rig.sink);
    rig.step(&mut svc, 0);
    rig.step(&mut svc, 200);

    rig.detector.set_alarm(true, 60);
    flags.set(Flag::SensorPoll);
    rig.step(&mut svc, 400);
    assert_eq!(rig.radio.alarm_reports(cfg.alarm_port).len(), 1);

    // Supply collapses: the voltage-sense path writes the prepared bytes.
    assert!(power.on_voltage_low(&flags, &mut rig.store));
    assert!(flags.is_pending(Flag::PowerDown));
    assert!(!power.on_voltage_low(&flags, &mut rig.store));

    let (flags2, power2) = (FlagBus::new(), PowerLossHandler::new());
    let mut rig2 = Rig::with_store(rig.store.clone());
    let mut svc2 = RelayService::new(&cfg, &flags2, &power2);
    assert_eq!(svc2.boot(&rig2.store, &mut rig2.sink), BootCause::PowerLoss);
    rig2.step(&mut svc2, 0);
    rig2.step(&mut svc2, 200);

    let reports = rig2.radio.alarm_reports(cfg.alarm_port);
    assert_eq!(reports.len(), 1);
    assert!(reports[0].replayed);
    assert_eq!(reports[0].seq, 2);
}

#[test]
fn brown_out_ride_through_leaves_no_record_behind() {
    let cfg = RelayConfig::default();
    let (flags, power) = (FlagBus::new(), PowerLossHandler::new());
    let mut rig = Rig::new();
    let mut svc = RelayService::new(&cfg, &flags, &power);
    svc.boot(&rig.store, &mut rig.sink);
    rig.step(&mut svc, 0);
    rig.step(&mut svc, 200);

    rig.detector.set_alarm(true, 60);
    flags.set(Flag::SensorPoll);
    rig.step(&mut svc, 400);
    assert_eq!(rig.radio.alarm_reports(cfg.alarm_port).len(), 1);

    // Supply dips and comes back before the capacitors run dry.
    assert!(power.on_voltage_low(&flags, &mut rig.store));
    rig.step(&mut svc, 600);
    assert!(rig.sink.events.contains(&AppEvent::PowerDown { stored: true }));
    assert!(has_snapshot(&rig.store));

    power.on_voltage_restored();
    rig.step(&mut svc, 800);
    assert!(!has_snapshot(&rig.store));
    assert_eq!(rig.sink.count(|e| *e == AppEvent::PowerRestored), 1);

    rig.detector.set_alarm(false, 0);
    for now in (1_000..3_600_000).step_by(10_000) {
        flags.set(Flag::SensorPoll);
        rig.step(&mut svc, now);
    }
    assert!(!svc.reporter().alarm().active);

    // Watchdog reset, no new supply drop.
    let (flags2, power2) = (FlagBus::new(), PowerLossHandler::new());
    let mut rig2 = Rig::with_store(rig.store.clone());
    let mut svc2 = RelayService::new(&cfg, &flags2, &power2);
    assert_eq!(svc2.boot(&rig2.store, &mut rig2.sink), BootCause::Clean);
    for now in (0..10_000).step_by(200) {
        rig2.step(&mut svc2, now);
    }
    assert!(rig2.radio.alarm_reports(cfg.alarm_port).is_empty());
}

#[test]
fn ride_through_during_recovery_keeps_the_owed_replay() {
    let cfg = RelayConfig::default();
    let (flags, power) = (FlagBus::new(), PowerLossHandler::new());
    let mut rig = Rig::with_store(store_with(pending_snapshot()));
    rig.radio.join_result = gasrelay::app::ports::JoinPoll::Pending;
    let mut svc = RelayService::new(&cfg, &flags, &power);
    svc.boot(&rig.store, &mut rig.sink);
    rig.step(&mut svc, 0);

    power.on_voltage_low(&flags, &mut rig.store);
    power.on_voltage_restored();
    rig.step(&mut svc, 200);
    // Not online yet: the record still owes the alarm.
    assert!(has_snapshot(&rig.store));
    assert!(Snapshot::decode(&{
        let mut buf = [0u8; 32];
        let n = rig.store.read(SNAPSHOT_NAMESPACE, SNAPSHOT_KEY, &mut buf).unwrap();
        buf[..n].to_vec()
    })
    .unwrap()
    .pending_alarm);

    rig.radio.join_result = gasrelay::app::ports::JoinPoll::Joined(
        gasrelay::app::ports::SessionInfo { dev_addr: DEV_ADDR },
    );
    rig.step(&mut svc, 400);
    rig.step(&mut svc, 600);
    let reports = rig.radio.alarm_reports(cfg.alarm_port);
    assert_eq!(reports.len(), 1);
    assert!(reports[0].replayed);
    assert!(!has_snapshot(&rig.store));
    assert!(!power.has_outdated_record());
}

#[test]
fn failed_power_down_write_is_reported() {
    let cfg = RelayConfig::default();
    let (flags, power) = (FlagBus::new(), PowerLossHandler::new());
    let mut rig = Rig::new();
    let mut svc = RelayService::new(&cfg, &flags, &power);

    // Nothing prepared before boot: the write has nothing to store.
    assert!(!power.on_voltage_low(&flags, &mut rig.store));
    svc.boot(&rig.store, &mut rig.sink);
    rig.step(&mut svc, 0);
    assert!(rig.sink.events.contains(&AppEvent::PowerDown { stored: false }));
    assert!(!flags.is_pending(Flag::PowerDown));
}
