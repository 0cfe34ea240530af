//! Dispatcher ordering, session gating and reporting cadence.

use gasrelay::app::events::AppEvent;
use gasrelay::app::ports::JoinPoll;
use gasrelay::app::service::RelayService;
use gasrelay::config::RelayConfig;
use gasrelay::error::{LinkError, SensorError};
use gasrelay::flags::{Flag, FlagBus};
use gasrelay::led::LedStatus;
use gasrelay::power::{BootCause, PowerLossHandler};
use gasrelay::session::SessionState;
use gasrelay::timers::FlagTimers;

use crate::mock_hw::Rig;

fn go_online(rig: &mut Rig, svc: &mut RelayService<'_>) {
    rig.step(svc, 0);
    rig.step(svc, 200);
    assert_eq!(svc.session_state(), SessionState::Online);
}

#[test]
fn clean_boot_joins_and_goes_online() {
    let cfg = RelayConfig::default();
    let (flags, power) = (FlagBus::new(), PowerLossHandler::new());
    let mut rig = Rig::new();
    let mut svc = RelayService::new(&cfg, &flags, &power);

    assert_eq!(svc.boot(&rig.store, &mut rig.sink), BootCause::Clean);
    assert_eq!(rig.sink.events[0], AppEvent::Started { recovered: false });

    assert_eq!(rig.step(&mut svc, 0), LedStatus::Joining);
    assert_eq!(rig.step(&mut svc, 200), LedStatus::Online);

    assert!(rig.sink.events.contains(&AppEvent::SessionChanged {
        from: SessionState::Disconnected,
        to: SessionState::Joining,
    }));
    assert!(rig.sink.events.contains(&AppEvent::SessionChanged {
        from: SessionState::Joining,
        to: SessionState::Online,
    }));
    assert_eq!(rig.radio.join_requests, 1);
    assert_eq!(rig.watchdog.feeds, 2);
}

#[test]
fn nothing_reports_while_joining() {
    let cfg = RelayConfig::default();
    let (flags, power) = (FlagBus::new(), PowerLossHandler::new());
    let mut rig = Rig::new();
    rig.radio.join_result = JoinPoll::Pending;
    rig.detector.set_alarm(true, 40);
    let mut svc = RelayService::new(&cfg, &flags, &power);
    svc.boot(&rig.store, &mut rig.sink);

    flags.set(Flag::SensorPoll);
    flags.set(Flag::Heartbeat);
    for now in (0..10_000).step_by(200) {
        rig.step(&mut svc, now);
    }

    assert_eq!(svc.session_state(), SessionState::Joining);
    assert_eq!(rig.detector.reads, 0);
    assert!(rig.radio.sends.is_empty());
    // Left pending for the first Online iteration.
    assert!(flags.is_pending(Flag::SensorPoll));
    assert!(flags.is_pending(Flag::Heartbeat));
    assert_eq!(rig.watchdog.feeds, 50);
}

#[test]
fn pending_flags_run_once_on_first_online_iteration() {
    let cfg = RelayConfig::default();
    let (flags, power) = (FlagBus::new(), PowerLossHandler::new());
    let mut rig = Rig::new();
    let mut svc = RelayService::new(&cfg, &flags, &power);
    svc.boot(&rig.store, &mut rig.sink);

    flags.set(Flag::Heartbeat);
    flags.set(Flag::Heartbeat);
    go_online(&mut rig, &mut svc);

    assert_eq!(rig.radio.heartbeats(cfg.heartbeat_port).len(), 1);
    assert_eq!(flags.coalesced(Flag::Heartbeat), 1);
    assert_eq!(svc.stats().flags_coalesced, 1);
}

#[test]
fn heartbeat_follows_configured_cadence() {
    let cfg = RelayConfig { heartbeat_interval_secs: 60, ..RelayConfig::default() };
    let (flags, power) = (FlagBus::new(), PowerLossHandler::new());
    let mut rig = Rig::new();
    let mut svc = RelayService::new(&cfg, &flags, &power);
    svc.boot(&rig.store, &mut rig.sink);
    let mut timers = FlagTimers::new(&cfg, 0);

    for now in (0..=185_000).step_by(200) {
        timers.fire_due(now, &flags);
        rig.step(&mut svc, now);
    }

    let beats = rig.radio.heartbeats(cfg.heartbeat_port);
    assert_eq!(beats.iter().map(|h| h.seq).collect::<Vec<_>>(), [1, 2, 3]);
    assert!(beats.iter().all(|h| h.boot_cause == BootCause::Clean && !h.alarm_active));
    assert!(rig.radio.on_port(cfg.alarm_port).is_empty());
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::Stats(_))), 3);
    // 2 s sensor polls over ~185 s.
    assert!(rig.detector.reads >= 90);
}

#[test]
fn alarm_reported_in_the_same_iteration_and_guarded() {
    let cfg = RelayConfig::default();
    let (flags, power) = (FlagBus::new(), PowerLossHandler::new());
    let mut rig = Rig::new();
    let mut svc = RelayService::new(&cfg, &flags, &power);
    svc.boot(&rig.store, &mut rig.sink);
    go_online(&mut rig, &mut svc);

    rig.detector.set_alarm(true, 30);
    flags.set(Flag::SensorPoll);
    assert_eq!(rig.step(&mut svc, 400), LedStatus::Alarm);
    assert_eq!(rig.radio.alarm_reports(cfg.alarm_port).len(), 1);

    // Still alarming, but inside the guard interval.
    for now in (600..60_400).step_by(200) {
        flags.set(Flag::SensorPoll);
        rig.step(&mut svc, now);
    }
    assert_eq!(rig.radio.alarm_reports(cfg.alarm_port).len(), 1);

    rig.step(&mut svc, 60_400);
    let reports = rig.radio.alarm_reports(cfg.alarm_port);
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].seq, 1);
    assert_eq!(reports[1].seq, 2);
    assert!(reports.iter().all(|r| r.concentration_lel == 30 && !r.replayed));
}

#[test]
fn no_alarm_report_without_alarm() {
    let cfg = RelayConfig::default();
    let (flags, power) = (FlagBus::new(), PowerLossHandler::new());
    let mut rig = Rig::new();
    let mut svc = RelayService::new(&cfg, &flags, &power);
    svc.boot(&rig.store, &mut rig.sink);
    go_online(&mut rig, &mut svc);

    for now in (400..20_000).step_by(200) {
        flags.set(Flag::SensorPoll);
        rig.step(&mut svc, now);
    }
    assert!(rig.radio.sends.is_empty());
}

#[test]
fn failed_alarm_attempt_waits_for_guard() {
    let cfg = RelayConfig::default();
    let (flags, power) = (FlagBus::new(), PowerLossHandler::new());
    let mut rig = Rig::new();
    let mut svc = RelayService::new(&cfg, &flags, &power);
    svc.boot(&rig.store, &mut rig.sink);
    go_online(&mut rig, &mut svc);

    rig.radio.send_result = Err(LinkError::Busy);
    rig.detector.set_alarm(true, 55);
    flags.set(Flag::SensorPoll);
    rig.step(&mut svc, 400);
    rig.radio.send_result = Ok(());

    for now in (600..60_400).step_by(200) {
        rig.step(&mut svc, now);
    }
    assert_eq!(rig.radio.sends.len(), 1);
    assert_eq!(svc.stats().alarms_failed, 1);

    rig.step(&mut svc, 60_400);
    assert_eq!(rig.radio.sends.len(), 2);
    // The failed attempt did not consume a sequence number.
    assert_eq!(rig.radio.alarm_reports(cfg.alarm_port)[1].seq, 1);
}

#[test]
fn link_loss_drops_session_and_gates_tasks() {
    let cfg = RelayConfig::default();
    let (flags, power) = (FlagBus::new(), PowerLossHandler::new());
    let mut rig = Rig::new();
    let mut svc = RelayService::new(&cfg, &flags, &power);
    svc.boot(&rig.store, &mut rig.sink);
    go_online(&mut rig, &mut svc);

    rig.radio.send_result = Err(LinkError::LinkLost);
    flags.set(Flag::Heartbeat);
    assert_eq!(rig.step(&mut svc, 400), LedStatus::Disconnected);
    assert!(rig.sink.events.contains(&AppEvent::SessionChanged {
        from: SessionState::Online,
        to: SessionState::Disconnected,
    }));

    let reads = rig.detector.reads;
    flags.set(Flag::SensorPoll);
    rig.step(&mut svc, 600);
    assert_eq!(svc.session_state(), SessionState::Disconnected);
    assert_eq!(rig.detector.reads, reads);
    assert!(flags.is_pending(Flag::SensorPoll));

    // Rejoin only after the retry interval measured from the last attempt.
    rig.radio.send_result = Ok(());
    rig.step(&mut svc, u64::from(cfg.join_retry_interval_ms) - 1);
    assert_eq!(rig.radio.join_requests, 1);
    rig.step(&mut svc, u64::from(cfg.join_retry_interval_ms));
    assert_eq!(rig.radio.join_requests, 2);
}

#[test]
fn repeated_detector_errors_show_sensor_fault() {
    let cfg = RelayConfig::default();
    let (flags, power) = (FlagBus::new(), PowerLossHandler::new());
    let mut rig = Rig::new();
    let mut svc = RelayService::new(&cfg, &flags, &power);
    svc.boot(&rig.store, &mut rig.sink);
    go_online(&mut rig, &mut svc);

    rig.detector.reading = Err(SensorError::Timeout);
    let mut led = LedStatus::Online;
    for i in 0..3u64 {
        flags.set(Flag::SensorPoll);
        led = rig.step(&mut svc, 400 + i * 200);
    }
    assert_eq!(led, LedStatus::SensorFault);
    assert_eq!(svc.stats().sensor_errors, 3);
    assert_eq!(
        rig.sink.count(|e| matches!(e, AppEvent::SensorFailed(SensorError::Timeout))),
        3
    );
}
