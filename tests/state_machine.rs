// State machine behavior tests
//
// All tests run on a paused tokio clock: time::advance() moves the exit,
// entry, and alarm-reset timers deterministically, and a few cooperative
// yields let the controller task drain its queue.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::time;

use alarm_engine::{
    AlarmConfig, AlarmController, AlarmEvent, AlarmState, ArmMode, EventReceiver, StateRecord,
    StateStore, TargetState, ZoneConfig, ZoneRegistry,
};

const FRONT_DOOR: &str = "AA:BB:CC:DD:EE:FF";
const HALLWAY: &str = "11:22:33:44:55:66";

fn zone(id: &str, name: &str, home: bool, away: bool, off: bool, entry_secs: i64) -> ZoneConfig {
    ZoneConfig {
        id: id.to_string(),
        name: Some(name.to_string()),
        kind: "contact".to_string(),
        arm_home: home,
        arm_away: away,
        monitor_off: off,
        entry_delay_secs: entry_secs,
    }
}

struct Harness {
    controller: AlarmController,
    events: EventReceiver,
    store: StateStore,
    // Keeps the state file alive for the duration of the test
    _dir: TempDir,
}

fn start(zones: &[ZoneConfig], exit_secs: u64, alarm_secs: u64) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path().join("state.json"));
    let registry = Arc::new(ZoneRegistry::load(zones).unwrap());
    let config = AlarmConfig::builder()
        .exit_delay_secs(exit_secs)
        .alarm_duration_secs(alarm_secs)
        .build();
    let controller = AlarmController::start(registry, store.clone(), config);
    let events = controller.subscribe();
    Harness {
        controller,
        events,
        store,
        _dir: dir,
    }
}

/// Let the controller task and any woken timer tasks run.
async fn tick() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

async fn advance(secs: u64) {
    time::advance(Duration::from_secs(secs)).await;
    tick().await;
}

fn drain(rx: &mut EventReceiver) -> Vec<AlarmEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn current(h: &Harness) -> AlarmState {
    h.controller.state().current
}

fn target(h: &Harness) -> TargetState {
    h.controller.state().target
}

// =========================================================================
// Arming
// =========================================================================

#[tokio::test(start_paused = true)]
async fn zero_exit_delay_arms_synchronously() {
    let mut h = start(&[], 0, 120);
    h.controller.request_arm(ArmMode::Away).unwrap();
    tick().await;

    assert_eq!(current(&h), AlarmState::ArmedAway);
    assert_eq!(target(&h), TargetState::ArmedAway);

    // No observable arming intermediate: exactly one state change, straight
    // to armed
    let changes: Vec<_> = drain(&mut h.events)
        .into_iter()
        .filter_map(|e| match e {
            AlarmEvent::StateChanged { current, .. } => Some(current),
            _ => None,
        })
        .collect();
    assert_eq!(changes, vec![AlarmState::ArmedAway]);

    // Committed transitions persist
    assert_eq!(h.store.load().current, AlarmState::ArmedAway);
}

#[tokio::test(start_paused = true)]
async fn exit_delay_holds_then_commits() {
    let mut h = start(&[], 30, 120);
    h.controller.request_arm(ArmMode::Home).unwrap();
    tick().await;
    assert_eq!(current(&h), AlarmState::ArmingHome);

    advance(29).await;
    assert_eq!(current(&h), AlarmState::ArmingHome);

    advance(1).await;
    assert_eq!(current(&h), AlarmState::ArmedHome);
    assert_eq!(h.store.load().current, AlarmState::ArmedHome);

    let changes: Vec<_> = drain(&mut h.events)
        .into_iter()
        .filter_map(|e| match e {
            AlarmEvent::StateChanged { current, .. } => Some(current),
            _ => None,
        })
        .collect();
    assert_eq!(changes, vec![AlarmState::ArmingHome, AlarmState::ArmedHome]);
}

#[tokio::test(start_paused = true)]
async fn disarm_supersedes_exit_delay() {
    let h = start(&[], 30, 120);
    h.controller.request_arm(ArmMode::Away).unwrap();
    tick().await;
    assert_eq!(current(&h), AlarmState::ArmingAway);

    // Arming is not committed, so nothing has been persisted yet
    assert!(!h.store.path().exists());

    advance(10).await;
    h.controller.request_disarm().unwrap();
    tick().await;
    assert_eq!(current(&h), AlarmState::Disarmed);

    // The one and only write reflects the disarm
    assert_eq!(h.store.load(), StateRecord::default());

    // The superseded exit timer never fires
    advance(60).await;
    assert_eq!(current(&h), AlarmState::Disarmed);
}

#[tokio::test(start_paused = true)]
async fn rearm_during_exit_delay_restarts_the_clock() {
    let h = start(&[], 30, 120);
    h.controller.request_arm(ArmMode::Away).unwrap();
    tick().await;

    advance(20).await;
    h.controller.request_arm(ArmMode::Home).unwrap();
    tick().await;
    assert_eq!(current(&h), AlarmState::ArmingHome);

    // The first request's timer was cancelled: 30s after the *first* arm,
    // nothing commits
    advance(15).await;
    assert_eq!(current(&h), AlarmState::ArmingHome);

    // 30s after the second request, the home arm commits
    advance(15).await;
    assert_eq!(current(&h), AlarmState::ArmedHome);
}

// =========================================================================
// Triggering
// =========================================================================

#[tokio::test(start_paused = true)]
async fn front_door_away_scenario() {
    // Contact zone, away-armed, 30s entry delay, 120s alarm duration
    let zones = [zone(FRONT_DOOR, "Front Door", false, true, false, 30)];
    let mut h = start(&zones, 0, 120);

    h.controller.request_arm(ArmMode::Away).unwrap();
    tick().await;
    assert_eq!(current(&h), AlarmState::ArmedAway);

    h.controller.handle_zone_event(FRONT_DOOR, true).unwrap();
    tick().await;
    // Entry delay running: not yet triggered
    assert_eq!(current(&h), AlarmState::ArmedAway);

    advance(30).await;
    assert_eq!(current(&h), AlarmState::Triggered);
    assert_eq!(h.store.load().current, AlarmState::Triggered);

    let events = drain(&mut h.events);
    assert!(events.iter().any(|e| matches!(
        e,
        AlarmEvent::Triggered { zone_name, .. } if zone_name == "Front Door"
    )));
    assert!(
        events
            .iter()
            .any(|e| matches!(e, AlarmEvent::Siren { on: true }))
    );

    // Alarm duration elapses: back to the pre-alarm target, siren off
    advance(120).await;
    assert_eq!(current(&h), AlarmState::ArmedAway);
    assert_eq!(target(&h), TargetState::ArmedAway);
    assert!(
        drain(&mut h.events)
            .iter()
            .any(|e| matches!(e, AlarmEvent::Siren { on: false }))
    );
}

#[tokio::test(start_paused = true)]
async fn disarm_during_entry_delay_prevents_trigger() {
    let zones = [zone(FRONT_DOOR, "Front Door", false, true, false, 30)];
    let mut h = start(&zones, 0, 120);

    h.controller.request_arm(ArmMode::Away).unwrap();
    tick().await;
    h.controller.handle_zone_event(FRONT_DOOR, true).unwrap();
    tick().await;

    advance(10).await;
    h.controller.request_disarm().unwrap();
    tick().await;
    assert_eq!(current(&h), AlarmState::Disarmed);

    advance(100).await;
    assert_eq!(current(&h), AlarmState::Disarmed);
    assert!(
        !drain(&mut h.events)
            .iter()
            .any(|e| matches!(e, AlarmEvent::Triggered { .. }))
    );
}

#[tokio::test(start_paused = true)]
async fn retrigger_while_triggered_does_not_extend_the_alarm() {
    let zones = [zone(FRONT_DOOR, "Front Door", false, true, false, 0)];
    let mut h = start(&zones, 0, 120);

    h.controller.request_arm(ArmMode::Away).unwrap();
    tick().await;
    h.controller.handle_zone_event(FRONT_DOOR, true).unwrap();
    tick().await;
    assert_eq!(current(&h), AlarmState::Triggered);

    // Repeated events while triggered must not reschedule the reset timer
    advance(60).await;
    h.controller.handle_zone_event(FRONT_DOOR, true).unwrap();
    tick().await;
    assert_eq!(current(&h), AlarmState::Triggered);

    advance(60).await;
    assert_eq!(current(&h), AlarmState::ArmedAway);

    let triggered = drain(&mut h.events)
        .iter()
        .filter(|e| matches!(e, AlarmEvent::Triggered { .. }))
        .count();
    assert_eq!(triggered, 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_entry_delays_first_trigger_wins() {
    let zones = [
        zone(FRONT_DOOR, "Front Door", false, true, false, 10),
        zone(HALLWAY, "Hallway", false, true, false, 20),
    ];
    let mut h = start(&zones, 0, 120);

    h.controller.request_arm(ArmMode::Away).unwrap();
    tick().await;
    h.controller.handle_zone_event(FRONT_DOOR, true).unwrap();
    h.controller.handle_zone_event(HALLWAY, true).unwrap();
    tick().await;

    advance(10).await;
    assert_eq!(current(&h), AlarmState::Triggered);

    // Hallway's timer fires into an already-triggered system: no-op
    advance(10).await;
    let events = drain(&mut h.events);
    let names: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            AlarmEvent::Triggered { zone_name, .. } => Some(zone_name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["Front Door"]);
}

// =========================================================================
// Policy and modes
// =========================================================================

#[tokio::test(start_paused = true)]
async fn zone_is_ignored_in_unmonitored_mode() {
    // Home-only zone, system armed away
    let zones = [zone(FRONT_DOOR, "Front Door", true, false, false, 0)];
    let mut h = start(&zones, 0, 120);

    h.controller.request_arm(ArmMode::Away).unwrap();
    tick().await;
    h.controller.handle_zone_event(FRONT_DOOR, true).unwrap();
    tick().await;
    assert_eq!(current(&h), AlarmState::ArmedAway);

    // The physical state is still reported
    assert!(drain(&mut h.events).iter().any(|e| matches!(
        e,
        AlarmEvent::SensorState { active: true, .. }
    )));

    // Same zone under home arming does trigger
    h.controller.request_disarm().unwrap();
    h.controller.request_arm(ArmMode::Home).unwrap();
    tick().await;
    h.controller.handle_zone_event(FRONT_DOOR, true).unwrap();
    tick().await;
    assert_eq!(current(&h), AlarmState::Triggered);
}

#[tokio::test(start_paused = true)]
async fn sensor_state_is_reported_while_disarmed() {
    let zones = [zone(FRONT_DOOR, "Front Door", true, true, false, 0)];
    let mut h = start(&zones, 0, 120);

    h.controller.handle_zone_event(FRONT_DOOR, true).unwrap();
    h.controller.handle_zone_event(FRONT_DOOR, false).unwrap();
    tick().await;

    assert_eq!(current(&h), AlarmState::Disarmed);
    let states: Vec<_> = drain(&mut h.events)
        .into_iter()
        .filter_map(|e| match e {
            AlarmEvent::SensorState { active, .. } => Some(active),
            _ => None,
        })
        .collect();
    assert_eq!(states, vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn monitor_off_zone_triggers_while_disarmed() {
    // 24-hour style zone with no entry delay
    let zones = [zone(FRONT_DOOR, "Safe Room", false, false, true, 0)];
    let h = start(&zones, 0, 120);

    h.controller.handle_zone_event(FRONT_DOOR, true).unwrap();
    tick().await;
    assert_eq!(current(&h), AlarmState::Triggered);

    // The alarm resets back to the disarmed target, not to an armed state
    advance(120).await;
    assert_eq!(current(&h), AlarmState::Disarmed);
    assert_eq!(target(&h), TargetState::Disarmed);
}

#[tokio::test(start_paused = true)]
async fn monitor_off_zone_with_entry_delay_never_fires_while_disarmed() {
    // The entry-delay re-check requires an armed target, so a delayed
    // 24-hour zone cannot fire from the disarmed state
    let zones = [zone(FRONT_DOOR, "Safe Room", false, false, true, 15)];
    let h = start(&zones, 0, 120);

    h.controller.handle_zone_event(FRONT_DOOR, true).unwrap();
    tick().await;
    advance(60).await;
    assert_eq!(current(&h), AlarmState::Disarmed);
}

#[tokio::test(start_paused = true)]
async fn unknown_zone_event_is_ignored() {
    let zones = [zone(FRONT_DOOR, "Front Door", true, true, false, 0)];
    let mut h = start(&zones, 0, 120);

    h.controller.request_arm(ArmMode::Away).unwrap();
    tick().await;
    drain(&mut h.events);

    h.controller.handle_zone_event("DE:AD:BE:EF:00:00", true).unwrap();
    tick().await;

    assert_eq!(current(&h), AlarmState::ArmedAway);
    assert!(drain(&mut h.events).is_empty());
}

// =========================================================================
// While triggered
// =========================================================================

#[tokio::test(start_paused = true)]
async fn arm_request_while_triggered_is_held_until_reset() {
    let zones = [zone(FRONT_DOOR, "Front Door", false, true, false, 0)];
    let h = start(&zones, 0, 120);

    h.controller.request_arm(ArmMode::Away).unwrap();
    tick().await;
    h.controller.handle_zone_event(FRONT_DOOR, true).unwrap();
    tick().await;
    assert_eq!(current(&h), AlarmState::Triggered);

    // Retarget while the siren sounds: current state holds
    h.controller.request_arm(ArmMode::Home).unwrap();
    tick().await;
    assert_eq!(current(&h), AlarmState::Triggered);
    assert_eq!(target(&h), TargetState::ArmedHome);

    // The reset timer still fires on the original schedule and lands on the
    // new target
    advance(120).await;
    assert_eq!(current(&h), AlarmState::ArmedHome);
}

#[tokio::test(start_paused = true)]
async fn disarm_while_triggered_silences_immediately() {
    let zones = [zone(FRONT_DOOR, "Front Door", false, true, false, 0)];
    let mut h = start(&zones, 0, 120);

    h.controller.request_arm(ArmMode::Away).unwrap();
    tick().await;
    h.controller.handle_zone_event(FRONT_DOOR, true).unwrap();
    tick().await;
    assert_eq!(current(&h), AlarmState::Triggered);
    drain(&mut h.events);

    advance(30).await;
    h.controller.request_disarm().unwrap();
    tick().await;
    assert_eq!(current(&h), AlarmState::Disarmed);
    assert!(
        drain(&mut h.events)
            .iter()
            .any(|e| matches!(e, AlarmEvent::Siren { on: false }))
    );

    // The cancelled reset timer never brings the armed state back
    advance(300).await;
    assert_eq!(current(&h), AlarmState::Disarmed);
}

// =========================================================================
// Restart durability
// =========================================================================

#[tokio::test(start_paused = true)]
async fn restart_restores_persisted_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path().join("state.json"));
    store
        .save(&StateRecord {
            current: AlarmState::ArmedAway,
            target: TargetState::ArmedAway,
        })
        .unwrap();

    let zones = [zone(FRONT_DOOR, "Front Door", false, true, false, 0)];
    let registry = Arc::new(ZoneRegistry::load(&zones).unwrap());
    let config = AlarmConfig::builder().exit_delay_secs(0).build();
    let controller = AlarmController::start(registry, store, config);
    tick().await;

    // Loaded exactly as persisted, no re-arm, away policy live immediately
    assert_eq!(controller.state().current, AlarmState::ArmedAway);
    controller.handle_zone_event(FRONT_DOOR, true).unwrap();
    tick().await;
    assert_eq!(controller.state().current, AlarmState::Triggered);
}

#[tokio::test(start_paused = true)]
async fn restored_triggered_state_settles_to_target() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path().join("state.json"));
    store
        .save(&StateRecord {
            current: AlarmState::Triggered,
            target: TargetState::ArmedHome,
        })
        .unwrap();

    let registry = Arc::new(ZoneRegistry::load(&[]).unwrap());
    let controller =
        AlarmController::start(registry, store.clone(), AlarmConfig::default());
    tick().await;

    // A reset timer cannot survive the process, so the alarm settles
    assert_eq!(controller.state().current, AlarmState::ArmedHome);
    assert_eq!(controller.state().target, TargetState::ArmedHome);
    assert_eq!(store.load().current, AlarmState::ArmedHome);
}
