// MIT License - Copyright (c) 2026 Peter Wright

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::AlarmConfig;
use crate::error::{AlarmError, Result};
use crate::event::{AlarmEvent, EventReceiver, EventSender, event_channel};
use crate::registry::ZoneRegistry;
use crate::scheduler::{DelayScheduler, TimerKey};
use crate::state::{AlarmState, ArmMode, StateRecord, TargetState};
use crate::store::StateStore;

/// Messages processed by the controller task.
///
/// Inbound requests, zone events, and timer firings all land on one queue,
/// so every read-modify-write of the state pair is serialized and applied
/// in arrival order. Timer firings are ordinary messages — there are no
/// callbacks reaching into the controller from other tasks.
#[derive(Debug, Clone)]
enum ControlMsg {
    Arm(ArmMode),
    Disarm,
    ZoneEvent { zone_id: String, active: bool },
    ExitElapsed,
    EntryElapsed { zone_id: String },
    AlarmElapsed,
}

/// The alarm state machine.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use alarm_engine::{AlarmConfig, AlarmController, StateStore, ZoneConfig, ZoneRegistry};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let zones = vec![ZoneConfig {
///         id: "AA:BB:CC:DD:EE:FF".into(),
///         name: Some("Front Door".into()),
///         kind: "contact".into(),
///         arm_home: true,
///         arm_away: true,
///         monitor_off: false,
///         entry_delay_secs: 30,
///     }];
///     let registry = Arc::new(ZoneRegistry::load(&zones)?);
///     let store = StateStore::new("alarm-state.json");
///     let config = AlarmConfig::builder().exit_delay_secs(30).build();
///
///     let controller = AlarmController::start(registry, store, config);
///
///     let mut events = controller.subscribe();
///     tokio::spawn(async move {
///         while let Ok(event) = events.recv().await {
///             println!("Event: {:?}", event);
///         }
///     });
///
///     controller.request_arm(alarm_engine::ArmMode::Away)?;
///     controller.handle_zone_event("AA:BB:CC:DD:EE:FF", true)?;
///
///     tokio::signal::ctrl_c().await?;
///     Ok(())
/// }
/// ```
pub struct AlarmController {
    tx: mpsc::UnboundedSender<ControlMsg>,
    event_tx: EventSender,
    state_rx: watch::Receiver<StateRecord>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl AlarmController {
    /// Restore persisted state and spawn the controller task.
    pub fn start(registry: Arc<ZoneRegistry>, store: StateStore, config: AlarmConfig) -> Self {
        let restored = Self::restore(&store);

        let (event_tx, _event_rx) = event_channel(256);
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(restored);

        let task = ControllerTask {
            registry,
            store,
            config,
            timers: DelayScheduler::new(tx.clone()),
            rx,
            event_tx: event_tx.clone(),
            state_tx,
            current: restored.current,
            target: restored.target,
            siren_on: false,
        };
        let handle = tokio::spawn(task.run());

        Self {
            tx,
            event_tx,
            state_rx,
            task: Some(handle),
        }
    }

    /// Load the persisted record and settle transient states that cannot
    /// outlive a restart: `Triggered` is only valid while a reset timer is
    /// pending, and timers do not survive the process.
    fn restore(store: &StateStore) -> StateRecord {
        let mut record = store.load();
        let resting = record.target.resting_state();
        if record.current == AlarmState::Triggered {
            info!(
                "restored state was triggered; settling to {} (alarm timer does not survive restart)",
                resting
            );
            record.current = resting;
            if let Err(e) = store.save(&record) {
                warn!("failed to persist settled state: {e}");
            }
        } else if record.current != resting {
            info!(
                "restored state {} does not match target {}; settling",
                record.current, record.target
            );
            record.current = resting;
            if let Err(e) = store.save(&record) {
                warn!("failed to persist settled state: {e}");
            }
        }
        record
    }

    /// Subscribe to controller notifications.
    pub fn subscribe(&self) -> EventReceiver {
        self.event_tx.subscribe()
    }

    /// Snapshot of the current `(currentState, targetState)` pair.
    pub fn state(&self) -> StateRecord {
        *self.state_rx.borrow()
    }

    /// Request arming in the given mode. Commits after the exit delay
    /// (immediately when it is zero); superseded by any later request.
    pub fn request_arm(&self, mode: ArmMode) -> Result<()> {
        self.tx
            .send(ControlMsg::Arm(mode))
            .map_err(|_| AlarmError::ChannelClosed)
    }

    /// Disarm: cancels every pending timer and silences the siren.
    pub fn request_disarm(&self) -> Result<()> {
        self.tx
            .send(ControlMsg::Disarm)
            .map_err(|_| AlarmError::ChannelClosed)
    }

    /// Feed one zone event into the state machine. `zone_id` may be any raw
    /// form of the hardware address; events for unknown zones are ignored.
    pub fn handle_zone_event(&self, zone_id: &str, active: bool) -> Result<()> {
        self.tx
            .send(ControlMsg::ZoneEvent {
                zone_id: zone_id.to_string(),
                active,
            })
            .map_err(|_| AlarmError::ChannelClosed)
    }

    /// Stop the controller task. Pending timers die with it.
    pub fn shutdown(mut self) {
        if let Some(handle) = self.task.take() {
            handle.abort();
        }
    }
}

impl Drop for AlarmController {
    fn drop(&mut self) {
        if let Some(handle) = self.task.take() {
            handle.abort();
        }
    }
}

/// State owned exclusively by the controller task.
struct ControllerTask {
    registry: Arc<ZoneRegistry>,
    store: StateStore,
    config: AlarmConfig,
    timers: DelayScheduler<ControlMsg>,
    rx: mpsc::UnboundedReceiver<ControlMsg>,
    event_tx: EventSender,
    state_tx: watch::Sender<StateRecord>,
    current: AlarmState,
    target: TargetState,
    siren_on: bool,
}

impl ControllerTask {
    async fn run(mut self) {
        info!(
            "alarm controller running: {} zones, state {}/{}",
            self.registry.len(),
            self.current,
            self.target
        );
        while let Some(msg) = self.rx.recv().await {
            self.dispatch(msg);
        }
        debug!("controller queue closed, stopping");
    }

    fn dispatch(&mut self, msg: ControlMsg) {
        match msg {
            ControlMsg::Arm(mode) => self.on_arm(mode),
            ControlMsg::Disarm => self.on_disarm(),
            ControlMsg::ZoneEvent { zone_id, active } => self.on_zone_event(&zone_id, active),
            ControlMsg::ExitElapsed => self.on_exit_elapsed(),
            ControlMsg::EntryElapsed { zone_id } => self.on_entry_elapsed(&zone_id),
            ControlMsg::AlarmElapsed => self.on_alarm_elapsed(),
        }
    }

    fn on_arm(&mut self, mode: ArmMode) {
        let target = TargetState::from(mode);

        if self.current == AlarmState::Triggered {
            // Held while the alarm sounds: only the post-reset target moves.
            if self.target != target {
                info!("arm request to {target} held until the active alarm resets");
                self.target = target;
                self.persist();
                self.notify_state();
            }
            return;
        }

        self.timers.cancel(&TimerKey::Exit);
        self.timers.cancel(&TimerKey::Reset);
        self.target = target;

        if self.config.exit_delay.is_zero() {
            self.settle();
        } else {
            self.current = mode.arming_state();
            info!(
                "exit delay started: {}s until {}",
                self.config.exit_delay.as_secs(),
                target
            );
            // Not persisted: arming is only committed once the exit delay
            // elapses uninterrupted.
            self.notify_state();
            self.timers
                .schedule(TimerKey::Exit, self.config.exit_delay, ControlMsg::ExitElapsed);
        }
    }

    fn on_disarm(&mut self) {
        self.timers.cancel_all();
        self.target = TargetState::Disarmed;
        self.current = AlarmState::Disarmed;
        info!("system disarmed");
        self.persist();
        self.notify_state();
        self.set_siren(false);
    }

    fn on_zone_event(&mut self, zone_id: &str, active: bool) {
        let Some(zone) = self.registry.lookup(zone_id) else {
            debug!("event for unknown zone {zone_id}, ignored");
            return;
        };
        let zone = zone.clone();

        // Sensors always report their physical state, armed or not.
        let _ = self.event_tx.send(AlarmEvent::SensorState {
            zone_id: zone.id.clone(),
            active,
        });

        if !active {
            return;
        }
        if self.current == AlarmState::Triggered {
            debug!("zone {} active while alarm already sounding", zone.name);
            return;
        }
        let mode = self.target.mode();
        if !zone.policy.monitored(mode) {
            debug!("zone {} not monitored in {mode} mode", zone.name);
            return;
        }

        if zone.entry_delay.is_zero() {
            self.trigger(&zone.id, &zone.name);
        } else {
            info!(
                "entry delay started for {}: {}s",
                zone.name,
                zone.entry_delay.as_secs()
            );
            self.timers.schedule(
                TimerKey::Entry(zone.id.clone()),
                zone.entry_delay,
                ControlMsg::EntryElapsed { zone_id: zone.id },
            );
        }
    }

    fn on_exit_elapsed(&mut self) {
        if self.current == AlarmState::Triggered {
            // A zone tripped during the exit delay; the reset timer owns the
            // way back.
            return;
        }
        if !self.target.is_armed() {
            debug!("stale exit timer fired while target is {}", self.target);
            return;
        }
        self.settle();
    }

    fn on_entry_elapsed(&mut self, zone_id: &str) {
        if self.current == AlarmState::Triggered {
            // Another zone fired first.
            return;
        }
        // Authoritative guard: a disarm cancels entry timers, but the state
        // re-check decides even if a stale firing slips through.
        if !self.target.is_armed() {
            debug!("entry delay for {zone_id} elapsed after disarm, ignored");
            return;
        }
        let Some(zone) = self.registry.lookup(zone_id) else {
            return;
        };
        let (id, name) = (zone.id.clone(), zone.name.clone());
        self.trigger(&id, &name);
    }

    fn on_alarm_elapsed(&mut self) {
        if self.current != AlarmState::Triggered {
            return;
        }
        info!("alarm duration elapsed, restoring {} state", self.target);
        self.set_siren(false);
        self.settle();
    }

    fn trigger(&mut self, zone_id: &str, zone_name: &str) {
        warn!("alarm triggered by {zone_name}");
        self.current = AlarmState::Triggered;
        self.persist();
        self.notify_state();
        let _ = self.event_tx.send(AlarmEvent::Triggered {
            zone_id: zone_id.to_string(),
            zone_name: zone_name.to_string(),
        });
        self.set_siren(true);
        self.timers.schedule(
            TimerKey::Reset,
            self.config.alarm_duration,
            ControlMsg::AlarmElapsed,
        );
    }

    /// Commit the resting state for the current target. Shared by immediate
    /// arming, the exit-delay firing, and the post-alarm reset.
    fn settle(&mut self) {
        self.current = self.target.resting_state();
        info!("system now {}", self.current);
        self.persist();
        self.notify_state();
    }

    fn set_siren(&mut self, on: bool) {
        if !self.config.siren_enabled || self.siren_on == on {
            return;
        }
        self.siren_on = on;
        let _ = self.event_tx.send(AlarmEvent::Siren { on });
    }

    fn persist(&mut self) {
        let record = StateRecord {
            current: self.current,
            target: self.target,
        };
        if let Err(e) = self.store.save(&record) {
            // In-memory state stays authoritative; the next successful
            // write self-heals.
            warn!("failed to persist alarm state: {e}");
        }
    }

    fn notify_state(&mut self) {
        let record = StateRecord {
            current: self.current,
            target: self.target,
        };
        let _ = self.state_tx.send(record);
        let _ = self.event_tx.send(AlarmEvent::StateChanged {
            current: self.current,
            target: self.target,
        });
    }
}
