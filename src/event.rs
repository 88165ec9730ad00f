// MIT License - Copyright (c) 2026 Peter Wright

use crate::state::{AlarmState, TargetState};

/// All notifications emitted by the controller.
///
/// Users subscribe via `controller.subscribe()` to receive a
/// `tokio::sync::broadcast::Receiver<AlarmEvent>`. Delivery is best-effort:
/// the state machine never waits on subscribers.
#[derive(Debug, Clone)]
pub enum AlarmEvent {
    /// A zone reported its physical state. Emitted for every processed zone
    /// event, independent of arm status.
    SensorState { zone_id: String, active: bool },
    /// The `(currentState, targetState)` pair changed.
    StateChanged {
        current: AlarmState,
        target: TargetState,
    },
    /// The alarm fired, attributed to the zone that tripped it.
    Triggered { zone_id: String, zone_name: String },
    /// Siren output control.
    Siren { on: bool },
}

/// Type alias for the broadcast sender.
pub type EventSender = tokio::sync::broadcast::Sender<AlarmEvent>;

/// Type alias for the broadcast receiver.
pub type EventReceiver = tokio::sync::broadcast::Receiver<AlarmEvent>;

/// Create a new event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(capacity)
}
