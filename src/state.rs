// MIT License - Copyright (c) 2026 Peter Wright

use std::fmt;

use serde::{Deserialize, Serialize};

/// Arm request mode, as issued by the user or a remote command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmMode {
    /// Partial/stay arm: occupants are home, perimeter zones monitored.
    Home,
    /// Full arm: premises empty, all away zones monitored.
    Away,
}

impl ArmMode {
    /// The transient state entered while the exit delay runs.
    pub fn arming_state(&self) -> AlarmState {
        match self {
            ArmMode::Home => AlarmState::ArmingHome,
            ArmMode::Away => AlarmState::ArmingAway,
        }
    }
}

/// The policy key a zone's arm policy is consulted under, derived from the
/// target state (`Disarmed` maps to `Off`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemMode {
    Home,
    Away,
    Off,
}

impl fmt::Display for SystemMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SystemMode::Home => "home",
            SystemMode::Away => "away",
            SystemMode::Off => "off",
        };
        f.write_str(s)
    }
}

/// The instantaneously observable system state.
///
/// `ArmingHome`/`ArmingAway` exist only while an exit delay is running and
/// are never persisted; `Triggered` only while an alarm-reset timer is
/// pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AlarmState {
    Disarmed,
    ArmingHome,
    ArmingAway,
    ArmedHome,
    ArmedAway,
    Triggered,
}

impl AlarmState {
    /// The wire/log string representation (e.g. `"armedAway"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmState::Disarmed => "disarmed",
            AlarmState::ArmingHome => "armingHome",
            AlarmState::ArmingAway => "armingAway",
            AlarmState::ArmedHome => "armedHome",
            AlarmState::ArmedAway => "armedAway",
            AlarmState::Triggered => "triggered",
        }
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The state the system is transitioning toward or has settled into.
/// `Triggered` is never a target: it is a detour the system takes on the way
/// back to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetState {
    Disarmed,
    ArmedHome,
    ArmedAway,
}

impl TargetState {
    /// The policy key zones are consulted under while this is the target.
    pub fn mode(&self) -> SystemMode {
        match self {
            TargetState::Disarmed => SystemMode::Off,
            TargetState::ArmedHome => SystemMode::Home,
            TargetState::ArmedAway => SystemMode::Away,
        }
    }

    /// The state the system rests in once any transition toward this target
    /// has completed.
    pub fn resting_state(&self) -> AlarmState {
        match self {
            TargetState::Disarmed => AlarmState::Disarmed,
            TargetState::ArmedHome => AlarmState::ArmedHome,
            TargetState::ArmedAway => AlarmState::ArmedAway,
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self, TargetState::ArmedHome | TargetState::ArmedAway)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetState::Disarmed => "disarmed",
            TargetState::ArmedHome => "armedHome",
            TargetState::ArmedAway => "armedAway",
        }
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ArmMode> for TargetState {
    fn from(mode: ArmMode) -> Self {
        match mode {
            ArmMode::Home => TargetState::ArmedHome,
            ArmMode::Away => TargetState::ArmedAway,
        }
    }
}

/// The persisted `(currentState, targetState)` pair. Written as a single
/// JSON object, overwritten whole on every committed transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    #[serde(rename = "currentState")]
    pub current: AlarmState,
    #[serde(rename = "targetState")]
    pub target: TargetState,
}

impl Default for StateRecord {
    fn default() -> Self {
        Self {
            current: AlarmState::Disarmed,
            target: TargetState::Disarmed,
        }
    }
}
