// MIT License - Copyright (c) 2026 Peter Wright

//! MQTT wire conventions: inbound payload normalization and command ops.
//!
//! Sensor bridges differ on how they encode "the door opened": some publish
//! `true`/`1`, some `open` or `motion`. All recognized forms are matched
//! case-insensitively; anything unrecognized is an [`AlarmError::InvalidPayload`]
//! so a misbehaving publisher can never trip the alarm.

use crate::error::{AlarmError, Result};

/// Normalize a raw sensor payload to its boolean reading.
///
/// Recognized "tripped" values: `true`, `1`, `open`, `motion`.
/// Recognized "at rest" values: `false`, `0`, `closed`, `clear`.
pub fn parse_sensor_payload(raw: &str) -> Result<bool> {
    let v = raw.trim();
    if v.eq_ignore_ascii_case("true")
        || v == "1"
        || v.eq_ignore_ascii_case("open")
        || v.eq_ignore_ascii_case("motion")
    {
        Ok(true)
    } else if v.eq_ignore_ascii_case("false")
        || v == "0"
        || v.eq_ignore_ascii_case("closed")
        || v.eq_ignore_ascii_case("clear")
    {
        Ok(false)
    } else {
        Err(AlarmError::InvalidPayload {
            payload: v.to_string(),
        })
    }
}

/// Arm/disarm ops accepted on the command topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmCommand {
    ArmHome,
    ArmAway,
    Disarm,
}

/// Parse a command op string (`ARM_HOME`, `ARM_AWAY`, `DISARM`).
pub fn parse_arm_command(op: &str) -> Option<ArmCommand> {
    match op.trim().to_ascii_uppercase().as_str() {
        "ARM_HOME" => Some(ArmCommand::ArmHome),
        "ARM_AWAY" => Some(ArmCommand::ArmAway),
        "DISARM" => Some(ArmCommand::Disarm),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_payloads() {
        for raw in ["true", "TRUE", "True", "1", "open", "OPEN", "motion", "Motion", " true "] {
            assert_eq!(parse_sensor_payload(raw).ok(), Some(true), "{raw:?}");
        }
    }

    #[test]
    fn inactive_payloads() {
        for raw in ["false", "FALSE", "0", "closed", "Closed", "clear"] {
            assert_eq!(parse_sensor_payload(raw).ok(), Some(false), "{raw:?}");
        }
    }

    #[test]
    fn invalid_payloads() {
        for raw in ["", "yes", "2", "{\"open\":true}", "ouvert"] {
            let err = parse_sensor_payload(raw).unwrap_err();
            assert!(matches!(err, AlarmError::InvalidPayload { .. }), "{raw:?}");
        }
    }

    #[test]
    fn arm_commands() {
        assert_eq!(parse_arm_command("ARM_HOME"), Some(ArmCommand::ArmHome));
        assert_eq!(parse_arm_command("arm_away"), Some(ArmCommand::ArmAway));
        assert_eq!(parse_arm_command(" disarm "), Some(ArmCommand::Disarm));
        assert_eq!(parse_arm_command("ARM"), None);
        assert_eq!(parse_arm_command(""), None);
    }
}
