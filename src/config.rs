// MIT License - Copyright (c) 2026 Peter Wright

use std::time::Duration;

use serde::Deserialize;

/// System-wide alarm settings, consumed once at startup.
#[derive(Debug, Clone)]
pub struct AlarmConfig {
    /// Display name of the alarm installation.
    pub name: String,
    /// Grace period after an arm request before the system is fully armed.
    /// Zero arms synchronously.
    pub exit_delay: Duration,
    /// How long a triggered alarm sounds before auto-resetting to the
    /// pre-alarm target state.
    pub alarm_duration: Duration,
    /// Whether siren on/off notifications are emitted at all.
    pub siren_enabled: bool,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            name: "Home Alarm".to_string(),
            exit_delay: Duration::from_secs(30),
            alarm_duration: Duration::from_secs(120),
            siren_enabled: true,
        }
    }
}

impl AlarmConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> AlarmConfigBuilder {
        AlarmConfigBuilder::default()
    }
}

/// Builder for AlarmConfig.
#[derive(Debug, Clone, Default)]
pub struct AlarmConfigBuilder {
    config: AlarmConfig,
}

impl AlarmConfigBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn exit_delay_secs(mut self, secs: u64) -> Self {
        self.config.exit_delay = Duration::from_secs(secs);
        self
    }

    pub fn alarm_duration_secs(mut self, secs: u64) -> Self {
        self.config.alarm_duration = Duration::from_secs(secs);
        self
    }

    pub fn siren_enabled(mut self, enabled: bool) -> Self {
        self.config.siren_enabled = enabled;
        self
    }

    pub fn build(self) -> AlarmConfig {
        self.config
    }
}

/// One zone entry as found in the configuration file, before validation.
/// `ZoneRegistry::load` turns a list of these into the immutable registry.
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneConfig {
    /// Hardware address of the sensor (MAC or similar). Normalized by the
    /// registry: separators stripped, uppercased.
    pub id: String,
    /// Display label; defaults to the normalized id.
    #[serde(default)]
    pub name: Option<String>,
    /// Sensor kind: "motion" or "contact".
    #[serde(default = "default_zone_kind")]
    pub kind: String,
    /// Monitored while the system target is armed-home.
    #[serde(default)]
    pub arm_home: bool,
    /// Monitored while the system target is armed-away.
    #[serde(default)]
    pub arm_away: bool,
    /// Monitored even while the system is disarmed (24-hour style zone).
    #[serde(default)]
    pub monitor_off: bool,
    /// Grace period between a qualifying event and the alarm firing.
    /// Kept signed so negative values in a config file are rejected with a
    /// meaningful error rather than a type mismatch.
    #[serde(default)]
    pub entry_delay_secs: i64,
}

fn default_zone_kind() -> String {
    "contact".to_string()
}
