// MIT License - Copyright (c) 2026 Peter Wright

use std::collections::HashMap;
use std::time::Duration;

use bitflags::bitflags;

use crate::config::ZoneConfig;
use crate::error::{AlarmError, Result};
use crate::state::SystemMode;

bitflags! {
    /// Which system modes a zone is monitored in.
    ///
    /// A set bit means a qualifying event from this zone starts the trigger
    /// path while the system's target mode is that mode. `OFF` marks a
    /// 24-hour style zone that is watched even while disarmed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ArmPolicy: u8 {
        const HOME = 0b001;
        const AWAY = 0b010;
        const OFF  = 0b100;
    }
}

impl ArmPolicy {
    pub fn from_parts(home: bool, away: bool, off: bool) -> Self {
        let mut policy = Self::empty();
        if home {
            policy |= Self::HOME;
        }
        if away {
            policy |= Self::AWAY;
        }
        if off {
            policy |= Self::OFF;
        }
        policy
    }

    /// Whether the zone is monitored under the given mode. Total over all
    /// three modes: an unset bit simply means not monitored.
    pub fn monitored(self, mode: SystemMode) -> bool {
        match mode {
            SystemMode::Home => self.contains(Self::HOME),
            SystemMode::Away => self.contains(Self::AWAY),
            SystemMode::Off => self.contains(Self::OFF),
        }
    }
}

/// Sensor kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneKind {
    Motion,
    Contact,
}

impl ZoneKind {
    pub fn from_code(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "motion" => Some(Self::Motion),
            "contact" => Some(Self::Contact),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Motion => "motion",
            Self::Contact => "contact",
        }
    }
}

/// A single monitored zone. Immutable after registry load.
#[derive(Debug, Clone)]
pub struct Zone {
    /// Normalized hardware address, unique within the registry.
    pub id: String,
    pub name: String,
    pub kind: ZoneKind,
    pub policy: ArmPolicy,
    /// Grace period between a qualifying event and the alarm firing while
    /// this zone is the trigger. Zero fires without scheduling latency.
    pub entry_delay: Duration,
}

/// Normalize a hardware address or topic for matching: strip `:`/`-`
/// separators and uppercase. `aa:bb-cc` and `AABBCC` compare equal.
pub fn normalize_id(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != ':' && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// The static zone table, built once at startup from configuration.
#[derive(Debug, Default)]
pub struct ZoneRegistry {
    zones: HashMap<String, Zone>,
}

impl ZoneRegistry {
    /// Validate raw zone entries and build the registry.
    ///
    /// Fails on duplicate (normalized) ids, unknown kinds, negative entry
    /// delays, and empty ids. These are startup-fatal: the system must not
    /// run with an ambiguous zone table.
    pub fn load(configs: &[ZoneConfig]) -> Result<Self> {
        let mut zones = HashMap::with_capacity(configs.len());

        for cfg in configs {
            let id = normalize_id(&cfg.id);
            if id.is_empty() {
                return Err(AlarmError::EmptyZoneId);
            }
            let kind = ZoneKind::from_code(&cfg.kind).ok_or_else(|| {
                AlarmError::UnknownZoneKind {
                    id: id.clone(),
                    kind: cfg.kind.clone(),
                }
            })?;
            if cfg.entry_delay_secs < 0 {
                return Err(AlarmError::NegativeEntryDelay {
                    id,
                    seconds: cfg.entry_delay_secs,
                });
            }

            let zone = Zone {
                id: id.clone(),
                name: cfg.name.clone().unwrap_or_else(|| id.clone()),
                kind,
                policy: ArmPolicy::from_parts(cfg.arm_home, cfg.arm_away, cfg.monitor_off),
                entry_delay: Duration::from_secs(cfg.entry_delay_secs as u64),
            };
            if zones.insert(id.clone(), zone).is_some() {
                return Err(AlarmError::DuplicateZone { id });
            }
        }

        Ok(Self { zones })
    }

    /// Look up a zone by id. The id is normalized before the lookup, so raw
    /// MAC forms (`aa:bb:...`) resolve too.
    pub fn lookup(&self, id: &str) -> Option<&Zone> {
        self.zones.get(&normalize_id(id))
    }

    /// Find the zone whose id appears in the given MQTT topic.
    ///
    /// Sensor bridges embed the hardware address somewhere in the topic
    /// path, with varying separators, so the topic is normalized the same
    /// way zone ids are and scanned for a contained id. The table is fixed
    /// at startup and small, so the scan is cheap.
    pub fn match_topic(&self, topic: &str) -> Option<&Zone> {
        let normalized = normalize_id(topic);
        self.zones.values().find(|z| normalized.contains(&z.id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}
