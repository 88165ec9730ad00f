// MIT License - Copyright (c) 2026 Peter Wright

//! # alarm-engine
//!
//! Security-alarm controller core: arm/disarm state machine, zone
//! monitoring, intrusion detection, and durable state, independent of any
//! particular transport. The `alarm2mqtt` binary in this repository wires
//! it to MQTT.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use alarm_engine::{AlarmConfig, AlarmController, ArmMode, StateStore, ZoneConfig, ZoneRegistry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let zones = vec![ZoneConfig {
//!         id: "AA:BB:CC:DD:EE:FF".into(),
//!         name: Some("Front Door".into()),
//!         kind: "contact".into(),
//!         arm_home: true,
//!         arm_away: true,
//!         monitor_off: false,
//!         entry_delay_secs: 30,
//!     }];
//!     let registry = Arc::new(ZoneRegistry::load(&zones)?);
//!     let store = StateStore::new("alarm-state.json");
//!     let config = AlarmConfig::builder()
//!         .exit_delay_secs(30)
//!         .alarm_duration_secs(120)
//!         .build();
//!
//!     let controller = AlarmController::start(registry, store, config);
//!
//!     let mut events = controller.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     controller.request_arm(ArmMode::Away)?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod protocol;
pub mod registry;
pub mod scheduler;
pub mod state;
pub mod store;

// Re-exports for convenience
pub use config::{AlarmConfig, AlarmConfigBuilder, ZoneConfig};
pub use controller::AlarmController;
pub use error::{AlarmError, Result};
pub use event::{AlarmEvent, EventReceiver, EventSender};
pub use registry::{ArmPolicy, Zone, ZoneKind, ZoneRegistry};
pub use state::{AlarmState, ArmMode, StateRecord, SystemMode, TargetState};
pub use store::StateStore;
