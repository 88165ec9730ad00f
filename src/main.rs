// MIT License - Copyright (c) 2026 Peter Wright
// MQTT gateway

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::Mutex;
use tokio::time::{Duration, interval};
use tracing::{debug, error, info, warn};

use alarm_engine::protocol::{ArmCommand, parse_arm_command, parse_sensor_payload};
use alarm_engine::{
    AlarmConfig, AlarmController, AlarmEvent, ArmMode, StateStore, ZoneConfig, ZoneRegistry,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "alarm2mqtt")]
#[command(about = "MQTT-driven security alarm controller")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    #[serde(default)]
    alarm: AlarmToml,
    mqtt: MqttToml,
    #[serde(default)]
    zones: Vec<ZoneConfig>,
}

#[derive(Debug, Deserialize)]
struct AlarmToml {
    #[serde(default = "default_alarm_name")]
    name: String,
    #[serde(default = "default_exit_delay")]
    exit_delay_secs: u64,
    #[serde(default = "default_alarm_duration")]
    alarm_duration_secs: u64,
    #[serde(default = "default_siren")]
    siren: bool,
    #[serde(default = "default_state_file")]
    state_file: String,
}

impl Default for AlarmToml {
    fn default() -> Self {
        Self {
            name: default_alarm_name(),
            exit_delay_secs: default_exit_delay(),
            alarm_duration_secs: default_alarm_duration(),
            siren: default_siren(),
            state_file: default_state_file(),
        }
    }
}

fn default_alarm_name() -> String {
    "Home Alarm".to_string()
}
fn default_exit_delay() -> u64 {
    30
}
fn default_alarm_duration() -> u64 {
    120
}
fn default_siren() -> bool {
    true
}
fn default_state_file() -> String {
    "alarm-state.json".to_string()
}

#[derive(Debug, Deserialize)]
struct MqttToml {
    url: String,
    #[serde(default = "default_client_id")]
    client_id: String,
    #[serde(default = "default_command_topic")]
    command_topic: String,
    #[serde(default = "default_sensor_topic")]
    sensor_topic: String,
    #[serde(default = "default_publish_topic")]
    publish_topic: String,
    #[serde(default = "default_snapshot_interval")]
    snapshot_interval_secs: u64,
}

fn default_client_id() -> String {
    "alarm2mqtt".to_string()
}
fn default_command_topic() -> String {
    "alarm/cmd".to_string()
}
fn default_sensor_topic() -> String {
    // Sensor bridges publish under their own roots; match zones by the
    // hardware address embedded in the topic.
    "#".to_string()
}
fn default_publish_topic() -> String {
    "alarm".to_string()
}
fn default_snapshot_interval() -> u64 {
    60
}

fn build_alarm_config(toml: &AlarmToml) -> AlarmConfig {
    AlarmConfig::builder()
        .name(&toml.name)
        .exit_delay_secs(toml.exit_delay_secs)
        .alarm_duration_secs(toml.alarm_duration_secs)
        .siren_enabled(toml.siren)
        .build()
}

// ---------------------------------------------------------------------------
// MQTT JSON types
// ---------------------------------------------------------------------------

// Published messages — all share the {now, op, ...} flat structure

#[derive(Serialize)]
struct MqttStateChange {
    now: u64,
    op: String,
    #[serde(rename = "currentState")]
    current_state: alarm_engine::AlarmState,
    #[serde(rename = "targetState")]
    target_state: alarm_engine::TargetState,
}

// Zone events: {now, op, zone, name}
#[derive(Serialize)]
struct MqttZoneEvent {
    now: u64,
    op: String,
    zone: String,
    name: String,
}

// Simple event with just {now, op}
#[derive(Serialize)]
struct MqttSimpleEvent {
    now: u64,
    op: String,
}

#[derive(Serialize)]
struct MqttSnapshot {
    now: u64,
    op: String,
    state: MqttSnapshotState,
}

#[derive(Serialize)]
struct MqttSnapshotState {
    alarm: MqttAlarmState,
    zones: Vec<MqttZoneState>,
}

#[derive(Serialize)]
struct MqttAlarmState {
    name: String,
    #[serde(rename = "currentState")]
    current_state: alarm_engine::AlarmState,
    #[serde(rename = "targetState")]
    target_state: alarm_engine::TargetState,
}

#[derive(Serialize)]
struct MqttZoneState {
    id: String,
    name: String,
    kind: &'static str,
    /// Last reported physical state; null until the sensor first reports.
    active: Option<bool>,
}

// CMD_ACK response
#[derive(Serialize)]
struct MqttCmdAck {
    now: u64,
    op: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    src: Option<serde_json::Value>,
}

// Inbound command (subscribed)
#[derive(Deserialize)]
struct MqttCommand {
    op: String,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

async fn publish_json(client: &AsyncClient, topic: &str, payload: &impl Serialize, retain: bool) {
    match serde_json::to_string(payload) {
        Ok(json) => {
            if let Err(e) = client.publish(topic, QoS::AtLeastOnce, retain, json).await {
                error!("Failed to publish to {topic}: {e}");
            }
        }
        Err(e) => error!("Failed to serialize MQTT payload: {e}"),
    }
}

async fn publish_zone_event(
    client: &AsyncClient,
    topic: &str,
    op: &str,
    zone_id: &str,
    name: &str,
) {
    let msg = MqttZoneEvent {
        now: now_epoch_ms(),
        op: op.to_string(),
        zone: zone_id.to_string(),
        name: name.to_string(),
    };
    publish_json(client, topic, &msg, false).await;
}

async fn publish_simple_event(client: &AsyncClient, topic: &str, op: &str) {
    let msg = MqttSimpleEvent {
        now: now_epoch_ms(),
        op: op.to_string(),
    };
    publish_json(client, topic, &msg, false).await;
}

async fn publish_cmd_ack(
    client: &AsyncClient,
    topic: &str,
    success: bool,
    src: Option<serde_json::Value>,
) {
    let msg = MqttCmdAck {
        now: now_epoch_ms(),
        op: "CMD_ACK".to_string(),
        success,
        src,
    };
    publish_json(client, topic, &msg, false).await;
}

/// Last reported physical state per zone, kept for snapshots.
type SensorStates = Arc<Mutex<HashMap<String, bool>>>;

async fn build_snapshot(
    alarm_name: &str,
    controller: &AlarmController,
    registry: &ZoneRegistry,
    sensor_states: &SensorStates,
) -> MqttSnapshot {
    let record = controller.state();
    let states = sensor_states.lock().await;

    let mut zones: Vec<MqttZoneState> = registry
        .iter()
        .map(|z| MqttZoneState {
            id: z.id.clone(),
            name: z.name.clone(),
            kind: z.kind.as_str(),
            active: states.get(&z.id).copied(),
        })
        .collect();
    zones.sort_by(|a, b| a.id.cmp(&b.id));

    MqttSnapshot {
        now: now_epoch_ms(),
        op: "SNAPSHOT".to_string(),
        state: MqttSnapshotState {
            alarm: MqttAlarmState {
                name: alarm_name.to_string(),
                current_state: record.current,
                target_state: record.target,
            },
            zones,
        },
    }
}

// ---------------------------------------------------------------------------
// Controller event → MQTT
// ---------------------------------------------------------------------------

async fn handle_alarm_event(
    event: AlarmEvent,
    client: &AsyncClient,
    topic: &str,
    registry: &ZoneRegistry,
    sensor_states: &SensorStates,
) {
    match event {
        AlarmEvent::SensorState { zone_id, active } => {
            let name = registry
                .lookup(&zone_id)
                .map(|z| z.name.clone())
                .unwrap_or_else(|| zone_id.clone());
            sensor_states.lock().await.insert(zone_id.clone(), active);
            let op = if active { "ZONE_ACTIVE" } else { "ZONE_CLEAR" };
            publish_zone_event(client, topic, op, &zone_id, &name).await;
        }

        AlarmEvent::StateChanged { current, target } => {
            info!("Alarm state: {current} (target {target})");
            let msg = MqttStateChange {
                now: now_epoch_ms(),
                op: "STATE_CHANGE".to_string(),
                current_state: current,
                target_state: target,
            };
            // Retained so late subscribers see the posture immediately
            publish_json(client, topic, &msg, true).await;
        }

        AlarmEvent::Triggered { zone_id, zone_name } => {
            publish_zone_event(client, topic, "ALARM_TRIGGERED", &zone_id, &zone_name).await;
        }

        AlarmEvent::Siren { on } => {
            let op = if on { "SIREN_ON" } else { "SIREN_OFF" };
            publish_simple_event(client, topic, op).await;
        }
    }
}

// ---------------------------------------------------------------------------
// MQTT command handler
// ---------------------------------------------------------------------------

async fn handle_command(
    payload_str: &str,
    client: &AsyncClient,
    topic: &str,
    controller: &AlarmController,
) {
    // Raw payload echoed back in the CMD_ACK src field
    let src_json = serde_json::from_str::<serde_json::Value>(payload_str).ok();

    let cmd = match serde_json::from_str::<MqttCommand>(payload_str) {
        Ok(cmd) => cmd,
        Err(e) => {
            warn!("Failed to parse MQTT command: {e}");
            publish_cmd_ack(client, topic, false, src_json).await;
            return;
        }
    };

    let result = match parse_arm_command(&cmd.op) {
        Some(ArmCommand::ArmHome) => {
            info!("Command: ARM_HOME");
            controller.request_arm(ArmMode::Home)
        }
        Some(ArmCommand::ArmAway) => {
            info!("Command: ARM_AWAY");
            controller.request_arm(ArmMode::Away)
        }
        Some(ArmCommand::Disarm) => {
            info!("Command: DISARM");
            controller.request_disarm()
        }
        None => {
            warn!("Unknown command: {}", cmd.op);
            publish_cmd_ack(client, topic, false, src_json).await;
            return;
        }
    };

    let success = match result {
        Ok(()) => true,
        Err(e) => {
            error!("Command {} failed: {e}", cmd.op);
            false
        }
    };
    publish_cmd_ack(client, topic, success, src_json).await;
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=alarm_engine=trace).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();

    // Load config
    let config_text =
        std::fs::read_to_string(&cli.config).context("Failed to read config file")?;
    let config: Config = toml::from_str(&config_text).context("Failed to parse config file")?;

    let registry = Arc::new(ZoneRegistry::load(&config.zones).context("Invalid zone list")?);
    if registry.is_empty() {
        warn!("No zones configured; arm/disarm will work but nothing can trigger");
    } else {
        info!("Loaded {} zones", registry.len());
    }

    let alarm_config = build_alarm_config(&config.alarm);
    let alarm_name = alarm_config.name.clone();
    let store = StateStore::new(&config.alarm.state_file);
    info!("Persisting alarm state to {}", store.path().display());

    let controller = Arc::new(AlarmController::start(
        Arc::clone(&registry),
        store,
        alarm_config,
    ));
    let mut alarm_events = controller.subscribe();

    let (mqtt_host, mqtt_port) = parse_mqtt_url(&config.mqtt.url)?;
    let command_topic = config.mqtt.command_topic;
    let sensor_topic = config.mqtt.sensor_topic;
    let publish_topic = config.mqtt.publish_topic;

    let mut mqtt_opts = MqttOptions::new(&config.mqtt.client_id, &mqtt_host, mqtt_port);
    mqtt_opts.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = AsyncClient::new(mqtt_opts, 256);

    client
        .subscribe(&command_topic, QoS::AtLeastOnce)
        .await
        .context("Failed to subscribe to command topic")?;
    client
        .subscribe(&sensor_topic, QoS::AtLeastOnce)
        .await
        .context("Failed to subscribe to sensor topic")?;
    info!("MQTT: subscribed to {command_topic} and {sensor_topic}");

    let sensor_states: SensorStates = Arc::new(Mutex::new(HashMap::new()));

    // Publish the restored posture and an initial snapshot
    {
        let record = controller.state();
        let msg = MqttStateChange {
            now: now_epoch_ms(),
            op: "STATE_CHANGE".to_string(),
            current_state: record.current,
            target_state: record.target,
        };
        publish_json(&client, &publish_topic, &msg, true).await;
        let snapshot =
            build_snapshot(&alarm_name, &controller, &registry, &sensor_states).await;
        publish_json(&client, &publish_topic, &snapshot, true).await;
    }

    // Task 1: controller event pump — outbound notifications
    let client_events = client.clone();
    let topic_events = publish_topic.clone();
    let registry_events = Arc::clone(&registry);
    let states_events = Arc::clone(&sensor_states);
    let event_handle = tokio::spawn(async move {
        loop {
            match alarm_events.recv().await {
                Ok(event) => {
                    handle_alarm_event(
                        event,
                        &client_events,
                        &topic_events,
                        &registry_events,
                        &states_events,
                    )
                    .await;
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event receiver lagged, missed {n} events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    info!("Event channel closed");
                    break;
                }
            }
        }
    });

    // Task 2: MQTT event loop (receives messages, routes commands and sensors)
    let client_inbound = client.clone();
    let topic_inbound = publish_topic.clone();
    let registry_inbound = Arc::clone(&registry);
    let controller_inbound = Arc::clone(&controller);
    let cmd_topic = command_topic.clone();
    let sens_topic = sensor_topic.clone();
    let mqtt_handle = tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    // (Re)subscribe after every broker connect/reconnect.
                    // rumqttc does not auto-resubscribe, so without this a
                    // broker restart silently drops our subscriptions and we
                    // stop receiving commands and sensor events.
                    info!("MQTT: connected, subscribing to {cmd_topic} and {sens_topic}");
                    for topic in [&cmd_topic, &sens_topic] {
                        if let Err(e) =
                            client_inbound.subscribe(topic, QoS::AtLeastOnce).await
                        {
                            error!("Failed to subscribe to {topic}: {e}");
                        }
                    }
                }
                Ok(Event::Incoming(Packet::Publish(msg))) => {
                    let payload = String::from_utf8_lossy(&msg.payload);
                    if msg.topic == cmd_topic {
                        info!("MQTT command received: {payload}");
                        handle_command(
                            &payload,
                            &client_inbound,
                            &topic_inbound,
                            &controller_inbound,
                        )
                        .await;
                    } else if let Some(zone) = registry_inbound.match_topic(&msg.topic) {
                        match parse_sensor_payload(&payload) {
                            Ok(active) => {
                                debug!(
                                    "Zone {} reported {}",
                                    zone.name,
                                    if active { "active" } else { "clear" }
                                );
                                if let Err(e) =
                                    controller_inbound.handle_zone_event(&zone.id, active)
                                {
                                    error!("Failed to deliver zone event: {e}");
                                }
                            }
                            Err(e) => {
                                warn!("{e} on {} for zone {}", msg.topic, zone.name);
                            }
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT event loop error: {e}");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    // Task 3: snapshot timer — retained periodic state summary
    let client_snap = client.clone();
    let topic_snap = publish_topic.clone();
    let registry_snap = Arc::clone(&registry);
    let controller_snap = Arc::clone(&controller);
    let states_snap = Arc::clone(&sensor_states);
    let name_snap = alarm_name.clone();
    let snapshot_interval_secs = config.mqtt.snapshot_interval_secs;
    let snap_handle = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(snapshot_interval_secs));
        // Skip the first immediate tick (we already published an initial snapshot)
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let snapshot = build_snapshot(
                &name_snap,
                &controller_snap,
                &registry_snap,
                &states_snap,
            )
            .await;
            publish_json(&client_snap, &topic_snap, &snapshot, true).await;
        }
    });

    // Wait for a signal
    let mut sigterm = signal(SignalKind::terminate())?;
    info!("Alarm controller running. Send SIGINT/SIGTERM to stop.");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    // Abort tasks; the controller and its timers stop when dropped
    event_handle.abort();
    mqtt_handle.abort();
    snap_handle.abort();

    info!("Shutdown complete");
    Ok(())
}

/// Parse an MQTT URL like "mqtt://host:port" into (host, port).
fn parse_mqtt_url(url: &str) -> Result<(String, u16)> {
    let stripped = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);

    let (host, port_str) = stripped
        .rsplit_once(':')
        .context("MQTT URL must be in format mqtt://host:port")?;

    let port: u16 = port_str
        .parse()
        .context("Invalid MQTT port number")?;

    Ok((host.to_string(), port))
}
