//! MQTT accessory platform.
//!
//! Finds the light through Home Assistant MQTT discovery, tracks its
//! availability topic, and drives it with the JSON light schema:
//! 1. Subscribes to `<discovery_prefix>/light/#` and waits for a retained
//!    `.../config` whose `name` matches the configured accessory
//! 2. Subscribes to the accessory's availability topic (if it has one)
//! 3. Publishes commands to its `command_topic` with QoS 1
//!
//! Connection loss marks the accessory unreachable; the event loop keeps
//! polling, which makes rumqttc reconnect, and subscriptions are renewed on
//! every ConnAck.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rumqttc::v5::{mqttbytes::QoS, Client, Connection, Event, Incoming, MqttOptions};
use rumqttc::Transport;
use serde::{Deserialize, Serialize};

use super::handle::DeviceHandle;
use super::registry::DeviceRegistry;
use crate::config::{DeviceSettings, MqttSettings};
use crate::gesture::{Command, MAX_BRIGHTNESS, MAX_HUE};

const PAYLOAD_ONLINE: &str = "online";
const PAYLOAD_OFFLINE: &str = "offline";
const DEFAULT_BRIGHTNESS_SCALE: u32 = 255;
const MAX_BRIGHTNESS_SCALE: u32 = 65_535;
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);
const REQUEST_CAPACITY: usize = 32;

// ----------------------------------------------------------------------------
// Broker endpoint
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

/// Parse `host:port`, optionally prefixed by `mqtt://`, `tcp://`, `mqtts://` or `ssl://`.
pub fn parse_mqtt_endpoint(addr: &str) -> Result<MqttEndpoint> {
    let mut use_tls = false;
    let mut remainder = addr.trim();

    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => {}
            "mqtts" | "ssl" => use_tls = true,
            other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
        }
        remainder = rest;
    }

    let (host, port) = split_host_port(remainder)?;
    Ok(MqttEndpoint {
        host,
        port,
        use_tls,
    })
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
        let port: u16 = port.parse().context("invalid MQTT port")?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
    if host.is_empty() {
        return Err(anyhow!("missing MQTT host in {}", addr));
    }
    let port: u16 = port.parse().context("invalid MQTT port")?;
    Ok((host.to_string(), port))
}

// ----------------------------------------------------------------------------
// Discovery
// ----------------------------------------------------------------------------

/// Subset of a Home Assistant MQTT light discovery config.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct LightDiscoveryConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(alias = "cmd_t")]
    pub command_topic: String,
    #[serde(default, alias = "avty_t")]
    pub availability_topic: Option<String>,
    #[serde(default = "default_payload_available", alias = "pl_avail")]
    pub payload_available: String,
    #[serde(default = "default_payload_not_available", alias = "pl_not_avail")]
    pub payload_not_available: String,
    #[serde(default = "default_brightness_scale", alias = "bri_scl")]
    pub brightness_scale: u32,
}

fn default_payload_available() -> String {
    PAYLOAD_ONLINE.to_string()
}

fn default_payload_not_available() -> String {
    PAYLOAD_OFFLINE.to_string()
}

fn default_brightness_scale() -> u32 {
    DEFAULT_BRIGHTNESS_SCALE
}

/// Accessory-level change derived from an incoming message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlatformEvent {
    Discovered(LightDiscoveryConfig),
    Availability(bool),
}

/// Turns discovery and availability messages into `PlatformEvent`s for one
/// named accessory.
#[derive(Debug)]
pub struct DiscoveryTracker {
    discovery_prefix: String,
    device_name: String,
    active: Option<LightDiscoveryConfig>,
}

impl DiscoveryTracker {
    pub fn new(discovery_prefix: &str, device_name: &str) -> Self {
        Self {
            discovery_prefix: discovery_prefix.trim_end_matches('/').to_string(),
            device_name: device_name.to_string(),
            active: None,
        }
    }

    /// Topic filter covering every light discovery config.
    pub fn discovery_filter(&self) -> String {
        format!("{}/light/#", self.discovery_prefix)
    }

    pub fn availability_topic(&self) -> Option<&str> {
        self.active
            .as_ref()
            .and_then(|config| config.availability_topic.as_deref())
    }

    pub fn handle(&mut self, topic: &str, payload: &[u8]) -> Result<Option<PlatformEvent>> {
        let light_prefix = format!("{}/light/", self.discovery_prefix);
        if topic.starts_with(&light_prefix) && topic.ends_with("/config") {
            if payload.is_empty() {
                // Entity removal; the accessory stays known.
                log::debug!("ignoring empty discovery config on {}", topic);
                return Ok(None);
            }
            let config: LightDiscoveryConfig = serde_json::from_slice(payload)
                .with_context(|| format!("invalid light discovery config on {}", topic))?;
            if config.name.as_deref() != Some(self.device_name.as_str()) {
                log::debug!(
                    "skipping light {:?} on {} (looking for '{}')",
                    config.name,
                    topic,
                    self.device_name
                );
                return Ok(None);
            }
            if config.brightness_scale == 0 || config.brightness_scale > MAX_BRIGHTNESS_SCALE {
                return Err(anyhow!(
                    "light '{}' on {} has brightness_scale {} (expected 1..={})",
                    self.device_name,
                    topic,
                    config.brightness_scale,
                    MAX_BRIGHTNESS_SCALE
                ));
            }
            self.active = Some(config.clone());
            return Ok(Some(PlatformEvent::Discovered(config)));
        }

        let Some(config) = self.active.as_ref() else {
            return Ok(None);
        };
        if config.availability_topic.as_deref() != Some(topic) {
            return Ok(None);
        }
        let value = String::from_utf8_lossy(payload);
        let value = value.trim();
        if value == config.payload_available {
            Ok(Some(PlatformEvent::Availability(true)))
        } else if value == config.payload_not_available {
            Ok(Some(PlatformEvent::Availability(false)))
        } else {
            Err(anyhow!("unexpected availability payload '{}' on {}", value, topic))
        }
    }
}

// ----------------------------------------------------------------------------
// Light handle
// ----------------------------------------------------------------------------

#[derive(Serialize)]
struct LightCommandPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    brightness: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<HsColor>,
}

#[derive(Serialize)]
struct HsColor {
    h: u16,
    s: u8,
}

/// Encode a command in the JSON light schema.
pub fn encode_command(command: Command, brightness_scale: u32, saturation: u8) -> Result<Vec<u8>> {
    let payload = match command {
        Command::SetPower(on) => LightCommandPayload {
            state: Some(if on { "ON" } else { "OFF" }),
            brightness: None,
            color: None,
        },
        Command::SetHue(degrees) => LightCommandPayload {
            state: None,
            brightness: None,
            color: Some(HsColor {
                h: degrees.min(MAX_HUE),
                s: saturation.min(100),
            }),
        },
        Command::SetBrightness(percent) => {
            if brightness_scale == 0 {
                return Err(anyhow!("brightness_scale must be greater than zero"));
            }
            let percent = u64::from(percent.min(MAX_BRIGHTNESS));
            let scaled = (percent * u64::from(brightness_scale) + 50) / 100;
            LightCommandPayload {
                state: None,
                brightness: Some(u32::try_from(scaled).context("scaled brightness out of range")?),
                color: None,
            }
        }
    };
    Ok(serde_json::to_vec(&payload)?)
}

/// Light reached through an MQTT command topic.
pub struct MqttLight {
    name: String,
    client: Client,
    command_topic: String,
    brightness_scale: u32,
    saturation: u8,
}

impl MqttLight {
    pub fn new(name: &str, client: Client, config: &LightDiscoveryConfig, saturation: u8) -> Self {
        Self {
            name: name.to_string(),
            client,
            command_topic: config.command_topic.clone(),
            brightness_scale: config.brightness_scale,
            saturation,
        }
    }

    fn publish(&self, command: Command) -> Result<()> {
        let payload = encode_command(command, self.brightness_scale, self.saturation)?;
        // Never blocks the frame worker; a full request queue is a rejected command.
        self.client
            .try_publish(
                self.command_topic.clone(),
                QoS::AtLeastOnce,
                false,
                payload,
            )
            .with_context(|| format!("{} rejected by MQTT client ({})", command, self.command_topic))?;
        Ok(())
    }
}

impl DeviceHandle for MqttLight {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_power(&self, on: bool) -> Result<()> {
        self.publish(Command::SetPower(on))
    }

    fn set_hue(&self, degrees: u16) -> Result<()> {
        self.publish(Command::SetHue(degrees.min(MAX_HUE)))
    }

    fn set_brightness(&self, percent: u8) -> Result<()> {
        self.publish(Command::SetBrightness(percent.min(MAX_BRIGHTNESS)))
    }
}

// ----------------------------------------------------------------------------
// Platform event loop
// ----------------------------------------------------------------------------

/// Owns the broker connection and feeds discovery/reachability into a
/// `DeviceRegistry`.
pub struct MqttPlatform {
    endpoint: MqttEndpoint,
    settings: MqttSettings,
    device: DeviceSettings,
    registry: DeviceRegistry,
}

impl MqttPlatform {
    pub fn new(
        settings: &MqttSettings,
        device: &DeviceSettings,
        registry: DeviceRegistry,
    ) -> Result<Self> {
        let endpoint = parse_mqtt_endpoint(&settings.broker)
            .with_context(|| format!("invalid MQTT broker address '{}'", settings.broker))?;
        Ok(Self {
            endpoint,
            settings: settings.clone(),
            device: device.clone(),
            registry,
        })
    }

    /// Start the event loop on its own thread.
    pub fn spawn(self, running: Arc<AtomicBool>) -> Result<JoinHandle<()>> {
        let (client, connection) = self.connect();
        thread::Builder::new()
            .name("mqtt-platform".to_string())
            .spawn(move || self.run(client, connection, running))
            .context("failed to spawn MQTT platform thread")
    }

    fn connect(&self) -> (Client, Connection) {
        let mut options = MqttOptions::new(
            self.settings.client_id.clone(),
            self.endpoint.host.clone(),
            self.endpoint.port,
        );
        options.set_keep_alive(Duration::from_secs(30));
        options.set_clean_start(true);
        if let Some(user) = &self.settings.username {
            options.set_credentials(
                user.clone(),
                self.settings.password.clone().unwrap_or_default(),
            );
        }
        if self.endpoint.use_tls {
            options.set_transport(Transport::tls_with_default_config());
        }

        log::info!(
            "MQTT platform connecting to {}:{} (TLS: {}, auth: {})",
            self.endpoint.host,
            self.endpoint.port,
            self.endpoint.use_tls,
            self.settings.username.is_some()
        );
        Client::new(options, REQUEST_CAPACITY)
    }

    fn run(self, client: Client, mut connection: Connection, running: Arc<AtomicBool>) {
        let mut tracker = DiscoveryTracker::new(&self.settings.discovery_prefix, &self.device.name);

        for event in connection.iter() {
            if !running.load(Ordering::SeqCst) {
                let _ = client.try_disconnect();
                break;
            }
            match event {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    log::info!("MQTT connected; waiting for '{}'", self.device.name);
                    subscribe(&client, &tracker.discovery_filter());
                    if let Some(topic) = tracker.availability_topic() {
                        subscribe(&client, topic);
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    let topic = match std::str::from_utf8(&publish.topic) {
                        Ok(topic) => topic.to_string(),
                        Err(e) => {
                            log::warn!("Skipping publish with invalid topic: {}", e);
                            continue;
                        }
                    };
                    match tracker.handle(&topic, &publish.payload) {
                        Ok(Some(PlatformEvent::Discovered(config))) => {
                            self.attach(&client, &config);
                            if let Some(topic) = &config.availability_topic {
                                subscribe(&client, topic);
                            }
                        }
                        Ok(Some(PlatformEvent::Availability(reachable))) => {
                            self.registry.set_reachable(reachable);
                        }
                        Ok(None) => {}
                        Err(e) => log::warn!("{:#}", e),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    log::error!("MQTT connection error: {}. Reconnecting...", e);
                    self.registry.set_reachable(false);
                    thread::sleep(RECONNECT_BACKOFF);
                }
            }
        }
        log::info!("MQTT platform stopped");
    }

    fn attach(&self, client: &Client, config: &LightDiscoveryConfig) {
        let light = MqttLight::new(&self.device.name, client.clone(), config, self.device.saturation);
        log::info!(
            "found '{}' (command topic {})",
            self.device.name,
            config.command_topic
        );
        // Without an availability topic the accessory counts as reachable.
        self.registry
            .discovered(Arc::new(light), config.availability_topic.is_none());
    }
}

fn subscribe(client: &Client, topic: &str) {
    match client.try_subscribe(topic, QoS::AtLeastOnce) {
        Ok(()) => log::debug!("subscribed to {}", topic),
        Err(e) => log::warn!("failed to subscribe to {}: {}", topic, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG_TOPIC: &str = "homeassistant/light/desk_lamp/config";

    fn tracker() -> DiscoveryTracker {
        DiscoveryTracker::new("homeassistant", "Lightbulb")
    }

    #[test]
    fn endpoint_parsing() {
        assert_eq!(
            parse_mqtt_endpoint("127.0.0.1:1883").unwrap(),
            MqttEndpoint {
                host: "127.0.0.1".into(),
                port: 1883,
                use_tls: false
            }
        );
        assert!(parse_mqtt_endpoint("mqtts://broker.lan:8883").unwrap().use_tls);
        assert_eq!(parse_mqtt_endpoint("[::1]:1883").unwrap().host, "::1");
        assert!(parse_mqtt_endpoint("broker.lan").is_err());
        assert!(parse_mqtt_endpoint("ws://broker.lan:80").is_err());
    }

    #[test]
    fn matching_config_is_discovered() -> Result<()> {
        let mut tracker = tracker();
        let payload = br#"{"name":"Lightbulb","cmd_t":"lights/bulb/set","avty_t":"lights/bulb/status"}"#;
        let config = match tracker.handle(CONFIG_TOPIC, payload)? {
            Some(PlatformEvent::Discovered(config)) => config,
            other => panic!("expected discovery, got {:?}", other),
        };
        assert_eq!(config.command_topic, "lights/bulb/set");
        assert_eq!(config.brightness_scale, 255);
        assert_eq!(tracker.availability_topic(), Some("lights/bulb/status"));
        Ok(())
    }

    #[test]
    fn other_lights_and_removals_are_ignored() -> Result<()> {
        let mut tracker = tracker();
        let payload = br#"{"name":"Hallway","command_topic":"lights/hall/set"}"#;
        assert_eq!(tracker.handle(CONFIG_TOPIC, payload)?, None);
        assert_eq!(tracker.handle(CONFIG_TOPIC, b"")?, None);
        assert!(tracker.handle(CONFIG_TOPIC, b"not json").is_err());
        Ok(())
    }

    #[test]
    fn out_of_range_brightness_scales_are_rejected() {
        let mut tracker = tracker();
        let huge = br#"{"name":"Lightbulb","cmd_t":"b/set","bri_scl":4294967295}"#;
        assert!(tracker.handle(CONFIG_TOPIC, huge).is_err());
        let zero = br#"{"name":"Lightbulb","cmd_t":"b/set","bri_scl":0}"#;
        assert!(tracker.handle(CONFIG_TOPIC, zero).is_err());
        assert_eq!(tracker.availability_topic(), None);
    }

    #[test]
    fn encoder_never_overflows_on_large_scales() -> Result<()> {
        let bytes = encode_command(Command::SetBrightness(100), u32::MAX, 50)?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)?;
        assert_eq!(value, serde_json::json!({"brightness": u32::MAX}));
        assert!(encode_command(Command::SetBrightness(50), 0, 50).is_err());
        Ok(())
    }

    #[test]
    fn availability_follows_configured_payloads() -> Result<()> {
        let mut tracker = tracker();
        let payload = br#"{"name":"Lightbulb","command_topic":"b/set","availability_topic":"b/avail","payload_available":"up","payload_not_available":"down"}"#;
        tracker.handle(CONFIG_TOPIC, payload)?;

        assert_eq!(
            tracker.handle("b/avail", b"up")?,
            Some(PlatformEvent::Availability(true))
        );
        assert_eq!(
            tracker.handle("b/avail", b" down\n")?,
            Some(PlatformEvent::Availability(false))
        );
        assert!(tracker.handle("b/avail", b"online").is_err());
        assert_eq!(tracker.handle("other/topic", b"up")?, None);
        Ok(())
    }

    #[test]
    fn availability_before_discovery_is_ignored() -> Result<()> {
        let mut tracker = tracker();
        assert_eq!(tracker.handle("b/avail", b"online")?, None);
        Ok(())
    }

    #[test]
    fn commands_encode_as_json_light_schema() -> Result<()> {
        let decode = |bytes: Vec<u8>| -> serde_json::Value { serde_json::from_slice(&bytes).unwrap() };

        assert_eq!(
            decode(encode_command(Command::SetPower(true), 255, 50)?),
            serde_json::json!({"state": "ON"})
        );
        assert_eq!(
            decode(encode_command(Command::SetHue(180), 255, 50)?),
            serde_json::json!({"color": {"h": 180, "s": 50}})
        );
        assert_eq!(
            decode(encode_command(Command::SetBrightness(75), 100, 50)?),
            serde_json::json!({"brightness": 75})
        );
        assert_eq!(
            decode(encode_command(Command::SetBrightness(100), 255, 50)?),
            serde_json::json!({"brightness": 255})
        );
        assert_eq!(
            decode(encode_command(Command::SetBrightness(50), 255, 50)?),
            serde_json::json!({"brightness": 128})
        );
        Ok(())
    }
}
