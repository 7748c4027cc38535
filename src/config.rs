use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::frame::{Orientation, MAX_FRAME_DIMENSION};

const DEFAULT_CAMERA_URL: &str = "stub://camera";
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CLASSIFIER: &str = "scripted";
const DEFAULT_INPUT_SIZE: u32 = 416;
const DEFAULT_LABELS: [&str; 4] = ["Fist", "Horizontal", "Open", "Vertical"];
const DEFAULT_SCRIPT: [&str; 5] = ["-", "Open", "Vertical", "Horizontal", "Fist"];
const DEFAULT_MQTT_BROKER: &str = "127.0.0.1:1883";
const DEFAULT_MQTT_CLIENT_ID: &str = "gesture_lightd";
const DEFAULT_DISCOVERY_PREFIX: &str = "homeassistant";
const DEFAULT_DEVICE_NAME: &str = "Lightbulb";
const DEFAULT_SATURATION: u8 = 50;
const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Deserialize, Default)]
struct GestureLightConfigFile {
    camera: Option<CameraConfigFile>,
    classifier: Option<ClassifierConfigFile>,
    mqtt: Option<MqttConfigFile>,
    device: Option<DeviceConfigFile>,
    health_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    orientation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassifierConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    labels: Option<Vec<String>>,
    script: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct MqttConfigFile {
    broker: Option<String>,
    client_id: Option<String>,
    discovery_prefix: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DeviceConfigFile {
    name: Option<String>,
    saturation: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct GestureLightConfig {
    pub camera: CameraSettings,
    pub classifier: ClassifierSettings,
    pub mqtt: MqttSettings,
    pub device: DeviceSettings,
    /// Period of the worker's health log line.
    pub health_interval: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    pub orientation: Orientation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    /// Class names in model output order.
    pub labels: Vec<String>,
    /// Per-frame labels for the scripted backend (`-` = no detection).
    pub script: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MqttSettings {
    pub broker: String,
    pub client_id: String,
    pub discovery_prefix: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSettings {
    /// Accessory name matched during discovery.
    pub name: String,
    /// Saturation sent with every hue command.
    pub saturation: u8,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_CAMERA_URL.to_string(),
            target_fps: DEFAULT_CAMERA_FPS,
            width: DEFAULT_CAMERA_WIDTH,
            height: DEFAULT_CAMERA_HEIGHT,
            orientation: Orientation::Up,
        }
    }
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_CLASSIFIER.to_string(),
            model_path: None,
            input_width: DEFAULT_INPUT_SIZE,
            input_height: DEFAULT_INPUT_SIZE,
            labels: DEFAULT_LABELS.iter().map(|s| s.to_string()).collect(),
            script: DEFAULT_SCRIPT.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker: DEFAULT_MQTT_BROKER.to_string(),
            client_id: DEFAULT_MQTT_CLIENT_ID.to_string(),
            discovery_prefix: DEFAULT_DISCOVERY_PREFIX.to_string(),
            username: None,
            password: None,
        }
    }
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_DEVICE_NAME.to_string(),
            saturation: DEFAULT_SATURATION,
        }
    }
}

impl GestureLightConfig {
    /// Load from the file named by `GESTURE_LIGHT_CONFIG` (if set), then
    /// apply environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("GESTURE_LIGHT_CONFIG")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Like `load`, with an explicit config file path.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// The scripted backend replays canned gestures; it may only drive the
    /// in-memory light of a dry run, never a real accessory.
    pub fn check_run_mode(&self, dry_run: bool) -> Result<()> {
        if !dry_run && self.classifier.backend == DEFAULT_CLASSIFIER {
            return Err(anyhow!(
                "classifier backend '{}' replays a fixed script; use --dry-run or configure a model backend",
                DEFAULT_CLASSIFIER
            ));
        }
        Ok(())
    }

    fn from_file(file: GestureLightConfigFile) -> Result<Self> {
        let camera_file = file.camera.unwrap_or_default();
        let camera_defaults = CameraSettings::default();
        let camera = CameraSettings {
            url: camera_file.url.unwrap_or(camera_defaults.url),
            target_fps: camera_file.target_fps.unwrap_or(camera_defaults.target_fps),
            width: camera_file.width.unwrap_or(camera_defaults.width),
            height: camera_file.height.unwrap_or(camera_defaults.height),
            orientation: match camera_file.orientation {
                Some(value) => value.parse()?,
                None => camera_defaults.orientation,
            },
        };

        let classifier_file = file.classifier.unwrap_or_default();
        let classifier_defaults = ClassifierSettings::default();
        let classifier = ClassifierSettings {
            backend: classifier_file.backend.unwrap_or(classifier_defaults.backend),
            model_path: classifier_file.model_path,
            input_width: classifier_file
                .input_width
                .unwrap_or(classifier_defaults.input_width),
            input_height: classifier_file
                .input_height
                .unwrap_or(classifier_defaults.input_height),
            labels: classifier_file.labels.unwrap_or(classifier_defaults.labels),
            script: classifier_file.script.unwrap_or(classifier_defaults.script),
        };

        let mqtt_file = file.mqtt.unwrap_or_default();
        let mqtt_defaults = MqttSettings::default();
        let mqtt = MqttSettings {
            broker: mqtt_file.broker.unwrap_or(mqtt_defaults.broker),
            client_id: mqtt_file.client_id.unwrap_or(mqtt_defaults.client_id),
            discovery_prefix: mqtt_file
                .discovery_prefix
                .unwrap_or(mqtt_defaults.discovery_prefix),
            username: mqtt_file.username,
            password: mqtt_file.password,
        };

        let device_file = file.device.unwrap_or_default();
        let device_defaults = DeviceSettings::default();
        let device = DeviceSettings {
            name: device_file.name.unwrap_or(device_defaults.name),
            saturation: device_file.saturation.unwrap_or(device_defaults.saturation),
        };

        let health_interval = Duration::from_secs(
            file.health_interval_secs
                .unwrap_or(DEFAULT_HEALTH_INTERVAL_SECS),
        );

        Ok(Self {
            camera,
            classifier,
            mqtt,
            device,
            health_interval,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("GESTURE_LIGHT_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.camera.url = url;
            }
        }
        if let Ok(orientation) = std::env::var("GESTURE_LIGHT_ORIENTATION") {
            if !orientation.trim().is_empty() {
                self.camera.orientation = orientation
                    .parse()
                    .map_err(|e| anyhow!("GESTURE_LIGHT_ORIENTATION: {}", e))?;
            }
        }
        if let Ok(backend) = std::env::var("GESTURE_LIGHT_CLASSIFIER") {
            if !backend.trim().is_empty() {
                self.classifier.backend = backend.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("GESTURE_LIGHT_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.classifier.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(broker) = std::env::var("GESTURE_LIGHT_MQTT_BROKER") {
            if !broker.trim().is_empty() {
                self.mqtt.broker = broker;
            }
        }
        if let Ok(name) = std::env::var("GESTURE_LIGHT_DEVICE_NAME") {
            if !name.trim().is_empty() {
                self.device.name = name;
            }
        }
        if let Ok(saturation) = std::env::var("GESTURE_LIGHT_SATURATION") {
            self.device.saturation = saturation.trim().parse().map_err(|_| {
                anyhow!("GESTURE_LIGHT_SATURATION must be an integer between 0 and 100")
            })?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera.target_fps must be greater than zero"));
        }
        check_dimensions("camera", self.camera.width, self.camera.height)?;
        check_dimensions(
            "classifier input",
            self.classifier.input_width,
            self.classifier.input_height,
        )?;
        if self.classifier.backend == "tract" && self.classifier.model_path.is_none() {
            return Err(anyhow!("classifier backend 'tract' requires model_path"));
        }
        if self.device.saturation > 100 {
            return Err(anyhow!(
                "device.saturation must be at most 100 (got {})",
                self.device.saturation
            ));
        }
        self.device.name = self.device.name.trim().to_string();
        if self.device.name.is_empty() {
            return Err(anyhow!("device.name must not be empty"));
        }
        if self.health_interval.as_secs() == 0 {
            return Err(anyhow!("health_interval_secs must be greater than zero"));
        }
        Ok(())
    }
}

fn check_dimensions(what: &str, width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(anyhow!("{} dimensions must be greater than zero", what));
    }
    if width > MAX_FRAME_DIMENSION || height > MAX_FRAME_DIMENSION {
        return Err(anyhow!(
            "{} dimensions {}x{} exceed {} pixels",
            what,
            width,
            height,
            MAX_FRAME_DIMENSION
        ));
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<GestureLightConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
