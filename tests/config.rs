use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use gesture_light::config::GestureLightConfig;
use gesture_light::Orientation;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "GESTURE_LIGHT_CONFIG",
        "GESTURE_LIGHT_CAMERA_URL",
        "GESTURE_LIGHT_ORIENTATION",
        "GESTURE_LIGHT_CLASSIFIER",
        "GESTURE_LIGHT_MODEL_PATH",
        "GESTURE_LIGHT_MQTT_BROKER",
        "GESTURE_LIGHT_DEVICE_NAME",
        "GESTURE_LIGHT_SATURATION",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(toml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_apply_without_a_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = GestureLightConfig::load().expect("load config");

    assert_eq!(cfg.camera.url, "stub://camera");
    assert_eq!(cfg.camera.target_fps, 10);
    assert_eq!((cfg.camera.width, cfg.camera.height), (640, 480));
    assert_eq!(cfg.camera.orientation, Orientation::Up);
    assert_eq!(cfg.classifier.backend, "scripted");
    assert_eq!(
        cfg.classifier.labels,
        vec!["Fist", "Horizontal", "Open", "Vertical"]
    );
    assert_eq!(cfg.mqtt.broker, "127.0.0.1:1883");
    assert_eq!(cfg.mqtt.discovery_prefix, "homeassistant");
    assert_eq!(cfg.device.name, "Lightbulb");
    assert_eq!(cfg.device.saturation, 50);
    assert_eq!(cfg.health_interval, Duration::from_secs(5));
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"
        health_interval_secs = 30

        [camera]
        url = "stub://kitchen"
        target_fps = 15
        width = 320
        height = 240
        orientation = "right"

        [classifier]
        backend = "scripted"
        script = ["Open", "-", "Fist"]

        [mqtt]
        broker = "mqtts://broker.local:8883"
        client_id = "kitchen_gestures"
        username = "lights"
        password = "secret"

        [device]
        name = "Kitchen Lamp"
        saturation = 80
        "#,
    );

    std::env::set_var("GESTURE_LIGHT_CONFIG", file.path());
    std::env::set_var("GESTURE_LIGHT_ORIENTATION", "up_mirrored");
    std::env::set_var("GESTURE_LIGHT_DEVICE_NAME", "Desk Lamp");
    std::env::set_var("GESTURE_LIGHT_SATURATION", "20");

    let cfg = GestureLightConfig::load().expect("load config");

    assert_eq!(cfg.camera.url, "stub://kitchen");
    assert_eq!(cfg.camera.target_fps, 15);
    assert_eq!((cfg.camera.width, cfg.camera.height), (320, 240));
    assert_eq!(cfg.camera.orientation, Orientation::UpMirrored);
    assert_eq!(cfg.classifier.script, vec!["Open", "-", "Fist"]);
    assert_eq!(cfg.classifier.input_width, 416);
    assert_eq!(cfg.mqtt.broker, "mqtts://broker.local:8883");
    assert_eq!(cfg.mqtt.client_id, "kitchen_gestures");
    assert_eq!(cfg.mqtt.username.as_deref(), Some("lights"));
    assert_eq!(cfg.mqtt.password.as_deref(), Some("secret"));
    assert_eq!(cfg.mqtt.discovery_prefix, "homeassistant");
    assert_eq!(cfg.device.name, "Desk Lamp");
    assert_eq!(cfg.device.saturation, 20);
    assert_eq!(cfg.health_interval, Duration::from_secs(30));

    clear_env();
}

#[test]
fn explicit_path_and_model_override() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"
        [classifier]
        backend = "tract"
        model_path = "/models/hands.onnx"
        input_width = 320
        input_height = 320
        "#,
    );
    std::env::set_var("GESTURE_LIGHT_MODEL_PATH", "/opt/models/gestures.onnx");

    let cfg = GestureLightConfig::load_from(Some(file.path())).expect("load config");

    assert_eq!(cfg.classifier.backend, "tract");
    assert_eq!(
        cfg.classifier.model_path,
        Some(PathBuf::from("/opt/models/gestures.onnx"))
    );
    assert_eq!((cfg.classifier.input_width, cfg.classifier.input_height), (320, 320));

    clear_env();
}

#[test]
fn rejects_invalid_configuration() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let zero_fps = write_config("[camera]\ntarget_fps = 0\n");
    assert!(GestureLightConfig::load_from(Some(zero_fps.path())).is_err());

    let saturated = write_config("[device]\nsaturation = 150\n");
    assert!(GestureLightConfig::load_from(Some(saturated.path())).is_err());

    let unnamed = write_config("[device]\nname = \"   \"\n");
    assert!(GestureLightConfig::load_from(Some(unnamed.path())).is_err());

    let tract_without_model = write_config("[classifier]\nbackend = \"tract\"\n");
    assert!(GestureLightConfig::load_from(Some(tract_without_model.path())).is_err());

    let bad_orientation = write_config("[camera]\norientation = \"sideways\"\n");
    assert!(GestureLightConfig::load_from(Some(bad_orientation.path())).is_err());

    let malformed = write_config("[camera\nurl = ");
    assert!(GestureLightConfig::load_from(Some(malformed.path())).is_err());

    assert!(GestureLightConfig::load_from(Some(std::path::Path::new(
        "/nonexistent/gesture_light.toml"
    )))
    .is_err());

    std::env::set_var("GESTURE_LIGHT_SATURATION", "lots");
    assert!(GestureLightConfig::load().is_err());

    clear_env();
}

#[test]
fn scripted_backend_requires_dry_run() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = GestureLightConfig::load().expect("load config");
    assert!(cfg.check_run_mode(true).is_ok());
    assert!(cfg.check_run_mode(false).is_err());

    std::env::set_var("GESTURE_LIGHT_CLASSIFIER", "tract");
    std::env::set_var("GESTURE_LIGHT_MODEL_PATH", "/models/hands.onnx");
    let cfg = GestureLightConfig::load().expect("load config");
    assert!(cfg.check_run_mode(false).is_ok());

    clear_env();
}

#[test]
fn rejects_oversized_dimensions() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let huge_camera = write_config("[camera]\nwidth = 100000\nheight = 100000\n");
    assert!(GestureLightConfig::load_from(Some(huge_camera.path())).is_err());

    let huge_input = write_config("[classifier]\ninput_width = 65536\n");
    assert!(GestureLightConfig::load_from(Some(huge_input.path())).is_err());
}
