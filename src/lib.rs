//! Gesture Light
//!
//! Turns hand gestures seen by a camera into commands for one smart light.
//!
//! # Architecture
//!
//! Each frame flows through a fixed path:
//!
//! 1. **Ingest**: a `CameraSource` captures a `Frame`; the `FrameFeeder` hands it
//!    to the worker, dropping frames while the worker is busy.
//! 2. **Classify**: a `Classifier` receives an `InferenceView` (upright pixels,
//!    no byte access) and returns `Detection`s.
//! 3. **Interpret**: the `GestureInterpreter` maps detections to `Command`s.
//! 4. **Dispatch**: the `FramePipeline` sends commands to the light's
//!    `DeviceHandle`, but only while the `DeviceRegistry` reports the light
//!    present and reachable.
//!
//! # Module Structure
//!
//! - `frame`: Frame, Orientation, InferenceView
//! - `ingest`: Camera sources and the capture feeder
//! - `detect`: Classifier contract, registry and backends
//! - `gesture`: Commands and the gesture interpreter
//! - `device`: Light handle, registry and the MQTT platform
//! - `pipeline`: Per-frame processing and the worker loop
//! - `config`: Daemon configuration

pub mod config;
pub mod detect;
pub mod device;
pub mod frame;
pub mod gesture;
pub mod ingest;
pub mod pipeline;

pub use config::{
    CameraSettings, ClassifierSettings, DeviceSettings, GestureLightConfig, MqttSettings,
};
pub use detect::{
    Classifier, ClassifierRegistry, Detection, GestureLabel, Region, ScriptStep,
    ScriptedClassifier,
};
pub use device::{
    DeviceHandle, DeviceRegistry, DeviceSnapshot, DeviceState, DeviceStateReader, MqttPlatform,
    Presence, RecordingLight,
};
pub use frame::{DevicePosture, Frame, InferenceView, Orientation};
pub use gesture::{Command, GestureInterpreter};
pub use ingest::{CameraSource, FrameFeeder};
pub use pipeline::{
    run_worker, spawn_worker, FrameOutcome, FramePipeline, PipelineStats, WorkerOptions,
};
