//! Light accessory: command handle, registry and platforms.
//!
//! The `DeviceRegistry` owns the current `DeviceHandle` and publishes
//! `DeviceSnapshot`s; the frame pipeline reads them through a
//! `DeviceStateReader` and only ever dispatches via
//! `DeviceSnapshot::actuator`, which is empty unless the accessory is present
//! and reachable.

mod handle;
mod memory;
pub mod mqtt;
mod registry;

pub use handle::DeviceHandle;
pub use memory::RecordingLight;
pub use mqtt::{MqttLight, MqttPlatform};
pub use registry::{DeviceRegistry, DeviceSnapshot, DeviceState, DeviceStateReader, Presence};
