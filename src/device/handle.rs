use anyhow::Result;

use crate::gesture::{Command, MAX_BRIGHTNESS, MAX_HUE};

/// One controllable light accessory.
///
/// Each operation is idempotent and independent of the others. The returned
/// `Result` reports whether the platform accepted the command for delivery;
/// completion is asynchronous and implementations log delivery failures
/// themselves. Callers may invoke operations concurrently: ordering across
/// commands is the transport's concern.
pub trait DeviceHandle: Send + Sync {
    /// Accessory name as reported by the platform.
    fn name(&self) -> &str;

    fn set_power(&self, on: bool) -> Result<()>;

    /// Degrees, 0..=360. Out-of-range values are clamped.
    fn set_hue(&self, degrees: u16) -> Result<()>;

    /// Percent, 0..=100. Out-of-range values are clamped.
    fn set_brightness(&self, percent: u8) -> Result<()>;

    /// Dispatch a command to the matching operation.
    fn apply(&self, command: Command) -> Result<()> {
        match command {
            Command::SetPower(on) => self.set_power(on),
            Command::SetHue(degrees) => self.set_hue(degrees.min(MAX_HUE)),
            Command::SetBrightness(percent) => self.set_brightness(percent.min(MAX_BRIGHTNESS)),
        }
    }
}
