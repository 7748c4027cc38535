//! Gesture interpretation.
//!
//! Maps the detections of one frame to light commands. The mapping is stateless:
//! every frame is interpreted on its own, with no smoothing across frames and no
//! confidence threshold beyond the one the classifier applies.
//!
//! | label        | command                                   |
//! |--------------|-------------------------------------------|
//! | `Open`       | `SetPower(true)`                          |
//! | `Fist`       | `SetPower(false)`                         |
//! | `Vertical`   | `SetHue(round(center.x * 360))`           |
//! | `Horizontal` | `SetBrightness(round(center.y * 100))`    |
//! | other        | none                                      |

use std::fmt;

use crate::detect::{Detection, GestureLabel};

pub const MAX_HUE: u16 = 360;
pub const MAX_BRIGHTNESS: u8 = 100;

/// Intended mutation of the light's state.
///
/// Numeric payloads are always within range: construct them through
/// `Command::hue`/`Command::brightness` (or the `_from_fraction` variants),
/// which clamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    SetPower(bool),
    /// Degrees, 0..=360.
    SetHue(u16),
    /// Percent, 0..=100.
    SetBrightness(u8),
}

impl Command {
    pub fn hue(degrees: i64) -> Self {
        Command::SetHue(degrees.clamp(0, MAX_HUE as i64) as u16)
    }

    pub fn brightness(percent: i64) -> Self {
        Command::SetBrightness(percent.clamp(0, MAX_BRIGHTNESS as i64) as u8)
    }

    /// Hue from a normalized 0..1 position.
    pub fn hue_from_fraction(fraction: f32) -> Self {
        Self::hue(scale_fraction(fraction, MAX_HUE as f32))
    }

    /// Brightness from a normalized 0..1 position.
    pub fn brightness_from_fraction(fraction: f32) -> Self {
        Self::brightness(scale_fraction(fraction, MAX_BRIGHTNESS as f32))
    }
}

fn scale_fraction(fraction: f32, max: f32) -> i64 {
    if fraction.is_nan() {
        return 0;
    }
    (fraction * max).round() as i64
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetPower(on) => write!(f, "power {}", if *on { "on" } else { "off" }),
            Command::SetHue(hue) => write!(f, "hue {}", hue),
            Command::SetBrightness(brightness) => write!(f, "brightness {}%", brightness),
        }
    }
}

/// Stateless per-frame mapping from detections to commands.
#[derive(Clone, Copy, Debug, Default)]
pub struct GestureInterpreter;

impl GestureInterpreter {
    pub fn new() -> Self {
        Self
    }

    /// Commands for one frame, in detection order.
    pub fn interpret(&self, detections: &[Detection]) -> Vec<Command> {
        detections
            .iter()
            .filter_map(|detection| self.command_for(detection))
            .collect()
    }

    /// Command for a single detection, if its label maps to one.
    pub fn command_for(&self, detection: &Detection) -> Option<Command> {
        match detection.label {
            GestureLabel::Open => Some(Command::SetPower(true)),
            GestureLabel::Fist => Some(Command::SetPower(false)),
            GestureLabel::Vertical => Some(Command::hue_from_fraction(detection.region.center_x())),
            GestureLabel::Horizontal => Some(Command::brightness_from_fraction(
                detection.region.center_y(),
            )),
            GestureLabel::Other(_) => None,
        }
    }
}
