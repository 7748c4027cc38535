use std::fmt;
use std::str::FromStr;

/// Gesture classes the hand model is trained on.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum GestureLabel {
    /// Open palm.
    Open,
    /// Closed fist.
    Fist,
    /// Flat hand held horizontally.
    Horizontal,
    /// Flat hand held vertically.
    Vertical,
    /// Any label the interpreter does not act on.
    Other(String),
}

impl GestureLabel {
    pub fn as_str(&self) -> &str {
        match self {
            GestureLabel::Open => "Open",
            GestureLabel::Fist => "Fist",
            GestureLabel::Horizontal => "Horizontal",
            GestureLabel::Vertical => "Vertical",
            GestureLabel::Other(label) => label,
        }
    }
}

impl From<&str> for GestureLabel {
    /// Model identifiers are matched exactly; anything else becomes `Other`.
    fn from(identifier: &str) -> Self {
        match identifier {
            "Open" => GestureLabel::Open,
            "Fist" => GestureLabel::Fist,
            "Horizontal" => GestureLabel::Horizontal,
            "Vertical" => GestureLabel::Vertical,
            other => GestureLabel::Other(other.to_string()),
        }
    }
}

impl FromStr for GestureLabel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(GestureLabel::from(s))
    }
}

impl fmt::Display for GestureLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized bounding box in the upright image.
///
/// Coordinates are in 0..1 with the origin at the bottom-left corner,
/// x growing to the right and y growing upward. They do not depend on the
/// pixel resolution of the frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Region {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Region {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Zero-sized region centred on `(cx, cy)`.
    pub fn centered_at(cx: f32, cy: f32) -> Self {
        Self {
            x: cx,
            y: cy,
            w: 0.0,
            h: 0.0,
        }
    }

    /// Build from a box whose origin is the top-left corner.
    pub fn from_top_left(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            x,
            y: 1.0 - y - h,
            w,
            h,
        }
    }

    pub fn center_x(&self) -> f32 {
        self.x + self.w / 2.0
    }

    pub fn center_y(&self) -> f32 {
        self.y + self.h / 2.0
    }
}

/// One classifier result for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: GestureLabel,
    /// 0..1
    pub confidence: f32,
    pub region: Region,
}

impl Detection {
    pub fn new(label: GestureLabel, confidence: f32, region: Region) -> Self {
        Self {
            label,
            confidence: confidence.clamp(0.0, 1.0),
            region,
        }
    }
}
