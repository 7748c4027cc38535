//! Captured frame container and orientation handling.
//!
//! - `Frame`: Opaque container for one captured RGB24 image. Bytes are private.
//! - `Orientation`: EXIF-style rotation needed to present the frame upright.
//! - `InferenceView`: Restricted view that classifiers receive. Pixels are only
//!   reachable through `with_upright_pixels`, which applies the orientation first.
//!
//! Frames are owned by the capture source. The pipeline borrows them for the
//! duration of one classification and never stores them.

use anyhow::{anyhow, Result};
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Largest accepted frame width or height, in pixels.
pub const MAX_FRAME_DIMENSION: u32 = 8192;

// ----------------------------------------------------------------------------
// Orientation
// ----------------------------------------------------------------------------

/// How the stored pixels must be transformed to appear upright.
///
/// Variants follow EXIF orientation tags 1..=8.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Orientation {
    #[default]
    Up,
    UpMirrored,
    Down,
    DownMirrored,
    LeftMirrored,
    Right,
    RightMirrored,
    Left,
}

/// Physical posture of the capturing device, as reported by the platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DevicePosture {
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
    FaceUp,
    FaceDown,
    Unknown,
}

impl Orientation {
    /// Orientation for a back camera held in the given posture.
    pub fn from_device_posture(posture: DevicePosture) -> Self {
        match posture {
            DevicePosture::PortraitUpsideDown => Orientation::Left,
            DevicePosture::LandscapeLeft => Orientation::UpMirrored,
            DevicePosture::LandscapeRight => Orientation::Down,
            DevicePosture::Portrait => Orientation::Up,
            _ => Orientation::Up,
        }
    }

    /// EXIF orientation tag (1..=8).
    pub fn exif_tag(self) -> u8 {
        match self {
            Orientation::Up => 1,
            Orientation::UpMirrored => 2,
            Orientation::Down => 3,
            Orientation::DownMirrored => 4,
            Orientation::LeftMirrored => 5,
            Orientation::Right => 6,
            Orientation::RightMirrored => 7,
            Orientation::Left => 8,
        }
    }

    /// True when presenting upright swaps width and height.
    pub fn swaps_axes(self) -> bool {
        matches!(
            self,
            Orientation::LeftMirrored
                | Orientation::Right
                | Orientation::RightMirrored
                | Orientation::Left
        )
    }

    /// Upright dimensions for a stored image of `width` x `height`.
    pub fn upright_dimensions(self, width: u32, height: u32) -> (u32, u32) {
        if self.swaps_axes() {
            (height, width)
        } else {
            (width, height)
        }
    }

    /// Map an upright pixel coordinate back to the stored pixel coordinate.
    fn source_coord(self, ox: usize, oy: usize, width: usize, height: usize) -> (usize, usize) {
        match self {
            Orientation::Up => (ox, oy),
            Orientation::UpMirrored => (width - 1 - ox, oy),
            Orientation::Down => (width - 1 - ox, height - 1 - oy),
            Orientation::DownMirrored => (ox, height - 1 - oy),
            Orientation::LeftMirrored => (oy, ox),
            Orientation::Right => (oy, height - 1 - ox),
            Orientation::RightMirrored => (width - 1 - oy, height - 1 - ox),
            Orientation::Left => (width - 1 - oy, ox),
        }
    }
}

impl FromStr for Orientation {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "up" | "1" => Ok(Orientation::Up),
            "up-mirrored" | "2" => Ok(Orientation::UpMirrored),
            "down" | "3" => Ok(Orientation::Down),
            "down-mirrored" | "4" => Ok(Orientation::DownMirrored),
            "left-mirrored" | "5" => Ok(Orientation::LeftMirrored),
            "right" | "6" => Ok(Orientation::Right),
            "right-mirrored" | "7" => Ok(Orientation::RightMirrored),
            "left" | "8" => Ok(Orientation::Left),
            other => Err(anyhow!("unknown orientation '{}'", other)),
        }
    }
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One captured RGB24 image plus the orientation needed to present it upright.
///
/// There is no `Clone` and no byte accessor. Classifiers see pixels only through
/// `InferenceView::with_upright_pixels`.
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub orientation: Orientation,
    /// Monotonic sequence number assigned by the source.
    pub sequence: u64,
    capture_instant: Instant,
}

impl Frame {
    /// Wrap an RGB24 buffer. The buffer length must equal `width * height * 3`.
    pub fn from_rgb(
        data: Vec<u8>,
        width: u32,
        height: u32,
        orientation: Orientation,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero"));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            orientation,
            sequence: 0,
            capture_instant: Instant::now(),
        })
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Time since capture.
    pub fn age(&self) -> Duration {
        self.capture_instant.elapsed()
    }

    /// Classifiers get a restricted view. Cannot extract bytes.
    pub fn inference_view(&self) -> InferenceView<'_> {
        InferenceView { frame: self }
    }
}

// ----------------------------------------------------------------------------
// InferenceView
// ----------------------------------------------------------------------------

/// Restricted view of a frame for classification.
pub struct InferenceView<'a> {
    frame: &'a Frame,
}

impl<'a> InferenceView<'a> {
    pub fn width(&self) -> u32 {
        self.frame.width
    }

    pub fn height(&self) -> u32 {
        self.frame.height
    }

    pub fn orientation(&self) -> Orientation {
        self.frame.orientation
    }

    pub fn sequence(&self) -> u64 {
        self.frame.sequence
    }

    /// Dimensions after orientation correction.
    pub fn upright_dimensions(&self) -> (u32, u32) {
        self.frame
            .orientation
            .upright_dimensions(self.frame.width, self.frame.height)
    }

    /// Run `f` over the upright RGB24 pixels and their dimensions.
    ///
    /// The slice is only valid for the duration of the call. `Up` frames are
    /// passed through without copying.
    pub fn with_upright_pixels<R>(&self, f: impl FnOnce(&[u8], u32, u32) -> R) -> R {
        let frame = self.frame;
        if frame.orientation == Orientation::Up {
            return f(&frame.data, frame.width, frame.height);
        }
        let upright = reorient(&frame.data, frame.width, frame.height, frame.orientation);
        let (width, height) = self.upright_dimensions();
        f(&upright, width, height)
    }
}

fn reorient(pixels: &[u8], width: u32, height: u32, orientation: Orientation) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let (ow, oh) = orientation.upright_dimensions(width, height);
    let (ow, oh) = (ow as usize, oh as usize);
    let mut out = vec![0u8; pixels.len()];
    for oy in 0..oh {
        for ox in 0..ow {
            let (sx, sy) = orientation.source_coord(ox, oy, w, h);
            let src = (sy * w + sx) * 3;
            let dst = (oy * ow + ox) * 3;
            out[dst..dst + 3].copy_from_slice(&pixels[src..src + 3]);
        }
    }
    out
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
