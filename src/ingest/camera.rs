//! Camera frame source.
//!
//! `CameraSource` produces `Frame`s for the gesture pipeline:
//! - `stub://...` URLs generate synthetic frames (tests, dry runs)
//! - device paths such as `/dev/video0` use V4L2 (feature: ingest-v4l2)
//!
//! Every frame carries the orientation configured for the camera, so the
//! classifier never consults ambient device state.

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-v4l2")]
use super::v4l2::V4l2Camera;
use crate::config::CameraSettings;
use crate::frame::{Frame, Orientation, MAX_FRAME_DIMENSION};

/// Frame source for one camera.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-v4l2")]
    V4l2(V4l2Camera),
}

impl CameraSource {
    pub fn new(settings: &CameraSettings) -> Result<Self> {
        if settings.width == 0 || settings.height == 0 {
            return Err(anyhow!("camera dimensions must be non-zero"));
        }
        if settings.width > MAX_FRAME_DIMENSION || settings.height > MAX_FRAME_DIMENSION {
            return Err(anyhow!(
                "camera dimensions {}x{} exceed {} pixels",
                settings.width,
                settings.height,
                MAX_FRAME_DIMENSION
            ));
        }
        if settings.url.starts_with("stub://") {
            Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticCamera::new(settings.clone())),
            })
        } else {
            #[cfg(feature = "ingest-v4l2")]
            {
                Ok(Self {
                    backend: CameraBackend::V4l2(V4l2Camera::new(settings.clone())),
                })
            }
            #[cfg(not(feature = "ingest-v4l2"))]
            {
                Err(anyhow!(
                    "camera '{}' requires the ingest-v4l2 feature",
                    settings.url
                ))
            }
        }
    }

    /// Connect to the camera.
    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.connect(),
        }
    }

    /// Capture the next frame.
    pub fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.next_frame(),
        }
    }

    /// Check if the source is healthy.
    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(_) => true,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.is_healthy(),
        }
    }

    /// Get frame statistics.
    pub fn stats(&self) -> CameraStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.stats(),
        }
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub url: String,
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    settings: CameraSettings,
    orientation: Orientation,
    frame_count: u64,
}

impl SyntheticCamera {
    fn new(settings: CameraSettings) -> Self {
        Self {
            orientation: settings.orientation,
            settings,
            frame_count: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        log::info!("CameraSource: connected to {} (synthetic)", self.settings.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        self.frame_count += 1;
        let pixels = self.generate_synthetic_pixels();
        Ok(Frame::from_rgb(
            pixels,
            self.settings.width,
            self.settings.height,
            self.orientation,
        )?
        .with_sequence(self.frame_count))
    }

    /// Diagonal gradient that drifts one step per frame.
    fn generate_synthetic_pixels(&self) -> Vec<u8> {
        let width = self.settings.width as u64;
        let pixel_count = self.settings.width as usize * self.settings.height as usize;
        let mut pixels = vec![0u8; pixel_count * 3];
        for (i, pixel) in pixels.chunks_exact_mut(3).enumerate() {
            let (x, y) = (i as u64 % width, i as u64 / width);
            let v = ((x + y + self.frame_count) % 256) as u8;
            pixel.copy_from_slice(&[v, v / 2, 255 - v]);
        }
        pixels
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            url: self.settings.url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_settings() -> CameraSettings {
        CameraSettings {
            url: "stub://test".to_string(),
            target_fps: 10,
            width: 64,
            height: 48,
            orientation: Orientation::Right,
        }
    }

    #[test]
    fn synthetic_camera_produces_sequenced_frames() -> Result<()> {
        let mut source = CameraSource::new(&stub_settings())?;
        source.connect()?;

        let first = source.next_frame()?;
        let second = source.next_frame()?;
        assert_eq!((first.width, first.height), (64, 48));
        assert_eq!(first.orientation, Orientation::Right);
        assert_eq!((first.sequence, second.sequence), (1, 2));
        assert_eq!(source.stats().frames_captured, 2);
        assert!(source.is_healthy());
        Ok(())
    }

    #[test]
    fn oversized_cameras_are_rejected() {
        let settings = CameraSettings {
            width: 70_000,
            height: 70_000,
            ..stub_settings()
        };
        assert!(CameraSource::new(&settings).is_err());
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn device_cameras_need_the_v4l2_feature() {
        let settings = CameraSettings {
            url: "/dev/video0".to_string(),
            ..stub_settings()
        };
        assert!(CameraSource::new(&settings).is_err());
    }
}
