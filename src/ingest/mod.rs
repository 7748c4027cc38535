//! Frame ingestion.
//!
//! - `CameraSource`: synthetic (`stub://`) or V4L2 (feature: ingest-v4l2) cameras
//! - `FrameFeeder`: capture thread delivering frames to the pipeline worker,
//!   dropping frames that arrive while the worker is busy
//!
//! The ingestion layer MUST NOT:
//! - Store frames to disk
//! - Queue more than one frame for the pipeline

mod camera;
mod feeder;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

pub use camera::{CameraSource, CameraStats};
pub use feeder::{FeederStats, FrameFeeder};
