use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::InferenceView;

/// Hand gesture classifier.
///
/// Implementations receive an `InferenceView` and must apply its orientation
/// before inference (`InferenceView::with_upright_pixels` does this), so gesture
/// geometry does not depend on how the camera is rotated.
///
/// `classify` is a blocking call. An `Err` is a per-frame failure: the pipeline
/// logs it and treats the frame as having no detections. Failures that make the
/// classifier unusable belong in construction or `warm_up`, which run at startup.
pub trait Classifier: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Classify one frame. Returns zero or more detections.
    fn classify(&mut self, view: &InferenceView<'_>) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, run once before the first frame.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
