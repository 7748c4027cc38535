use anyhow::{anyhow, Result};

use crate::detect::classifier::Classifier;
use crate::detect::result::{Detection, GestureLabel, Region};
use crate::frame::InferenceView;

/// One frame's worth of scripted output.
#[derive(Clone, Debug)]
pub enum ScriptStep {
    Detections(Vec<Detection>),
    Fail(String),
}

/// Deterministic classifier that replays a script, one step per frame.
///
/// The script wraps around. An empty script yields no detections.
#[derive(Clone, Debug, Default)]
pub struct ScriptedClassifier {
    steps: Vec<ScriptStep>,
    cursor: usize,
    calls: u64,
}

impl ScriptedClassifier {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            cursor: 0,
            calls: 0,
        }
    }

    /// Build a script from gesture label names, one centred detection per frame.
    ///
    /// `"-"` or an empty entry is a frame with no detections.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        let steps = labels
            .iter()
            .map(|label| match label.as_ref().trim() {
                "" | "-" => ScriptStep::Detections(Vec::new()),
                name => ScriptStep::Detections(vec![Detection::new(
                    GestureLabel::from(name),
                    1.0,
                    Region::centered_at(0.5, 0.5),
                )]),
            })
            .collect();
        Self::new(steps)
    }

    /// Number of frames classified so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Classifier for ScriptedClassifier {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn classify(&mut self, _view: &InferenceView<'_>) -> Result<Vec<Detection>> {
        self.calls += 1;
        if self.steps.is_empty() {
            return Ok(Vec::new());
        }
        let step = self.steps[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.steps.len();
        match step {
            ScriptStep::Detections(detections) => Ok(detections),
            ScriptStep::Fail(reason) => Err(anyhow!("scripted failure: {}", reason)),
        }
    }
}
