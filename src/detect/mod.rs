mod backends;
mod classifier;
mod registry;
mod result;

pub use backends::{ScriptStep, ScriptedClassifier};
#[cfg(feature = "backend-tract")]
pub use backends::TractClassifier;
pub use classifier::Classifier;
pub use registry::ClassifierRegistry;
pub use result::{Detection, GestureLabel, Region};
