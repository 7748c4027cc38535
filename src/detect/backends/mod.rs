pub mod scripted;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use scripted::{ScriptStep, ScriptedClassifier};

#[cfg(feature = "backend-tract")]
pub use tract::TractClassifier;
