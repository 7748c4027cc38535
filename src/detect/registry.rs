use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};

use crate::config::ClassifierSettings;
use crate::detect::backends::ScriptedClassifier;
use crate::detect::classifier::Classifier;

type Factory = Box<dyn Fn(&ClassifierSettings) -> Result<Box<dyn Classifier>> + Send + Sync>;

/// Registry of classifier backends, keyed by name.
///
/// Backends are registered as factories so that model loading happens once, at
/// startup, inside `load`. A load failure is fatal to pipeline startup.
pub struct ClassifierRegistry {
    factories: HashMap<String, Factory>,
    default_name: Option<String>,
}

impl ClassifierRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            default_name: None,
        }
    }

    /// Registry with every backend compiled into this build.
    pub fn with_builtin_backends() -> Self {
        let mut registry = Self::new();
        registry.register("scripted", |settings| {
            Ok(Box::new(ScriptedClassifier::from_labels(&settings.script)))
        });
        #[cfg(feature = "backend-tract")]
        registry.register("tract", |settings| {
            let model_path = settings
                .model_path
                .as_ref()
                .ok_or_else(|| anyhow!("tract backend requires classifier.model_path"))?;
            let labels = settings
                .labels
                .iter()
                .map(|label| crate::detect::GestureLabel::from(label.as_str()))
                .collect();
            Ok(Box::new(crate::detect::backends::TractClassifier::new(
                model_path,
                settings.input_width,
                settings.input_height,
                labels,
            )?))
        });
        registry
    }

    /// Register a backend factory. The first registered backend becomes the default.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&ClassifierSettings) -> Result<Box<dyn Classifier>> + Send + Sync + 'static,
    {
        if self.default_name.is_none() {
            self.default_name = Some(name.to_string());
        }
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.factories.contains_key(name) {
            return Err(anyhow!("classifier backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// List registered backends, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build a backend by name without warming it up.
    pub fn get(&self, name: &str, settings: &ClassifierSettings) -> Result<Box<dyn Classifier>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            anyhow!(
                "classifier backend '{}' not available (registered: {})",
                name,
                self.list().join(", ")
            )
        })?;
        factory(settings).with_context(|| format!("failed to load classifier '{}'", name))
    }

    /// Build and warm up the backend named in `settings`.
    ///
    /// An empty backend name selects the default.
    pub fn load(&self, settings: &ClassifierSettings) -> Result<Box<dyn Classifier>> {
        let name = if settings.backend.trim().is_empty() {
            self.default_name
                .as_deref()
                .ok_or_else(|| anyhow!("no classifier backends registered"))?
        } else {
            settings.backend.as_str()
        };
        let mut classifier = self.get(name, settings)?;
        classifier
            .warm_up()
            .with_context(|| format!("classifier '{}' failed to warm up", name))?;
        log::info!("classifier '{}' loaded", classifier.name());
        Ok(classifier)
    }
}

impl Default for ClassifierRegistry {
    fn default() -> Self {
        Self::with_builtin_backends()
    }
}
