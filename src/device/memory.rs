use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};

use super::handle::DeviceHandle;
use crate::gesture::{Command, MAX_BRIGHTNESS, MAX_HUE};

/// In-memory light that records every accepted command.
///
/// Used for dry runs and tests. `set_failing(true)` makes every operation
/// return an error without recording it.
pub struct RecordingLight {
    name: String,
    calls: Mutex<Vec<Command>>,
    failing: AtomicBool,
    log_calls: bool,
}

impl RecordingLight {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            log_calls: false,
        }
    }

    /// Log each accepted command at info level.
    pub fn with_logging(mut self) -> Self {
        self.log_calls = true;
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Commands accepted so far, in call order.
    pub fn calls(&self) -> Vec<Command> {
        match self.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record(&self, command: Command) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("{}: simulated transport rejection", self.name));
        }
        self.calls
            .lock()
            .map_err(|_| anyhow!("recording light lock poisoned"))?
            .push(command);
        if self.log_calls {
            log::info!("{}: {}", self.name, command);
        }
        Ok(())
    }
}

impl DeviceHandle for RecordingLight {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_power(&self, on: bool) -> Result<()> {
        self.record(Command::SetPower(on))
    }

    fn set_hue(&self, degrees: u16) -> Result<()> {
        self.record(Command::SetHue(degrees.min(MAX_HUE)))
    }

    fn set_brightness(&self, percent: u8) -> Result<()> {
        self.record(Command::SetBrightness(percent.min(MAX_BRIGHTNESS)))
    }
}
