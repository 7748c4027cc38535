use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;

use super::handle::DeviceHandle;

/// Coarse accessory status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presence {
    Absent,
    PresentUnreachable,
    PresentReachable,
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Presence::Absent => "absent",
            Presence::PresentUnreachable => "present (unreachable)",
            Presence::PresentReachable => "present (reachable)",
        };
        f.write_str(label)
    }
}

/// Last-known state of the accessory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceState {
    /// An accessory with the expected name exists.
    pub present: bool,
    /// The accessory answers on its transport.
    pub reachable: bool,
}

impl DeviceState {
    pub fn presence(&self) -> Presence {
        match (self.present, self.reachable) {
            (false, _) => Presence::Absent,
            (true, false) => Presence::PresentUnreachable,
            (true, true) => Presence::PresentReachable,
        }
    }

    /// Commands may be dispatched only when this holds.
    pub fn can_actuate(&self) -> bool {
        self.present && self.reachable
    }
}

/// Immutable snapshot published by `DeviceRegistry` on every change.
#[derive(Clone, Default)]
pub struct DeviceSnapshot {
    pub state: DeviceState,
    handle: Option<Arc<dyn DeviceHandle>>,
}

impl DeviceSnapshot {
    /// Accessory name, when one has been discovered.
    pub fn name(&self) -> Option<&str> {
        self.handle.as_deref().map(|handle| handle.name())
    }

    /// The handle, only while the accessory is present and reachable.
    pub fn actuator(&self) -> Option<&dyn DeviceHandle> {
        if self.state.can_actuate() {
            self.handle.as_deref()
        } else {
            None
        }
    }
}

impl fmt::Debug for DeviceSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSnapshot")
            .field("state", &self.state)
            .field("name", &self.name())
            .finish()
    }
}

/// Holds the current accessory handle and its reachability.
///
/// States move `Absent -> Present-*` on discovery and between
/// `Present-Unreachable` and `Present-Reachable` on connectivity changes.
/// There is no way back to `Absent`. Every change publishes a new
/// `DeviceSnapshot`; readers never observe a half-updated state.
#[derive(Clone, Default)]
pub struct DeviceRegistry {
    current: Arc<ArcSwap<DeviceSnapshot>>,
}

/// Read side of a `DeviceRegistry`, handed to the frame pipeline.
#[derive(Clone)]
pub struct DeviceStateReader {
    current: Arc<ArcSwap<DeviceSnapshot>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reader(&self) -> DeviceStateReader {
        DeviceStateReader {
            current: self.current.clone(),
        }
    }

    pub fn state(&self) -> DeviceState {
        self.current.load().state
    }

    /// An accessory matching the expected role was found.
    ///
    /// A later discovery replaces the handle (e.g. after a transport reconnect).
    pub fn discovered(&self, handle: Arc<dyn DeviceHandle>, reachable: bool) {
        let name = handle.name().to_string();
        let previous = self.current.swap(Arc::new(DeviceSnapshot {
            state: DeviceState {
                present: true,
                reachable,
            },
            handle: Some(handle),
        }));
        let next = self.state();
        if previous.state != next {
            log::info!(
                "accessory '{}': {} -> {}",
                name,
                previous.state.presence(),
                next.presence()
            );
        } else {
            log::debug!("accessory '{}' rediscovered ({})", name, next.presence());
        }
    }

    /// Connectivity change reported by the accessory platform.
    ///
    /// Ignored while no accessory has been discovered.
    pub fn set_reachable(&self, reachable: bool) {
        let previous = self.current.rcu(|snapshot| {
            if !snapshot.state.present || snapshot.state.reachable == reachable {
                return Arc::clone(snapshot);
            }
            let mut next = DeviceSnapshot::clone(snapshot);
            next.state.reachable = reachable;
            Arc::new(next)
        });
        if !previous.state.present {
            log::debug!(
                "reachability change ({}) ignored: no accessory discovered",
                reachable
            );
            return;
        }
        let next = self.state();
        if previous.state != next {
            log::info!(
                "accessory '{}': {} -> {}",
                previous.name().unwrap_or("?"),
                previous.state.presence(),
                next.presence()
            );
        }
    }
}

impl DeviceStateReader {
    /// Consistent snapshot of state and handle.
    pub fn load(&self) -> Arc<DeviceSnapshot> {
        self.current.load_full()
    }

    pub fn state(&self) -> DeviceState {
        self.current.load().state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RecordingLight;

    #[test]
    fn registry_starts_absent() {
        let registry = DeviceRegistry::new();
        assert_eq!(registry.state().presence(), Presence::Absent);
        assert!(registry.reader().load().actuator().is_none());
    }

    #[test]
    fn reachability_is_ignored_until_discovery() {
        let registry = DeviceRegistry::new();
        registry.set_reachable(true);
        assert_eq!(registry.state(), DeviceState::default());
    }

    #[test]
    fn discovery_and_reachability_transitions() {
        let registry = DeviceRegistry::new();
        let reader = registry.reader();

        registry.discovered(Arc::new(RecordingLight::new("Lightbulb")), false);
        assert_eq!(reader.state().presence(), Presence::PresentUnreachable);
        assert!(reader.load().actuator().is_none());
        assert_eq!(reader.load().name(), Some("Lightbulb"));

        registry.set_reachable(true);
        assert_eq!(reader.state().presence(), Presence::PresentReachable);
        assert!(reader.load().actuator().is_some());

        registry.set_reachable(false);
        assert_eq!(reader.state().presence(), Presence::PresentUnreachable);
        assert_eq!(reader.load().name(), Some("Lightbulb"));
    }

    #[test]
    fn snapshots_already_loaded_are_not_mutated() {
        let registry = DeviceRegistry::new();
        registry.discovered(Arc::new(RecordingLight::new("Lightbulb")), true);
        let before = registry.reader().load();
        registry.set_reachable(false);
        assert!(before.state.can_actuate());
        assert!(!registry.state().can_actuate());
    }
}
