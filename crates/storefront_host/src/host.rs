//! Host service bundle handed to each execution context at startup.

use std::rc::Rc;

use crate::{
    facility::{DurableFacility, MemoryFacility, SharedMemoryFacility},
    signal::PlatformChangeSignal,
    timer::Scheduler,
};

/// Stable host strategy selected for the current build/runtime composition path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStrategy {
    /// Browser-backed composition (`localStorage`, `storage` events, event-loop timers).
    Browser,
    /// In-memory composition used off-browser and in simulations.
    Memory,
}

impl HostStrategy {
    /// Returns a stable string token for diagnostics.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Browser => "browser",
            Self::Memory => "memory",
        }
    }
}

/// Host services one execution context needs to run the persistence layer.
///
/// All environment-specific selection happens before this bundle is built, so the persistence
/// layer never names a concrete host API.
#[derive(Clone)]
pub struct HostServices {
    /// Durable key-value facility shared with sibling contexts.
    pub facility: Rc<dyn DurableFacility>,
    /// Notifications for writes made by sibling contexts.
    pub signal: Rc<dyn PlatformChangeSignal>,
    /// Event-loop timers and clock.
    pub scheduler: Rc<dyn Scheduler>,
    /// Stable strategy identifier for diagnostics.
    pub host_strategy: HostStrategy,
}

impl HostServices {
    /// Builds a memory-backed bundle for one context of `shared`, driven by `scheduler`.
    pub fn memory(shared: &SharedMemoryFacility, scheduler: impl Scheduler + 'static) -> Self {
        let context: MemoryFacility = shared.context();
        Self {
            facility: Rc::new(context.clone()),
            signal: Rc::new(context),
            scheduler: Rc::new(scheduler),
            host_strategy: HostStrategy::Memory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualScheduler;

    #[test]
    fn memory_bundles_share_entries_across_contexts() {
        let shared = SharedMemoryFacility::new();
        let scheduler = ManualScheduler::new();
        let tab_a = HostServices::memory(&shared, scheduler.clone());
        let tab_b = HostServices::memory(&shared, scheduler);

        tab_a.facility.write("k", "1").expect("write");
        assert_eq!(tab_b.facility.read("k").expect("read"), Some("1".to_string()));
        assert_eq!(tab_a.host_strategy.as_str(), "memory");
    }
}
