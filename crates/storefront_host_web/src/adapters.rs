use storefront_host::{HostServices, HostStrategy, SharedMemoryFacility};

#[cfg(not(target_arch = "wasm32"))]
use storefront_host::PolledScheduler;

#[cfg(all(target_arch = "wasm32", not(feature = "memory-host")))]
use std::rc::Rc;

#[cfg(target_arch = "wasm32")]
use crate::BrowserScheduler;
#[cfg(all(target_arch = "wasm32", not(feature = "memory-host")))]
use crate::{WebLocalFacility, WebStorageSignal};

/// Returns the compile-time selected host strategy for the active build.
///
/// Browser builds use `localStorage`; the `memory-host` feature and every off-browser build use
/// the in-memory facility.
pub const fn selected_host_strategy() -> HostStrategy {
    #[cfg(all(target_arch = "wasm32", not(feature = "memory-host")))]
    {
        HostStrategy::Browser
    }

    #[cfg(not(all(target_arch = "wasm32", not(feature = "memory-host"))))]
    {
        HostStrategy::Memory
    }
}

/// Returns the selected host strategy as a stable string token.
pub fn host_strategy_name() -> &'static str {
    selected_host_strategy().as_str()
}

/// Builds the host services bundle for the selected strategy.
///
/// The memory strategy gets a private facility on a wall-clock scheduler: browser timers under
/// `memory-host`, and a [`storefront_host::PolledScheduler`] off-browser, where due timers run
/// whenever the owner polls them. Hosts that simulate several contexts should call
/// [`HostServices::memory`] with their own shared facility and scheduler.
pub fn build_host_services() -> HostServices {
    match selected_host_strategy() {
        #[cfg(all(target_arch = "wasm32", not(feature = "memory-host")))]
        HostStrategy::Browser => HostServices {
            facility: Rc::new(WebLocalFacility),
            signal: Rc::new(WebStorageSignal),
            scheduler: Rc::new(BrowserScheduler),
            host_strategy: HostStrategy::Browser,
        },
        _ => memory_host_services(),
    }
}

#[cfg(target_arch = "wasm32")]
fn memory_host_services() -> HostServices {
    HostServices::memory(&SharedMemoryFacility::new(), BrowserScheduler)
}

#[cfg(not(target_arch = "wasm32"))]
fn memory_host_services() -> HostServices {
    HostServices::memory(&SharedMemoryFacility::new(), PolledScheduler::new())
}
