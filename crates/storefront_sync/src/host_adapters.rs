use storefront_host::HostStrategy;
use storefront_host_web::build_host_services;

use crate::{config::SyncConfig, context::SyncContext};

/// Facility key holding an optional JSON-encoded [`SyncConfig`] override.
pub const SYNC_CONFIG_KEY: &str = "storefront.sync_config.v1";

/// Returns the host strategy the current build composes contexts with.
pub fn selected_host_strategy() -> HostStrategy {
    storefront_host_web::selected_host_strategy()
}

/// Builds this context's persistence layer on the compile-time selected host.
///
/// The configuration is read from [`SYNC_CONFIG_KEY`] in the host facility, falling back to the
/// defaults.
pub fn open_context() -> SyncContext {
    let host = build_host_services();
    let config = SyncConfig::load_from(host.facility.as_ref(), SYNC_CONFIG_KEY);
    SyncContext::new(host, config)
}

/// Builds this context's persistence layer on the selected host with an explicit configuration.
pub fn open_context_with(config: SyncConfig) -> SyncContext {
    SyncContext::new(build_host_services(), config)
}
