//! Browser (`wasm32`) implementations of [`storefront_host`] contracts.
//!
//! The facility is `window.localStorage`, cross-context notices come from the `storage` event, and
//! timers are `window.setTimeout`. Off-browser builds fall back to inert adapters and the
//! compile-time strategy selects the in-memory host instead.

#![warn(missing_docs, rustdoc::broken_intra_doc_links)]

/// Compile-time host-strategy selection and the host services factory.
pub mod adapters;
pub mod storage;
pub mod timer;

pub use adapters::{build_host_services, host_strategy_name, selected_host_strategy};
pub use storage::local_facility::WebLocalFacility;
pub use storage::storage_signal::WebStorageSignal;
pub use timer::BrowserScheduler;
