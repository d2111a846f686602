//! Local reactive persistence layer for one storefront execution context.
//!
//! Each context (a browser tab) owns a [`SyncContext`] that reads and writes typed values through
//! a debounced [`TypedStore`], notifies subscribers on a throttled [`ChangeBus`], collapses
//! duplicate mutations with a [`MutationGuard`], derives order numbers with a
//! [`SequenceGenerator`] and follows writes from sibling contexts through a [`Reconciler`].
//! Contexts share nothing but the host's durable facility; conflicts resolve last-writer-wins.
//!
//! # Example
//!
//! ```rust
//! use storefront_host::{HostServices, ManualScheduler, SharedMemoryFacility};
//! use storefront_sync::{SyncConfig, SyncContext};
//!
//! let shared = SharedMemoryFacility::new();
//! let scheduler = ManualScheduler::new();
//! let tab = SyncContext::new(HostServices::memory(&shared, scheduler.clone()), SyncConfig::default());
//!
//! tab.set("storefront.theme.v1", &"dark");
//! assert_eq!(tab.get("storefront.theme.v1", String::new()), "dark");
//! assert_eq!(shared.raw("storefront.theme.v1"), None);
//!
//! scheduler.advance(500);
//! assert_eq!(shared.raw("storefront.theme.v1"), Some("\"dark\"".to_string()));
//! ```

#![warn(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod change_bus;
pub mod config;
pub mod context;
pub mod expiring;
mod host_adapters;
pub mod mutation_guard;
pub mod reconciler;
pub mod sequence;
pub mod typed_store;

pub use change_bus::{ChangeBus, ChangeEvent, ChangeHandler, ChangeOrigin, Subscription};
pub use config::{
    ConfigError, SyncConfig, DEFAULT_DEBOUNCE_MS, DEFAULT_EVICTABLE_PREFIX, DEFAULT_LOCK_TIMEOUT_MS,
    DEFAULT_OTP_TTL_MS, DEFAULT_THROTTLE_MS,
};
pub use context::SyncContext;
pub use expiring::ExpiringStore;
pub use host_adapters::{open_context, open_context_with, selected_host_strategy, SYNC_CONFIG_KEY};
pub use mutation_guard::{LockToken, MutationGuard, MutationLock};
pub use reconciler::{ReconcileState, Reconciler};
pub use sequence::{SequenceCounter, SequenceGenerator, SequencePattern};
pub use typed_store::{FlushOutcome, FlushState, StoreEntry, TypedStore};
