//! Typed host contracts for the storefront persistence layer.
//!
//! This crate is the API-first boundary between the persistence layer and whatever hosts it. It
//! defines the durable key-value facility, the cross-context change signal, and the event-loop
//! scheduler, plus in-memory implementations that let several simulated contexts share one
//! facility on one logical clock. Off-browser hosts run timers on a [`PolledScheduler`].
//! Browser adapters live in `storefront_host_web`.

#![warn(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod error;
pub mod facility;
pub mod host;
pub mod signal;
pub mod time;
pub mod timer;

pub use error::FacilityError;
pub use facility::{DurableFacility, MemoryFacility, NoopFacility, SharedMemoryFacility};
pub use host::{HostServices, HostStrategy};
pub use signal::{NoopSignal, NoticeHandler, PlatformChangeSignal, SignalSubscription, StorageNotice};
pub use time::{unix_time_ms_now, Clock, SystemClock};
pub use timer::{ManualScheduler, PolledScheduler, Scheduler, TimerHandle};
