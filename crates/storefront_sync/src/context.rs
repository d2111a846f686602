//! One execution context's persistence layer, wired from host services.

use std::rc::Rc;

use serde::{de::DeserializeOwned, Serialize};
use storefront_host::{HostServices, HostStrategy, Scheduler};

use crate::{
    change_bus::{ChangeBus, ChangeEvent, Subscription},
    config::SyncConfig,
    expiring::ExpiringStore,
    mutation_guard::MutationGuard,
    reconciler::Reconciler,
    sequence::{SequenceGenerator, SequencePattern},
    typed_store::{FlushOutcome, TypedStore},
};

/// Store, bus, guard, sequences, reconciler and one-time codes for one context.
///
/// Created at application start and torn down with [`SyncContext::shutdown`]. Nothing in here
/// is global, so tests build as many contexts as they need over one shared facility.
pub struct SyncContext {
    config: Rc<SyncConfig>,
    host_strategy: HostStrategy,
    scheduler: Rc<dyn Scheduler>,
    store: Rc<TypedStore>,
    bus: ChangeBus,
    guard: MutationGuard,
    sequences: SequenceGenerator,
    reconciler: Rc<Reconciler>,
    codes: ExpiringStore<String>,
}

impl SyncContext {
    /// Wires a context over `host`, attaching it to the host's change signal for every key.
    pub fn new(host: HostServices, config: SyncConfig) -> Self {
        let config = Rc::new(match config.validate() {
            Ok(()) => config,
            Err(err) => {
                leptos::logging::warn!("sync config rejected, using defaults: {err}");
                SyncConfig::default()
            }
        });

        let bus = ChangeBus::new(host.scheduler.clone(), config.throttle_ms);
        let store = TypedStore::new(
            host.facility.clone(),
            host.scheduler.clone(),
            bus.clone(),
            config.clone(),
        );
        let reconciler = Reconciler::new(store.clone(), bus.clone(), host.scheduler.clone());
        reconciler.watch_all();
        reconciler.start(host.signal.as_ref());

        Self {
            guard: MutationGuard::new(host.scheduler.clone(), config.lock_timeout_ms),
            sequences: SequenceGenerator::new(store.clone()),
            codes: ExpiringStore::new(host.scheduler.clone()),
            host_strategy: host.host_strategy,
            scheduler: host.scheduler,
            config,
            store,
            bus,
            reconciler,
        }
    }

    /// Reads `key`, returning `fallback` when it is absent or unreadable.
    pub fn get<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        self.run_due_timers();
        self.store.get(key, fallback)
    }

    /// Writes `value` for `key` through the debounced store.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        self.run_due_timers();
        self.store.set(key, value);
    }

    /// Deletes `key` now.
    pub fn remove(&self, key: &str) {
        self.run_due_timers();
        self.store.remove(key);
    }

    /// Subscribes to local and external changes of `key`.
    pub fn subscribe(&self, key: &str, handler: impl Fn(&ChangeEvent) + 'static) -> Subscription {
        self.reconciler.watch(key);
        self.bus.subscribe(key, handler)
    }

    /// Runs `mutation` unless another mutation for `key` is in flight.
    pub fn with_lock<F: FnOnce()>(&self, key: &str, timeout_ms: Option<u64>, mutation: F) -> bool {
        self.run_due_timers();
        self.guard.with_lock(key, timeout_ms, mutation)
    }

    /// Returns the identifier following the last record of `domain`.
    pub fn next_sequence(&self, domain: &str, pattern: &SequencePattern) -> String {
        self.run_due_timers();
        self.sequences.next_sequence(domain, pattern)
    }

    /// Stores a one-time value valid for `ttl_ms`.
    pub fn store_with_expiry(&self, key: &str, value: impl Into<String>, ttl_ms: u64) {
        self.codes.store_with_expiry(key, value.into(), ttl_ms);
    }

    /// Consumes the one-time value for `key` if it is live and equals `candidate`.
    pub fn consume_if_valid(&self, key: &str, candidate: &str) -> bool {
        self.codes.consume_if_valid(key, candidate)
    }

    /// Runs timers that fell due on hosts without an event loop, returning how many ran.
    ///
    /// Every read, write, lock and sequence call does this first, so debounced writes and lock
    /// releases catch up on the next use of the context. Browser and logical-clock hosts run
    /// their timers themselves and nothing happens here.
    pub fn run_due_timers(&self) -> usize {
        self.scheduler.run_due()
    }

    /// Flushes pending writes and detaches from the change signal.
    pub fn shutdown(&self) -> Vec<(String, FlushOutcome)> {
        self.run_due_timers();
        let outcomes = self.store.flush_all();
        self.reconciler.stop();
        self.codes.clear();
        outcomes
    }

    /// Effective configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Host strategy this context was built on.
    pub fn host_strategy(&self) -> HostStrategy {
        self.host_strategy
    }

    /// Context clock, in milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.scheduler.now_ms()
    }

    /// Typed store.
    pub fn store(&self) -> &Rc<TypedStore> {
        &self.store
    }

    /// Change bus.
    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    /// Single-flight guard.
    pub fn guard(&self) -> &MutationGuard {
        &self.guard
    }

    /// Sequence generator.
    pub fn sequences(&self) -> &SequenceGenerator {
        &self.sequences
    }

    /// Cross-context reconciler.
    pub fn reconciler(&self) -> &Rc<Reconciler> {
        &self.reconciler
    }

    /// One-time code store.
    pub fn codes(&self) -> &ExpiringStore<String> {
        &self.codes
    }
}
