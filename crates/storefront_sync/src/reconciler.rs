//! Re-synchronizes a context after another context writes to the shared facility.
//!
//! Each watched key moves `Idle -> Observing -> Reconciling -> Idle`. A platform notice puts the
//! key in `Observing` and queues a pass for when the key's bus throttle window closes, so a burst
//! of notices inside one window is reconciled once and the resulting event is never throttled
//! away. The pass re-reads the facility, compares it to the value this context last knew, and on
//! a difference adopts it and publishes an `External` change. Conflicts resolve by
//! last-writer-wins; there are no retries and no rollback.

use std::{
    cell::RefCell,
    collections::{BTreeSet, HashMap},
    rc::{Rc, Weak},
};

use serde_json::Value;
use storefront_host::{PlatformChangeSignal, Scheduler, SignalSubscription, StorageNotice};

use crate::{
    change_bus::{ChangeBus, ChangeEvent},
    typed_store::TypedStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Reconciliation progress for one key.
pub enum ReconcileState {
    /// No external change pending.
    #[default]
    Idle,
    /// A notice arrived and a pass is queued.
    Observing,
    /// The pass is re-reading and publishing.
    Reconciling,
}

#[derive(Default)]
struct ReconcilerState {
    watched: BTreeSet<String>,
    watch_all: bool,
    keys: HashMap<String, ReconcileState>,
    subscription: Option<SignalSubscription>,
    reconciled: u64,
}

/// Listens for external writes and republishes them on the local bus.
pub struct Reconciler {
    store: Rc<TypedStore>,
    bus: ChangeBus,
    scheduler: Rc<dyn Scheduler>,
    state: RefCell<ReconcilerState>,
    this: Weak<Reconciler>,
}

impl Reconciler {
    /// Creates a stopped reconciler.
    pub fn new(store: Rc<TypedStore>, bus: ChangeBus, scheduler: Rc<dyn Scheduler>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            store,
            bus,
            scheduler,
            state: RefCell::new(ReconcilerState::default()),
            this: this.clone(),
        })
    }

    /// Attaches to `signal`, replacing any previous attachment.
    pub fn start(&self, signal: &dyn PlatformChangeSignal) {
        let this = self.this.clone();
        let subscription = signal.on_external_write(Rc::new(move |notice: &StorageNotice| {
            if let Some(reconciler) = this.upgrade() {
                reconciler.observe(&notice.key);
            }
        }));
        let previous = self.state.borrow_mut().subscription.replace(subscription);
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    /// Detaches from the change signal. Queued passes still run.
    pub fn stop(&self) {
        let subscription = self.state.borrow_mut().subscription.take();
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }

    /// Returns whether the reconciler is attached to a signal.
    pub fn is_running(&self) -> bool {
        self.state.borrow().subscription.is_some()
    }

    /// Starts reconciling `key`.
    pub fn watch(&self, key: &str) {
        self.state.borrow_mut().watched.insert(key.to_string());
    }

    /// Stops reconciling `key`.
    pub fn unwatch(&self, key: &str) {
        self.state.borrow_mut().watched.remove(key);
    }

    /// Reconciles every key, watched or not.
    pub fn watch_all(&self) {
        self.state.borrow_mut().watch_all = true;
    }

    /// Returns whether notices for `key` are acted on.
    pub fn is_watching(&self, key: &str) -> bool {
        let state = self.state.borrow();
        state.watch_all || state.watched.contains(key)
    }

    /// Returns the current reconciliation state of `key`.
    pub fn state(&self, key: &str) -> ReconcileState {
        self.state
            .borrow()
            .keys
            .get(key)
            .copied()
            .unwrap_or_default()
    }

    /// Returns how many passes adopted an external value.
    pub fn reconciled_count(&self) -> u64 {
        self.state.borrow().reconciled
    }

    fn observe(&self, key: &str) {
        if !self.is_watching(key) {
            return;
        }
        let queue_pass = {
            let mut state = self.state.borrow_mut();
            let current = state.keys.entry(key.to_string()).or_default();
            let idle = *current == ReconcileState::Idle;
            *current = ReconcileState::Observing;
            idle
        };
        if queue_pass {
            self.queue_pass(key);
        }
    }

    fn queue_pass(&self, key: &str) {
        let this = self.this.clone();
        let delay_ms = self.bus.window_remaining(key);
        let key = key.to_string();
        self.scheduler.schedule(
            delay_ms,
            Box::new(move || {
                if let Some(reconciler) = this.upgrade() {
                    reconciler.reconcile(&key);
                }
            }),
        );
    }

    fn reconcile(&self, key: &str) {
        // A local publish since the pass was queued reopened the window.
        if self.bus.window_remaining(key) > 0 {
            self.state
                .borrow_mut()
                .keys
                .insert(key.to_string(), ReconcileState::Observing);
            self.queue_pass(key);
            return;
        }

        self.state
            .borrow_mut()
            .keys
            .insert(key.to_string(), ReconcileState::Reconciling);

        let fresh = self.store.read_fresh(key);
        // A pending local write lands later and wins; leave the mirror alone.
        let changed = !self.store.has_pending(key) && self.store.last_known(key) != fresh;
        if changed {
            self.store.adopt_external(key, fresh.clone());
            self.state.borrow_mut().reconciled += 1;
            self.bus
                .publish(ChangeEvent::external(key, fresh.unwrap_or(Value::Null)));
        }

        let observed_again = {
            let mut state = self.state.borrow_mut();
            match state.keys.get(key) {
                Some(ReconcileState::Observing) => true,
                _ => {
                    state.keys.remove(key);
                    false
                }
            }
        };
        if observed_again {
            self.queue_pass(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use storefront_host::{DurableFacility, ManualScheduler, MemoryFacility, SharedMemoryFacility};

    use super::*;
    use crate::{change_bus::ChangeOrigin, config::SyncConfig};

    struct Tab {
        facility: MemoryFacility,
        store: Rc<TypedStore>,
        bus: ChangeBus,
        reconciler: Rc<Reconciler>,
    }

    fn tab(shared: &SharedMemoryFacility, scheduler: &ManualScheduler) -> Tab {
        let facility = shared.context();
        let scheduler_obj: Rc<dyn Scheduler> = Rc::new(scheduler.clone());
        let bus = ChangeBus::new(scheduler_obj.clone(), 300);
        let store = TypedStore::new(
            Rc::new(facility.clone()),
            scheduler_obj.clone(),
            bus.clone(),
            Rc::new(SyncConfig::default()),
        );
        let reconciler = Reconciler::new(store.clone(), bus.clone(), scheduler_obj);
        reconciler.start(&facility);
        Tab {
            facility,
            store,
            bus,
            reconciler,
        }
    }

    fn record(bus: &ChangeBus, key: &str) -> Rc<RefCell<Vec<ChangeEvent>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _ = bus.subscribe(key, move |event| sink.borrow_mut().push(event.clone()));
        seen
    }

    #[test]
    fn external_write_is_republished_with_external_origin() {
        let shared = SharedMemoryFacility::new();
        let scheduler = ManualScheduler::new();
        let tab_a = tab(&shared, &scheduler);
        let tab_b = tab(&shared, &scheduler);
        tab_b.reconciler.watch("cart");
        let seen = record(&tab_b.bus, "cart");

        tab_a.store.set("cart", &json!([{"sku": "tee", "qty": 1}]));
        scheduler.advance(500);

        assert_eq!(
            *seen.borrow(),
            vec![ChangeEvent {
                key: "cart".to_string(),
                origin: ChangeOrigin::External,
                value: json!([{"sku": "tee", "qty": 1}]),
            }]
        );
        assert_eq!(tab_b.reconciler.state("cart"), ReconcileState::Idle);
        assert_eq!(tab_b.store.get("cart", Value::Null), json!([{"sku": "tee", "qty": 1}]));
    }

    #[test]
    fn notice_moves_key_to_observing_until_the_pass_runs() {
        let shared = SharedMemoryFacility::new();
        let scheduler = ManualScheduler::new();
        let tab_a = tab(&shared, &scheduler);
        let tab_b = tab(&shared, &scheduler);
        tab_b.reconciler.watch("theme");

        tab_a.facility.write("theme", "\"dark\"").expect("write");
        tab_a.facility.write("theme", "\"light\"").expect("write");
        assert_eq!(tab_b.reconciler.state("theme"), ReconcileState::Observing);
        assert_eq!(scheduler.pending(), 1);

        scheduler.run_ready();
        assert_eq!(tab_b.reconciler.state("theme"), ReconcileState::Idle);
        assert_eq!(tab_b.reconciler.reconciled_count(), 1);
    }

    #[test]
    fn unchanged_value_is_not_republished() {
        let shared = SharedMemoryFacility::new();
        let scheduler = ManualScheduler::new();
        let tab_a = tab(&shared, &scheduler);
        let tab_b = tab(&shared, &scheduler);
        tab_b.reconciler.watch_all();
        let seen = record(&tab_b.bus, "wishlist");

        tab_b.store.set("wishlist", &json!([1, 2]));
        scheduler.advance(500);
        tab_a.facility.write("wishlist", "[1, 2]").expect("same value, new text");
        scheduler.run_ready();

        assert!(seen.borrow().iter().all(|event| event.origin == ChangeOrigin::Local));
        assert_eq!(tab_b.reconciler.reconciled_count(), 0);
    }

    #[test]
    fn unwatched_keys_are_ignored() {
        let shared = SharedMemoryFacility::new();
        let scheduler = ManualScheduler::new();
        let tab_a = tab(&shared, &scheduler);
        let tab_b = tab(&shared, &scheduler);

        tab_a.facility.write("session", "{}").expect("write");
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(tab_b.reconciler.state("session"), ReconcileState::Idle);
    }

    #[test]
    fn pending_local_write_is_kept_over_external_value() {
        let shared = SharedMemoryFacility::new();
        let scheduler = ManualScheduler::new();
        let tab_a = tab(&shared, &scheduler);
        let tab_b = tab(&shared, &scheduler);
        tab_b.reconciler.watch("cart");

        tab_b.store.set("cart", &json!(["from-b"]));
        tab_a.facility.write("cart", "[\"from-a\"]").expect("write");
        scheduler.run_ready();
        assert_eq!(tab_b.store.get("cart", Value::Null), json!(["from-b"]));

        scheduler.advance(500);
        assert_eq!(shared.raw("cart"), Some("[\"from-b\"]".to_string()));
        assert_eq!(tab_a.store.get("cart", Value::Null), json!(["from-b"]));
    }

    #[test]
    fn removal_is_republished_as_null() {
        let shared = SharedMemoryFacility::new();
        let scheduler = ManualScheduler::new();
        let tab_a = tab(&shared, &scheduler);
        let tab_b = tab(&shared, &scheduler);
        tab_b.reconciler.watch("session");
        let seen = record(&tab_b.bus, "session");

        tab_a.store.set("session", &json!({"user": "ana"}));
        scheduler.advance(500);
        scheduler.advance(300);
        tab_a.store.remove("session");
        scheduler.run_ready();

        let values = seen.borrow().iter().map(|e| e.value.clone()).collect::<Vec<_>>();
        assert_eq!(values, vec![json!({"user": "ana"}), Value::Null]);
    }

    #[test]
    fn external_value_arriving_inside_local_window_is_still_delivered() {
        let shared = SharedMemoryFacility::new();
        let scheduler = ManualScheduler::new();
        let tab_a = tab(&shared, &scheduler);
        let tab_b = tab(&shared, &scheduler);
        tab_b.reconciler.watch("cart");
        let seen = record(&tab_b.bus, "cart");

        tab_b.store.set("cart", &json!([1]));
        scheduler.advance(100);
        tab_a.store.set("cart", &json!([2]));

        // B flushes at 500, A at 600: the notice lands inside B's window.
        scheduler.advance(600);
        assert_eq!(tab_b.reconciler.state("cart"), ReconcileState::Observing);
        assert_eq!(seen.borrow().len(), 1);

        scheduler.advance(10_000);
        let events = seen
            .borrow()
            .iter()
            .map(|event| (event.origin, event.value.clone()))
            .collect::<Vec<_>>();
        assert_eq!(
            events,
            vec![
                (ChangeOrigin::Local, json!([1])),
                (ChangeOrigin::External, json!([2])),
            ]
        );
        assert_eq!(tab_b.store.get("cart", Value::Null), json!([2]));
    }

    #[test]
    fn pass_waits_again_when_a_local_publish_reopens_the_window() {
        let shared = SharedMemoryFacility::new();
        let scheduler = ManualScheduler::new();
        let tab_a = tab(&shared, &scheduler);
        let tab_b = tab(&shared, &scheduler);
        tab_b.reconciler.watch("theme");
        let seen = record(&tab_b.bus, "theme");

        tab_a.facility.write("theme", "\"dark\"").expect("write");
        tab_b.bus.publish(ChangeEvent::local("theme", json!("light")));
        scheduler.run_ready();
        assert_eq!(tab_b.reconciler.state("theme"), ReconcileState::Observing);
        assert_eq!(tab_b.reconciler.reconciled_count(), 0);

        scheduler.advance(300);
        assert_eq!(tab_b.reconciler.state("theme"), ReconcileState::Idle);
        assert_eq!(
            seen.borrow().last().map(|event| (event.origin, event.value.clone())),
            Some((ChangeOrigin::External, json!("dark")))
        );
    }

    #[test]
    fn unwatched_key_stops_being_reconciled() {
        let shared = SharedMemoryFacility::new();
        let scheduler = ManualScheduler::new();
        let tab_a = tab(&shared, &scheduler);
        let tab_b = tab(&shared, &scheduler);
        tab_b.reconciler.watch("wishlist");
        assert!(tab_b.reconciler.is_watching("wishlist"));

        tab_b.reconciler.unwatch("wishlist");
        assert!(!tab_b.reconciler.is_watching("wishlist"));
        tab_a.facility.write("wishlist", "[4]").expect("write");
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(tab_b.reconciler.state("wishlist"), ReconcileState::Idle);
    }

    #[test]
    fn stopped_reconciler_no_longer_observes() {
        let shared = SharedMemoryFacility::new();
        let scheduler = ManualScheduler::new();
        let tab_a = tab(&shared, &scheduler);
        let tab_b = tab(&shared, &scheduler);
        tab_b.reconciler.watch_all();
        assert!(tab_b.reconciler.is_running());

        tab_b.reconciler.stop();
        assert!(!tab_b.reconciler.is_running());
        tab_a.facility.write("k", "1").expect("write");
        assert_eq!(scheduler.pending(), 0);
    }
}
