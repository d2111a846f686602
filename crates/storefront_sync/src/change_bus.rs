//! Per-key publish/subscribe of change events with leading-edge throttling.

use std::{
    cell::RefCell,
    collections::HashMap,
    fmt,
    rc::{Rc, Weak},
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use storefront_host::Scheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Where a change originated.
pub enum ChangeOrigin {
    /// Written by this context.
    Local,
    /// Written by another context and picked up through the platform change signal.
    External,
}

#[derive(Debug, Clone, PartialEq)]
/// Notification that a key's value changed. Removal is reported as JSON `null`.
pub struct ChangeEvent {
    /// Key that changed.
    pub key: String,
    /// Where the change came from.
    pub origin: ChangeOrigin,
    /// Value after the change.
    pub value: Value,
}

impl ChangeEvent {
    /// Builds a locally-originated event.
    pub fn local(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            origin: ChangeOrigin::Local,
            value,
        }
    }

    /// Builds an externally-originated event.
    pub fn external(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            origin: ChangeOrigin::External,
            value,
        }
    }
}

/// Listener invoked for every delivered event on a subscribed key.
pub type ChangeHandler = Rc<dyn Fn(&ChangeEvent)>;

#[derive(Default)]
struct BusState {
    subscribers: HashMap<String, Vec<(u64, ChangeHandler)>>,
    last_delivered_ms: HashMap<String, u64>,
    next_subscriber_id: u64,
}

struct BusInner {
    scheduler: Rc<dyn Scheduler>,
    throttle_ms: u64,
    state: RefCell<BusState>,
}

/// In-process change bus shared by the store, the reconciler and UI consumers of one context.
///
/// Publishing is throttled per key: the first event in a window is delivered and later events for
/// the same key inside that window are dropped, not queued. Consumers are therefore guaranteed to
/// observe *some* later value, not every value.
#[derive(Clone)]
pub struct ChangeBus {
    inner: Rc<BusInner>,
}

impl ChangeBus {
    /// Creates a bus reading time from `scheduler` and throttling at `throttle_ms`.
    pub fn new(scheduler: Rc<dyn Scheduler>, throttle_ms: u64) -> Self {
        Self {
            inner: Rc::new(BusInner {
                scheduler,
                throttle_ms,
                state: RefCell::new(BusState::default()),
            }),
        }
    }

    /// Registers `handler` for `key`. Handlers run in registration order.
    pub fn subscribe(&self, key: &str, handler: impl Fn(&ChangeEvent) + 'static) -> Subscription {
        let id = {
            let mut state = self.inner.state.borrow_mut();
            state.next_subscriber_id += 1;
            let id = state.next_subscriber_id;
            state
                .subscribers
                .entry(key.to_string())
                .or_default()
                .push((id, Rc::new(handler)));
            id
        };
        Subscription {
            bus: Rc::downgrade(&self.inner),
            key: key.to_string(),
            id,
        }
    }

    /// Registers a handler that receives the event value decoded as `T`.
    ///
    /// Events whose value does not decode are logged and skipped for this handler.
    pub fn subscribe_typed<T: DeserializeOwned + 'static>(
        &self,
        key: &str,
        handler: impl Fn(ChangeOrigin, T) + 'static,
    ) -> Subscription {
        self.subscribe(key, move |event| {
            match serde_json::from_value::<T>(event.value.clone()) {
                Ok(value) => handler(event.origin, value),
                Err(err) => {
                    leptos::logging::warn!("change event for `{}` did not decode: {err}", event.key);
                }
            }
        })
    }

    /// Delivers `event` to the key's subscribers unless the key is inside its throttle window.
    ///
    /// Returns `false` when the event was dropped by the throttle.
    pub fn publish(&self, event: ChangeEvent) -> bool {
        let now = self.inner.scheduler.now_ms();
        let handlers = {
            let mut state = self.inner.state.borrow_mut();
            if let Some(last) = state.last_delivered_ms.get(&event.key) {
                if now.saturating_sub(*last) < self.inner.throttle_ms {
                    return false;
                }
            }
            state.last_delivered_ms.insert(event.key.clone(), now);
            state
                .subscribers
                .get(&event.key)
                .map(|subscribers| {
                    subscribers
                        .iter()
                        .map(|(_, handler)| handler.clone())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default()
        };

        for handler in handlers {
            handler(&event);
        }
        true
    }

    /// Returns how long until `key` can deliver again, `0` when its window is closed.
    pub fn window_remaining(&self, key: &str) -> u64 {
        let now = self.inner.scheduler.now_ms();
        self.inner
            .state
            .borrow()
            .last_delivered_ms
            .get(key)
            .map_or(0, |last| {
                self.inner
                    .throttle_ms
                    .saturating_sub(now.saturating_sub(*last))
            })
    }

    /// Returns the number of live subscribers for `key`.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.inner
            .state
            .borrow()
            .subscribers
            .get(key)
            .map_or(0, Vec::len)
    }
}

impl fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("ChangeBus")
            .field("throttle_ms", &self.inner.throttle_ms)
            .field("keys", &state.subscribers.len())
            .finish()
    }
}

/// Handle for one [`ChangeBus`] registration.
///
/// Dropping the handle keeps the handler registered; call [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<BusInner>,
    key: String,
    id: u64,
}

impl Subscription {
    /// Returns the subscribed key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Removes the handler from the bus.
    pub fn unsubscribe(self) {
        let Some(bus) = self.bus.upgrade() else {
            return;
        };
        let mut state = bus.state.borrow_mut();
        if let Some(subscribers) = state.subscribers.get_mut(&self.key) {
            subscribers.retain(|(id, _)| *id != self.id);
            if subscribers.is_empty() {
                state.subscribers.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use pretty_assertions::assert_eq;
    use serde_json::json;
    use storefront_host::ManualScheduler;

    use super::*;

    fn bus(scheduler: &ManualScheduler) -> ChangeBus {
        ChangeBus::new(Rc::new(scheduler.clone()), 300)
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let scheduler = ManualScheduler::new();
        let bus = bus(&scheduler);
        let log = Rc::new(RefCell::new(Vec::new()));
        for label in ["first", "second", "third"] {
            let log = log.clone();
            let _ = bus.subscribe("cart", move |_| log.borrow_mut().push(label));
        }

        assert!(bus.publish(ChangeEvent::local("cart", json!([]))));
        assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn publish_inside_window_is_dropped_not_queued() {
        let scheduler = ManualScheduler::new();
        let bus = bus(&scheduler);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _sub = bus.subscribe("theme", move |event| sink.borrow_mut().push(event.value.clone()));

        assert!(bus.publish(ChangeEvent::local("theme", json!("light"))));
        scheduler.advance(100);
        assert!(!bus.publish(ChangeEvent::local("theme", json!("dark"))));
        scheduler.advance(199);
        assert!(!bus.publish(ChangeEvent::local("theme", json!("system"))));
        scheduler.advance(1);
        assert!(bus.publish(ChangeEvent::local("theme", json!("dark"))));

        assert_eq!(scheduler.pending(), 0);
        assert_eq!(*seen.borrow(), vec![json!("light"), json!("dark")]);
    }

    #[test]
    fn window_remaining_counts_down_to_zero() {
        let scheduler = ManualScheduler::new();
        let bus = bus(&scheduler);
        assert_eq!(bus.window_remaining("cart"), 0);

        bus.publish(ChangeEvent::local("cart", json!(1)));
        assert_eq!(bus.window_remaining("cart"), 300);
        scheduler.advance(120);
        assert_eq!(bus.window_remaining("cart"), 180);
        assert!(!bus.publish(ChangeEvent::local("cart", json!(2))));
        assert_eq!(bus.window_remaining("cart"), 180);

        scheduler.advance(180);
        assert_eq!(bus.window_remaining("cart"), 0);
        assert_eq!(bus.window_remaining("wishlist"), 0);
    }

    #[test]
    fn throttle_is_tracked_per_key() {
        let scheduler = ManualScheduler::new();
        let bus = bus(&scheduler);
        assert!(bus.publish(ChangeEvent::local("cart", json!(1))));
        assert!(bus.publish(ChangeEvent::local("wishlist", json!(1))));
        assert!(!bus.publish(ChangeEvent::local("cart", json!(2))));
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let scheduler = ManualScheduler::new();
        let bus = bus(&scheduler);
        let count = Rc::new(RefCell::new(0));
        let kept_count = count.clone();
        let kept = bus.subscribe("cart", move |_| *kept_count.borrow_mut() += 1);
        let removed = bus.subscribe("cart", |_| panic!("unsubscribed handler ran"));
        assert_eq!(removed.key(), "cart");

        removed.unsubscribe();
        assert_eq!(bus.subscriber_count("cart"), 1);
        bus.publish(ChangeEvent::local("cart", json!([])));
        assert_eq!(*count.borrow(), 1);

        kept.unsubscribe();
        assert_eq!(bus.subscriber_count("cart"), 0);
    }

    #[test]
    fn handler_may_subscribe_during_dispatch() {
        let scheduler = ManualScheduler::new();
        let bus = bus(&scheduler);
        let inner_bus = bus.clone();
        let _sub = bus.subscribe("session", move |_| {
            let _ = inner_bus.subscribe("session", |_| {});
        });

        bus.publish(ChangeEvent::external("session", Value::Null));
        assert_eq!(bus.subscriber_count("session"), 2);
    }

    #[test]
    fn typed_subscription_decodes_and_skips_mismatches() {
        let scheduler = ManualScheduler::new();
        let bus = bus(&scheduler);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _sub = bus.subscribe_typed::<Vec<u32>>("wishlist", move |origin, ids| {
            sink.borrow_mut().push((origin, ids));
        });

        bus.publish(ChangeEvent::external("wishlist", json!([3, 5])));
        scheduler.advance(300);
        bus.publish(ChangeEvent::local("wishlist", json!({"not": "a list"})));

        assert_eq!(*seen.borrow(), vec![(ChangeOrigin::External, vec![3, 5])]);
    }

    #[test]
    fn origin_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(ChangeOrigin::External).expect("serialize"),
            json!("external")
        );
    }
}
