//! In-process values that expire, used for one-time codes.
//!
//! Nothing here touches the durable facility. Entries live only as long as the owning context.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use storefront_host::Scheduler;

#[derive(Debug, Clone)]
struct ExpiringEntry<V> {
    value: V,
    expires_at_ms: u64,
}

/// Map of values that are valid until a deadline and can be consumed once.
pub struct ExpiringStore<V> {
    clock: Rc<dyn Scheduler>,
    entries: RefCell<HashMap<String, ExpiringEntry<V>>>,
}

impl<V> ExpiringStore<V> {
    /// Creates an empty store reading time from `clock`.
    pub fn new(clock: Rc<dyn Scheduler>) -> Self {
        Self {
            clock,
            entries: RefCell::new(HashMap::new()),
        }
    }

    /// Stores `value` under `key` until `ttl_ms` from now, replacing any earlier value.
    pub fn store_with_expiry(&self, key: &str, value: V, ttl_ms: u64) {
        let expires_at_ms = self.clock.now_ms().saturating_add(ttl_ms);
        self.entries.borrow_mut().insert(
            key.to_string(),
            ExpiringEntry {
                value,
                expires_at_ms,
            },
        );
    }

    /// Returns `true` and removes the entry when `candidate` matches a live value for `key`.
    ///
    /// An expired entry is purged by the lookup. A live entry that does not match is kept, so the
    /// caller can try again until the deadline.
    pub fn consume_if_valid<Q>(&self, key: &str, candidate: &Q) -> bool
    where
        Q: ?Sized,
        V: PartialEq<Q>,
    {
        let now = self.clock.now_ms();
        let mut entries = self.entries.borrow_mut();
        let Some(entry) = entries.get(key) else {
            return false;
        };
        if now >= entry.expires_at_ms {
            entries.remove(key);
            return false;
        }
        if entry.value == *candidate {
            entries.remove(key);
            return true;
        }
        false
    }

    /// Returns whether `key` holds a live value.
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now_ms();
        self.entries
            .borrow()
            .get(key)
            .is_some_and(|entry| now < entry.expires_at_ms)
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires_at_ms);
        before - entries.len()
    }

    /// Number of stored entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Returns whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}
