//! Durable key-value facility contracts and in-memory adapters.

use std::{
    cell::RefCell,
    collections::BTreeMap,
    fmt,
    rc::{Rc, Weak},
};

use crate::{
    error::FacilityError,
    signal::{NoticeHandler, PlatformChangeSignal, SignalSubscription, StorageNotice},
};

/// Host-provided string key/value persistence shared by every context of one application.
///
/// Values are opaque text; callers own their encoding. All methods are synchronous, matching the
/// browser `localStorage` API.
pub trait DurableFacility {
    /// Reads the raw value stored for `key`.
    fn read(&self, key: &str) -> Result<Option<String>, FacilityError>;

    /// Stores `raw` under `key`, replacing any previous value.
    fn write(&self, key: &str, raw: &str) -> Result<(), FacilityError>;

    /// Deletes `key`. Deleting an absent key succeeds.
    fn delete(&self, key: &str) -> Result<(), FacilityError>;

    /// Lists every stored key in ascending order.
    fn keys(&self) -> Result<Vec<String>, FacilityError>;
}

#[derive(Debug, Clone, Copy, Default)]
/// Facility that stores nothing, for unsupported targets and baseline tests.
pub struct NoopFacility;

impl DurableFacility for NoopFacility {
    fn read(&self, _key: &str) -> Result<Option<String>, FacilityError> {
        Ok(None)
    }

    fn write(&self, _key: &str, _raw: &str) -> Result<(), FacilityError> {
        Ok(())
    }

    fn delete(&self, _key: &str) -> Result<(), FacilityError> {
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, FacilityError> {
        Ok(Vec::new())
    }
}

struct Listener {
    id: u64,
    context_id: u64,
    handler: NoticeHandler,
}

#[derive(Default)]
struct SharedState {
    entries: BTreeMap<String, String>,
    capacity_bytes: Option<usize>,
    listeners: Vec<Listener>,
    next_context_id: u64,
    next_listener_id: u64,
}

impl SharedState {
    fn used_bytes(&self) -> usize {
        self.entries
            .iter()
            .map(|(key, value)| entry_bytes(key, value))
            .sum()
    }

    fn handlers_outside(&self, context_id: u64) -> Vec<NoticeHandler> {
        self.listeners
            .iter()
            .filter(|listener| listener.context_id != context_id)
            .map(|listener| listener.handler.clone())
            .collect()
    }
}

fn entry_bytes(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

/// In-memory backing store shared by any number of simulated contexts.
///
/// Each [`SharedMemoryFacility::context`] call yields a [`MemoryFacility`] view that behaves like
/// one browser tab: its writes are visible to every view immediately, and every *other* view
/// receives a [`StorageNotice`] through its [`PlatformChangeSignal`] implementation.
#[derive(Clone, Default)]
pub struct SharedMemoryFacility {
    inner: Rc<RefCell<SharedState>>,
}

impl SharedMemoryFacility {
    /// Creates an unbounded shared facility.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a shared facility that rejects writes past `capacity_bytes`.
    ///
    /// Usage is counted as `key.len() + value.len()` per entry.
    pub fn with_capacity_bytes(capacity_bytes: usize) -> Self {
        let facility = Self::default();
        facility.inner.borrow_mut().capacity_bytes = Some(capacity_bytes);
        facility
    }

    /// Opens a new context view onto the shared entries.
    pub fn context(&self) -> MemoryFacility {
        let context_id = {
            let mut state = self.inner.borrow_mut();
            state.next_context_id += 1;
            state.next_context_id
        };
        MemoryFacility {
            shared: self.clone(),
            context_id,
        }
    }

    /// Writes a raw value without capacity checks or notices.
    ///
    /// Used to seed fixtures and to simulate out-of-band corruption.
    pub fn seed_raw(&self, key: impl Into<String>, raw: impl Into<String>) {
        self.inner.borrow_mut().entries.insert(key.into(), raw.into());
    }

    /// Returns the raw value for `key` without going through a context.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.inner.borrow().entries.get(key).cloned()
    }

    /// Returns the bytes currently held, counted the same way as the capacity.
    pub fn used_bytes(&self) -> usize {
        self.inner.borrow().used_bytes()
    }

    /// Returns the configured capacity, if any.
    pub fn capacity_bytes(&self) -> Option<usize> {
        self.inner.borrow().capacity_bytes
    }

    fn notify_from(&self, context_id: u64, notice: StorageNotice) {
        let handlers = self.inner.borrow().handlers_outside(context_id);
        for handler in handlers {
            handler(&notice);
        }
    }
}

impl fmt::Debug for SharedMemoryFacility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("SharedMemoryFacility")
            .field("entries", &state.entries.len())
            .field("capacity_bytes", &state.capacity_bytes)
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

/// One context's view of a [`SharedMemoryFacility`].
#[derive(Debug, Clone)]
pub struct MemoryFacility {
    shared: SharedMemoryFacility,
    context_id: u64,
}

impl MemoryFacility {
    /// Creates a standalone context over a fresh, unbounded shared facility.
    pub fn standalone() -> Self {
        SharedMemoryFacility::new().context()
    }

    /// Returns the identifier distinguishing this context from its siblings.
    pub const fn context_id(&self) -> u64 {
        self.context_id
    }

    /// Returns the shared backing store.
    pub fn shared(&self) -> &SharedMemoryFacility {
        &self.shared
    }
}

impl DurableFacility for MemoryFacility {
    fn read(&self, key: &str) -> Result<Option<String>, FacilityError> {
        Ok(self.shared.raw(key))
    }

    fn write(&self, key: &str, raw: &str) -> Result<(), FacilityError> {
        {
            let mut state = self.shared.inner.borrow_mut();
            let previous = state.entries.get(key).cloned();
            if previous.as_deref() == Some(raw) {
                return Ok(());
            }
            if let Some(capacity_bytes) = state.capacity_bytes {
                let released = previous
                    .as_deref()
                    .map(|value| entry_bytes(key, value))
                    .unwrap_or(0);
                let needed_bytes = state.used_bytes() - released + entry_bytes(key, raw);
                if needed_bytes > capacity_bytes {
                    return Err(FacilityError::CapacityExceeded {
                        key: key.to_string(),
                        needed_bytes,
                        capacity_bytes,
                    });
                }
            }
            state.entries.insert(key.to_string(), raw.to_string());
        }
        self.shared.notify_from(
            self.context_id,
            StorageNotice {
                key: key.to_string(),
                new_raw: Some(raw.to_string()),
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), FacilityError> {
        let removed = self.shared.inner.borrow_mut().entries.remove(key);
        if removed.is_some() {
            self.shared.notify_from(
                self.context_id,
                StorageNotice {
                    key: key.to_string(),
                    new_raw: None,
                },
            );
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, FacilityError> {
        Ok(self.shared.inner.borrow().entries.keys().cloned().collect())
    }
}

impl PlatformChangeSignal for MemoryFacility {
    fn on_external_write(&self, handler: NoticeHandler) -> SignalSubscription {
        let id = {
            let mut state = self.shared.inner.borrow_mut();
            state.next_listener_id += 1;
            let id = state.next_listener_id;
            state.listeners.push(Listener {
                id,
                context_id: self.context_id,
                handler,
            });
            id
        };
        let weak: Weak<RefCell<SharedState>> = Rc::downgrade(&self.shared.inner);
        SignalSubscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.borrow_mut().listeners.retain(|listener| listener.id != id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    type Seen = Rc<RefCell<Vec<StorageNotice>>>;

    fn recording(signal: &dyn PlatformChangeSignal) -> (Seen, SignalSubscription) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let subscription = signal.on_external_write(Rc::new(move |notice| {
            sink.borrow_mut().push(notice.clone());
        }));
        (seen, subscription)
    }

    #[test]
    fn memory_facility_round_trip_delete_and_keys() {
        let facility = MemoryFacility::standalone();
        let facility_obj: &dyn DurableFacility = &facility;

        facility_obj.write("b", "2").expect("write b");
        facility_obj.write("a", "1").expect("write a");
        assert_eq!(facility_obj.read("a").expect("read"), Some("1".to_string()));
        assert_eq!(
            facility_obj.keys().expect("keys"),
            vec!["a".to_string(), "b".to_string()]
        );

        facility_obj.delete("a").expect("delete");
        facility_obj.delete("missing").expect("delete absent");
        assert_eq!(facility_obj.read("a").expect("read"), None);
    }

    #[test]
    fn notices_reach_other_contexts_only() {
        let shared = SharedMemoryFacility::new();
        let tab_a = shared.context();
        let tab_b = shared.context();
        let (seen_a, _sub_a) = recording(&tab_a);
        let (seen_b, _sub_b) = recording(&tab_b);

        tab_a.write("cart", "[1]").expect("write");
        tab_a.delete("cart").expect("delete");

        assert!(seen_a.borrow().is_empty());
        assert_eq!(
            *seen_b.borrow(),
            vec![
                StorageNotice {
                    key: "cart".to_string(),
                    new_raw: Some("[1]".to_string()),
                },
                StorageNotice {
                    key: "cart".to_string(),
                    new_raw: None,
                },
            ]
        );
    }

    #[test]
    fn unchanged_write_raises_no_notice() {
        let shared = SharedMemoryFacility::new();
        let tab_a = shared.context();
        let tab_b = shared.context();
        let (seen_b, _sub) = recording(&tab_b);

        tab_a.write("theme", "\"dark\"").expect("write");
        tab_a.write("theme", "\"dark\"").expect("rewrite");
        assert_eq!(seen_b.borrow().len(), 1);
    }

    #[test]
    fn cancelled_subscription_stops_notices() {
        let shared = SharedMemoryFacility::new();
        let tab_a = shared.context();
        let tab_b = shared.context();
        let (seen_b, subscription) = recording(&tab_b);

        subscription.cancel();
        tab_a.write("k", "1").expect("write");
        assert!(seen_b.borrow().is_empty());
    }

    #[test]
    fn capacity_is_enforced_and_counts_replaced_entries() {
        let shared = SharedMemoryFacility::with_capacity_bytes(10);
        let tab = shared.context();

        tab.write("k", "12345").expect("fits");
        tab.write("k", "123456789").expect("replacement fits");
        let err = tab.write("x", "1").expect_err("over capacity");
        assert_eq!(
            err,
            FacilityError::CapacityExceeded {
                key: "x".to_string(),
                needed_bytes: 12,
                capacity_bytes: 10,
            }
        );
        assert_eq!(shared.used_bytes(), 10);
    }

    #[test]
    fn seed_raw_bypasses_notices() {
        let shared = SharedMemoryFacility::new();
        let tab = shared.context();
        let (seen, _sub) = recording(&tab);

        shared.seed_raw("cart", "{not json");
        assert_eq!(tab.read("cart").expect("read"), Some("{not json".to_string()));
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn noop_facility_is_empty_and_successful() {
        let facility = NoopFacility;
        facility.write("k", "v").expect("write");
        assert_eq!(facility.read("k").expect("read"), None);
        facility.delete("k").expect("delete");
        assert!(facility.keys().expect("keys").is_empty());
    }
}
