//! Typed, debounced read/write access to the durable facility.
//!
//! Writes land in an in-memory mirror immediately and reach the facility once the key has been
//! quiet for the debounce window. Reads never fail: absent, corrupt, or mistyped blobs yield the
//! caller's fallback. Quota rejections trigger one eviction pass over recreatable entries and a
//! single retry before the write is dropped with a warning.

use std::{
    cell::RefCell,
    collections::{BTreeSet, HashMap},
    rc::{Rc, Weak},
};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use storefront_host::{DurableFacility, Scheduler, TimerHandle};

use crate::{
    change_bus::{ChangeBus, ChangeEvent},
    config::SyncConfig,
};

#[derive(Debug, Clone, PartialEq)]
/// A key's current value as seen by this context.
pub struct StoreEntry<T> {
    /// Persisted key.
    pub key: String,
    /// Decoded value.
    pub value: T,
    /// When this context last persisted the key, if it has.
    pub last_written_at_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Per-key write-back state.
pub enum FlushState {
    /// Nothing held locally beyond what the facility has.
    Idle,
    /// A local value waits for its debounce deadline.
    Pending {
        /// When the flush timer fires.
        due_at_ms: u64,
    },
    /// The last local value reached the facility.
    Flushed {
        /// When it was written.
        at_ms: u64,
    },
    /// The last local value could not be persisted; the mirror still serves it.
    Dropped {
        /// When the write was abandoned.
        at_ms: u64,
    },
}

impl FlushState {
    const fn serves_mirror(self) -> bool {
        matches!(self, Self::Pending { .. } | Self::Dropped { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Result of pushing a pending value to the facility.
pub enum FlushOutcome {
    /// Written on the first attempt.
    Written,
    /// Written after an eviction pass removed `evicted` recreatable entries.
    WrittenAfterEviction {
        /// Entries deleted by the eviction pass.
        evicted: usize,
    },
    /// The facility rejected the write; durability for this value is lost.
    Dropped,
    /// The key had no pending value.
    NothingPending,
}

impl FlushOutcome {
    /// Returns whether the value reached the facility.
    pub const fn is_written(self) -> bool {
        matches!(self, Self::Written | Self::WrittenAfterEviction { .. })
    }
}

struct MirrorEntry {
    value: Value,
    state: FlushState,
    timer: Option<TimerHandle>,
    generation: u64,
    last_written_at_ms: Option<u64>,
}

impl MirrorEntry {
    fn idle(value: Value) -> Self {
        Self {
            value,
            state: FlushState::Idle,
            timer: None,
            generation: 0,
            last_written_at_ms: None,
        }
    }
}

#[derive(Default)]
struct StoreState {
    mirror: HashMap<String, MirrorEntry>,
    evictable: BTreeSet<String>,
    next_generation: u64,
    flush_count: u64,
}

/// Shape-agnostic typed store over one context's durable facility.
pub struct TypedStore {
    facility: Rc<dyn DurableFacility>,
    scheduler: Rc<dyn Scheduler>,
    bus: ChangeBus,
    config: Rc<SyncConfig>,
    state: RefCell<StoreState>,
    this: Weak<TypedStore>,
}

impl TypedStore {
    /// Creates a store that publishes flushed writes on `bus`.
    pub fn new(
        facility: Rc<dyn DurableFacility>,
        scheduler: Rc<dyn Scheduler>,
        bus: ChangeBus,
        config: Rc<SyncConfig>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            facility,
            scheduler,
            bus,
            config,
            state: RefCell::new(StoreState::default()),
            this: this.clone(),
        })
    }

    /// Reads `key` as `T`, returning `fallback` when the key is absent, corrupt, or mistyped.
    pub fn get<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        self.try_get(key).unwrap_or(fallback)
    }

    /// Reads `key` with its local write metadata.
    pub fn entry<T: DeserializeOwned>(&self, key: &str) -> Option<StoreEntry<T>> {
        let value = self.try_get(key)?;
        let last_written_at_ms = self
            .state
            .borrow()
            .mirror
            .get(key)
            .and_then(|entry| entry.last_written_at_ms);
        Some(StoreEntry {
            key: key.to_string(),
            value,
            last_written_at_ms,
        })
    }

    /// Records `value` for `key` and (re)starts its debounce timer.
    ///
    /// A later `get` in this context sees the value at once. Only the latest value set inside one
    /// debounce window is written. Values that fail to serialize are logged and ignored.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(err) => {
                leptos::logging::warn!("store set `{key}` skipped, value not serializable: {err}");
                return;
            }
        };

        let debounce_ms = self.config.debounce_ms;
        let due_at_ms = self.scheduler.now_ms().saturating_add(debounce_ms);
        let (generation, stale_timer) = {
            let mut state = self.state.borrow_mut();
            state.next_generation += 1;
            let generation = state.next_generation;
            let entry = state
                .mirror
                .entry(key.to_string())
                .or_insert_with(|| MirrorEntry::idle(Value::Null));
            let stale_timer = entry.timer.take();
            entry.value = value;
            entry.generation = generation;
            entry.state = FlushState::Pending { due_at_ms };
            (generation, stale_timer)
        };
        if let Some(timer) = stale_timer {
            self.scheduler.cancel(timer);
        }

        let this = self.this.clone();
        let timer_key = key.to_string();
        let timer = self.scheduler.schedule(
            debounce_ms,
            Box::new(move || {
                if let Some(store) = this.upgrade() {
                    store.flush_generation(&timer_key, generation);
                }
            }),
        );

        let mut state = self.state.borrow_mut();
        match state.mirror.get_mut(key) {
            Some(entry) if entry.generation == generation && entry.state.serves_mirror() => {
                entry.timer = Some(timer);
            }
            _ => {}
        }
    }

    /// Deletes `key` from the facility at once, discarding any pending write.
    pub fn remove(&self, key: &str) {
        let stale_timer = self
            .state
            .borrow_mut()
            .mirror
            .remove(key)
            .and_then(|entry| entry.timer);
        if let Some(timer) = stale_timer {
            self.scheduler.cancel(timer);
        }
        if let Err(err) = self.facility.delete(key) {
            leptos::logging::warn!("store remove `{key}` failed: {err}");
        }
        self.bus.publish(ChangeEvent::local(key, Value::Null));
    }

    /// Writes the pending value for `key` now instead of waiting for its timer.
    pub fn flush_now(&self, key: &str) -> FlushOutcome {
        let (value, generation, timer) = {
            let mut state = self.state.borrow_mut();
            match state.mirror.get_mut(key) {
                Some(entry) if matches!(entry.state, FlushState::Pending { .. }) => {
                    (entry.value.clone(), entry.generation, entry.timer.take())
                }
                _ => return FlushOutcome::NothingPending,
            }
        };
        if let Some(timer) = timer {
            self.scheduler.cancel(timer);
        }

        let outcome = match serde_json::to_string(&value) {
            Ok(raw) => self.write_with_eviction(key, &raw),
            Err(err) => {
                leptos::logging::warn!("store flush `{key}` dropped, encode failed: {err}");
                FlushOutcome::Dropped
            }
        };

        let now = self.scheduler.now_ms();
        {
            let mut state = self.state.borrow_mut();
            if outcome.is_written() {
                state.flush_count += 1;
            }
            if let Some(entry) = state.mirror.get_mut(key) {
                if entry.generation == generation {
                    if outcome.is_written() {
                        entry.state = FlushState::Flushed { at_ms: now };
                        entry.last_written_at_ms = Some(now);
                    } else {
                        entry.state = FlushState::Dropped { at_ms: now };
                    }
                }
            }
        }

        if outcome.is_written() {
            self.bus.publish(ChangeEvent::local(key, value));
        }
        outcome
    }

    /// Flushes every pending key, in key order.
    pub fn flush_all(&self) -> Vec<(String, FlushOutcome)> {
        let mut pending = self
            .state
            .borrow()
            .mirror
            .iter()
            .filter(|(_, entry)| matches!(entry.state, FlushState::Pending { .. }))
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        pending.sort();
        pending
            .into_iter()
            .map(|key| {
                let outcome = self.flush_now(&key);
                (key, outcome)
            })
            .collect()
    }

    /// Marks `key` as recreatable so eviction may delete it under quota pressure.
    pub fn tag_evictable(&self, key: &str) {
        self.state.borrow_mut().evictable.insert(key.to_string());
    }

    /// Returns whether `key` is recreatable by prefix or by tag.
    pub fn is_evictable(&self, key: &str) -> bool {
        self.config.is_evictable_key(key) || self.state.borrow().evictable.contains(key)
    }

    /// Returns whether `key` has a value waiting for its debounce deadline.
    pub fn has_pending(&self, key: &str) -> bool {
        self.flush_state(key)
            .is_some_and(|state| matches!(state, FlushState::Pending { .. }))
    }

    /// Returns the write-back state for `key`, or `None` when the context holds nothing for it.
    pub fn flush_state(&self, key: &str) -> Option<FlushState> {
        self.state.borrow().mirror.get(key).map(|entry| entry.state)
    }

    /// Returns how many writes reached the facility.
    pub fn flush_count(&self) -> u64 {
        self.state.borrow().flush_count
    }

    /// Returns the value this context last wrote or reconciled for `key`.
    pub(crate) fn last_known(&self, key: &str) -> Option<Value> {
        self.state
            .borrow()
            .mirror
            .get(key)
            .map(|entry| entry.value.clone())
    }

    /// Reads and parses the facility's current value without touching the mirror.
    pub(crate) fn read_fresh(&self, key: &str) -> Option<Value> {
        match self.facility.read(key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(err) => {
                    leptos::logging::warn!("store value for `{key}` is not valid JSON: {err}");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                leptos::logging::warn!("store read `{key}` failed: {err}");
                None
            }
        }
    }

    /// Replaces the mirror's value for `key` with one written by another context.
    pub(crate) fn adopt_external(&self, key: &str, value: Option<Value>) {
        let mut state = self.state.borrow_mut();
        match value {
            Some(value) => {
                let entry = state
                    .mirror
                    .entry(key.to_string())
                    .or_insert_with(|| MirrorEntry::idle(Value::Null));
                entry.value = value;
                entry.state = FlushState::Idle;
            }
            None => {
                state.mirror.remove(key);
            }
        }
    }

    fn try_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mirrored = self
            .state
            .borrow()
            .mirror
            .get(key)
            .filter(|entry| entry.state.serves_mirror())
            .map(|entry| entry.value.clone());
        let value = match mirrored {
            Some(value) => value,
            None => {
                let value = self.read_fresh(key);
                if value.is_none() {
                    leptos::logging::debug_warn!("store key `{key}` has no usable value");
                }
                value?
            }
        };
        match serde_json::from_value(value) {
            Ok(value) => Some(value),
            Err(err) => {
                leptos::logging::warn!("store value for `{key}` has an unexpected shape: {err}");
                None
            }
        }
    }

    fn flush_generation(&self, key: &str, generation: u64) {
        let current = self
            .state
            .borrow()
            .mirror
            .get(key)
            .is_some_and(|entry| entry.generation == generation);
        if current {
            self.flush_now(key);
        }
    }

    fn write_with_eviction(&self, key: &str, raw: &str) -> FlushOutcome {
        match self.facility.write(key, raw) {
            Ok(()) => FlushOutcome::Written,
            Err(err) if err.is_capacity_exceeded() => {
                let evicted = self.evict_recreatable(key);
                leptos::logging::warn!("{err}; evicted {evicted} recreatable entries and retrying");
                match self.facility.write(key, raw) {
                    Ok(()) => FlushOutcome::WrittenAfterEviction { evicted },
                    Err(err) => {
                        leptos::logging::warn!("store write `{key}` dropped after eviction: {err}");
                        FlushOutcome::Dropped
                    }
                }
            }
            Err(err) => {
                leptos::logging::warn!("store write `{key}` dropped: {err}");
                FlushOutcome::Dropped
            }
        }
    }

    fn evict_recreatable(&self, writing_key: &str) -> usize {
        let keys = match self.facility.keys() {
            Ok(keys) => keys,
            Err(err) => {
                leptos::logging::warn!("eviction pass could not list keys: {err}");
                return 0;
            }
        };
        let victims = keys
            .into_iter()
            .filter(|key| key != writing_key && self.is_evictable(key) && !self.has_pending(key))
            .collect::<Vec<_>>();

        let mut evicted = 0;
        for key in victims {
            match self.facility.delete(&key) {
                Ok(()) => {
                    self.state.borrow_mut().mirror.remove(&key);
                    evicted += 1;
                }
                Err(err) => leptos::logging::warn!("eviction of `{key}` failed: {err}"),
            }
        }
        evicted
    }
}
