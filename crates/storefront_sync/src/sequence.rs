//! Monotonic identifiers derived from the tail of a persisted collection.
//!
//! The counter is never stored on its own: the next value is computed from the identifier of the
//! collection's last record. Computing and persisting is a read-then-write with no cross-context
//! atomicity, so two contexts that both read before either persists can emit the same identifier.

use std::rc::Rc;

use serde::Serialize;
use serde_json::Value;

use crate::typed_store::TypedStore;

/// Record field holding the identifier unless overridden.
pub const DEFAULT_ID_FIELD: &str = "id";
/// Minimum zero-padded width of the numeric suffix.
pub const DEFAULT_MIN_WIDTH: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
/// A literal prefix followed by a zero-padded decimal counter, e.g. `ORD-07`.
pub struct SequencePattern {
    prefix: String,
    min_width: usize,
}

impl SequencePattern {
    /// Creates a pattern with the given prefix and the default width.
    pub fn prefixed(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            min_width: DEFAULT_MIN_WIDTH,
        }
    }

    /// Overrides the minimum padded width.
    pub fn with_min_width(mut self, min_width: usize) -> Self {
        self.min_width = min_width;
        self
    }

    /// Returns the literal prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Extracts the counter from `id`, or `None` if `id` does not match the pattern.
    pub fn parse(&self, id: &str) -> Option<u64> {
        let digits = id.strip_prefix(self.prefix.as_str())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Renders `value` with the prefix and zero padding.
    pub fn format(&self, value: u64) -> String {
        format!("{}{:0width$}", self.prefix, value, width = self.min_width)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The counter implied by a domain's collection at the time of the call.
pub struct SequenceCounter {
    /// Collection key.
    pub domain: String,
    /// Counter of the last record; `0` for an empty or unparseable tail.
    pub last_value: u64,
}

/// Derives next identifiers for collection-backed domains.
pub struct SequenceGenerator {
    store: Rc<TypedStore>,
    id_field: String,
}

impl SequenceGenerator {
    /// Creates a generator reading collections through `store`.
    pub fn new(store: Rc<TypedStore>) -> Self {
        Self {
            store,
            id_field: DEFAULT_ID_FIELD.to_string(),
        }
    }

    /// Uses `id_field` instead of `"id"` to find a record's identifier.
    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    /// Returns the counter implied by the last record of `domain`.
    pub fn counter(&self, domain: &str, pattern: &SequencePattern) -> SequenceCounter {
        let records = self.records(domain);
        SequenceCounter {
            domain: domain.to_string(),
            last_value: self.last_value(&records, |id| pattern.parse(id)),
        }
    }

    /// Returns the identifier that follows the last record of `domain`.
    pub fn next_sequence(&self, domain: &str, pattern: &SequencePattern) -> String {
        self.next_sequence_with(domain, |id| pattern.parse(id), |value| pattern.format(value))
    }

    /// Generic form of [`SequenceGenerator::next_sequence`] with caller-supplied parse and format.
    ///
    /// An empty collection starts at 1. A last identifier that `parse` rejects counts as 0, so
    /// numbering restarts at 1 after corruption.
    pub fn next_sequence_with(
        &self,
        domain: &str,
        parse: impl Fn(&str) -> Option<u64>,
        formatter: impl Fn(u64) -> String,
    ) -> String {
        let records = self.records(domain);
        formatter(self.last_value(&records, parse).saturating_add(1))
    }

    /// Computes the next identifier, appends `build(id)` to the collection, and returns the id.
    ///
    /// The append goes through [`TypedStore::set`], so sequential calls in one context see each
    /// other's records at once. A record that fails to serialize is logged and not appended.
    pub fn append_next<T: Serialize>(
        &self,
        domain: &str,
        pattern: &SequencePattern,
        build: impl FnOnce(&str) -> T,
    ) -> String {
        let mut records = self.records(domain);
        let id = pattern.format(
            self.last_value(&records, |id| pattern.parse(id))
                .saturating_add(1),
        );
        match serde_json::to_value(build(&id)) {
            Ok(record) => {
                records.push(record);
                self.store.set(domain, &records);
            }
            Err(err) => {
                leptos::logging::warn!("sequence record `{id}` for `{domain}` not appended: {err}");
            }
        }
        id
    }

    fn records(&self, domain: &str) -> Vec<Value> {
        self.store.get(domain, Vec::new())
    }

    fn last_value(&self, records: &[Value], parse: impl Fn(&str) -> Option<u64>) -> u64 {
        let Some(last) = records.last() else {
            return 0;
        };
        let id = match last {
            Value::String(id) => Some(id.as_str()),
            Value::Object(fields) => fields.get(&self.id_field).and_then(Value::as_str),
            _ => None,
        };
        id.and_then(parse).unwrap_or(0)
    }
}
