//! Error types reported by durable facility implementations.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
/// Failures surfaced by a [`crate::DurableFacility`] operation.
pub enum FacilityError {
    /// The host facility is not reachable (missing window, storage disabled, private mode).
    #[error("durable facility unavailable: {0}")]
    Unavailable(String),
    /// The write would exceed the host quota.
    #[error("durable facility capacity exceeded writing `{key}` ({needed_bytes} bytes needed, capacity {capacity_bytes})")]
    CapacityExceeded {
        /// Key whose write was rejected.
        key: String,
        /// Bytes the facility would hold after the write.
        needed_bytes: usize,
        /// Configured capacity, `0` when the host does not report one.
        capacity_bytes: usize,
    },
    /// Any other backend rejection.
    #[error("durable facility backend error: {0}")]
    Backend(String),
}

impl FacilityError {
    /// Returns whether this error reports a quota rejection.
    pub const fn is_capacity_exceeded(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }
}
