//! Tunables for one persistence-layer context.

use serde::{Deserialize, Serialize};
use storefront_host::DurableFacility;
use thiserror::Error;

/// Write-coalescing window for [`crate::TypedStore::set`].
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;
/// Per-key notification throttle window for [`crate::ChangeBus::publish`].
pub const DEFAULT_THROTTLE_MS: u64 = 300;
/// Auto-release delay for [`crate::MutationGuard`] locks.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 300;
/// Lifetime of one-time codes held by [`crate::ExpiringStore`].
pub const DEFAULT_OTP_TTL_MS: u64 = 5 * 60 * 1_000;
/// Key prefix marking recreatable cache entries that eviction may delete.
pub const DEFAULT_EVICTABLE_PREFIX: &str = "cache.";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
/// Configuration parse and validation failures.
pub enum ConfigError {
    /// The TOML document could not be parsed into [`SyncConfig`].
    #[error("invalid sync config TOML: {0}")]
    Toml(String),
    /// The JSON document could not be parsed into [`SyncConfig`].
    #[error("invalid sync config JSON: {0}")]
    Json(String),
    /// A coalescing window was configured as zero.
    #[error("`{field}` must be greater than zero")]
    ZeroWindow {
        /// Offending field name.
        field: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// Timing windows and eviction policy for one context.
pub struct SyncConfig {
    /// Debounce window for persisted writes.
    pub debounce_ms: u64,
    /// Throttle window for change notifications.
    pub throttle_ms: u64,
    /// Default lock auto-release delay.
    pub lock_timeout_ms: u64,
    /// Default one-time-code lifetime.
    pub otp_ttl_ms: u64,
    /// Key prefixes whose entries are recreatable and may be evicted under quota pressure.
    pub evictable_prefixes: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            throttle_ms: DEFAULT_THROTTLE_MS,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            otp_ttl_ms: DEFAULT_OTP_TTL_MS,
            evictable_prefixes: vec![DEFAULT_EVICTABLE_PREFIX.to_string()],
        }
    }
}

impl SyncConfig {
    /// Parses and validates a TOML document. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|e| ConfigError::Toml(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON-encoded config stored under `key`, falling back to defaults.
    ///
    /// A missing key yields the defaults silently; unreadable or invalid documents are logged.
    pub fn load_from(facility: &dyn DurableFacility, key: &str) -> Self {
        let raw = match facility.read(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Self::default(),
            Err(err) => {
                leptos::logging::warn!("sync config `{key}` unreadable, using defaults: {err}");
                return Self::default();
            }
        };
        let parsed = serde_json::from_str::<Self>(&raw)
            .map_err(|e| ConfigError::Json(e.to_string()))
            .and_then(|config| config.validate().map(|()| config));
        match parsed {
            Ok(config) => config,
            Err(err) => {
                leptos::logging::warn!("sync config `{key}` rejected, using defaults: {err}");
                Self::default()
            }
        }
    }

    /// Checks that both coalescing windows are non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroWindow`] naming the first zero window.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_ms == 0 {
            return Err(ConfigError::ZeroWindow {
                field: "debounce_ms",
            });
        }
        if self.throttle_ms == 0 {
            return Err(ConfigError::ZeroWindow {
                field: "throttle_ms",
            });
        }
        Ok(())
    }

    /// Returns whether `key` falls under an evictable prefix.
    pub fn is_evictable_key(&self, key: &str) -> bool {
        self.evictable_prefixes
            .iter()
            .any(|prefix| key.starts_with(prefix.as_str()))
    }
}
