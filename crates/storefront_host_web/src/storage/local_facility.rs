//! `localStorage`-backed durable facility.
//!
//! The browser API is synchronous, so the adapter maps each call one to one. Off-browser builds
//! report the facility as unavailable.

use storefront_host::{DurableFacility, FacilityError};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::{JsCast, JsValue};

#[derive(Debug, Clone, Copy, Default)]
/// Durable facility backed by `window.localStorage`.
pub struct WebLocalFacility;

#[cfg(target_arch = "wasm32")]
fn local_storage() -> Result<web_sys::Storage, FacilityError> {
    web_sys::window()
        .and_then(|w| w.local_storage().ok().flatten())
        .ok_or_else(|| FacilityError::Unavailable("localStorage unavailable".to_string()))
}

#[cfg(target_arch = "wasm32")]
fn is_quota_error(err: &JsValue) -> bool {
    err.dyn_ref::<web_sys::DomException>()
        .is_some_and(|e| e.name() == "QuotaExceededError" || e.code() == 22)
}

impl DurableFacility for WebLocalFacility {
    fn read(&self, key: &str) -> Result<Option<String>, FacilityError> {
        #[cfg(target_arch = "wasm32")]
        {
            local_storage()?
                .get_item(key)
                .map_err(|e| FacilityError::Backend(format!("localStorage get_item failed: {e:?}")))
        }

        #[cfg(not(target_arch = "wasm32"))]
        {
            let _ = key;
            Err(unavailable())
        }
    }

    fn write(&self, key: &str, raw: &str) -> Result<(), FacilityError> {
        #[cfg(target_arch = "wasm32")]
        {
            local_storage()?.set_item(key, raw).map_err(|e| {
                if is_quota_error(&e) {
                    FacilityError::CapacityExceeded {
                        key: key.to_string(),
                        needed_bytes: key.len() + raw.len(),
                        capacity_bytes: 0,
                    }
                } else {
                    FacilityError::Backend(format!("localStorage set_item failed: {e:?}"))
                }
            })
        }

        #[cfg(not(target_arch = "wasm32"))]
        {
            let _ = (key, raw);
            Err(unavailable())
        }
    }

    fn delete(&self, key: &str) -> Result<(), FacilityError> {
        #[cfg(target_arch = "wasm32")]
        {
            local_storage()?
                .remove_item(key)
                .map_err(|e| FacilityError::Backend(format!("localStorage remove_item failed: {e:?}")))
        }

        #[cfg(not(target_arch = "wasm32"))]
        {
            let _ = key;
            Err(unavailable())
        }
    }

    fn keys(&self) -> Result<Vec<String>, FacilityError> {
        #[cfg(target_arch = "wasm32")]
        {
            let storage = local_storage()?;
            let len = storage
                .length()
                .map_err(|e| FacilityError::Backend(format!("localStorage length failed: {e:?}")))?;
            let mut keys = (0..len)
                .filter_map(|index| storage.key(index).ok().flatten())
                .collect::<Vec<_>>();
            keys.sort();
            Ok(keys)
        }

        #[cfg(not(target_arch = "wasm32"))]
        {
            Err(unavailable())
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn unavailable() -> FacilityError {
    FacilityError::Unavailable("localStorage requires a browser host".to_string())
}
