//! Cross-context change signal backed by the window `storage` event.
//!
//! Browsers fire `storage` only in documents other than the one that wrote, which is exactly the
//! [`PlatformChangeSignal`] contract.

use storefront_host::{NoticeHandler, PlatformChangeSignal, SignalSubscription};

#[cfg(target_arch = "wasm32")]
use storefront_host::StorageNotice;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::{closure::Closure, JsCast};

#[derive(Debug, Clone, Copy, Default)]
/// Signal listening for `storage` events on `window`.
pub struct WebStorageSignal;

impl PlatformChangeSignal for WebStorageSignal {
    fn on_external_write(&self, handler: NoticeHandler) -> SignalSubscription {
        #[cfg(target_arch = "wasm32")]
        {
            let Some(window) = web_sys::window() else {
                return SignalSubscription::detached();
            };
            let listener = Closure::<dyn FnMut(web_sys::StorageEvent)>::wrap(Box::new(
                move |event: web_sys::StorageEvent| {
                    // `key` is null when another document called `localStorage.clear()`.
                    let Some(key) = event.key() else {
                        return;
                    };
                    handler(&StorageNotice {
                        key,
                        new_raw: event.new_value(),
                    });
                },
            ));
            if window
                .add_event_listener_with_callback("storage", listener.as_ref().unchecked_ref())
                .is_err()
            {
                return SignalSubscription::detached();
            }
            SignalSubscription::new(move || {
                let _ = window.remove_event_listener_with_callback(
                    "storage",
                    listener.as_ref().unchecked_ref(),
                );
                drop(listener);
            })
        }

        #[cfg(not(target_arch = "wasm32"))]
        {
            let _ = handler;
            SignalSubscription::detached()
        }
    }
}
