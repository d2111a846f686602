//! Event-loop scheduler backed by `window.setTimeout`.

use storefront_host::{Clock, Scheduler, SystemClock, TimerHandle};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::{closure::Closure, JsCast};

#[derive(Debug, Clone, Copy, Default)]
/// Scheduler running tasks as browser timeouts on the context's event loop.
///
/// Off-browser builds have no event loop to run on: tasks are dropped and handles are inert. Use
/// a [`storefront_host::ManualScheduler`] there instead.
pub struct BrowserScheduler;

impl Clock for BrowserScheduler {
    fn now_ms(&self) -> u64 {
        SystemClock.now_ms()
    }
}

impl Scheduler for BrowserScheduler {
    fn schedule(&self, delay_ms: u64, task: Box<dyn FnOnce()>) -> TimerHandle {
        #[cfg(target_arch = "wasm32")]
        {
            let Some(window) = web_sys::window() else {
                return TimerHandle::from_raw(0);
            };
            let callback = Closure::once_into_js(move || task());
            let delay = i32::try_from(delay_ms).unwrap_or(i32::MAX);
            let id = window
                .set_timeout_with_callback_and_timeout_and_arguments_0(
                    callback.unchecked_ref(),
                    delay,
                )
                .unwrap_or(0);
            TimerHandle::from_raw(u64::try_from(id).unwrap_or(0))
        }

        #[cfg(not(target_arch = "wasm32"))]
        {
            let _ = (delay_ms, task);
            TimerHandle::from_raw(0)
        }
    }

    fn cancel(&self, handle: TimerHandle) {
        #[cfg(target_arch = "wasm32")]
        {
            let (Some(window), Ok(id)) = (web_sys::window(), i32::try_from(handle.raw())) else {
                return;
            };
            if id > 0 {
                window.clear_timeout_with_handle(id);
            }
        }

        #[cfg(not(target_arch = "wasm32"))]
        let _ = handle;
    }
}
