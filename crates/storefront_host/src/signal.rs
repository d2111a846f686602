//! Cross-context change notification contract.
//!
//! A host raises a [`StorageNotice`] in every *other* context that shares the durable facility
//! whenever one context writes or deletes a key, the way the browser `storage` event behaves.

use std::{fmt, rc::Rc};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Notification that another context changed a key in the shared facility.
pub struct StorageNotice {
    /// Key that changed.
    pub key: String,
    /// Raw value after the change, `None` when the key was removed.
    pub new_raw: Option<String>,
}

/// Callback invoked for each external-write notice.
pub type NoticeHandler = Rc<dyn Fn(&StorageNotice)>;

/// Host signal that fires when another context writes to the shared facility.
pub trait PlatformChangeSignal {
    /// Registers `handler` for external-write notices.
    ///
    /// The handler stays registered until the returned subscription is cancelled.
    fn on_external_write(&self, handler: NoticeHandler) -> SignalSubscription;
}

/// Registration handle returned by [`PlatformChangeSignal::on_external_write`].
///
/// Dropping the handle leaves the handler registered; call [`SignalSubscription::cancel`] to
/// detach it.
pub struct SignalSubscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl SignalSubscription {
    /// Creates a subscription that runs `cancel` when detached.
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Creates a subscription with nothing to detach.
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    /// Detaches the handler from the signal source.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for SignalSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalSubscription")
            .field("attached", &self.cancel.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default)]
/// Signal source that never fires, for single-context hosts and baseline tests.
pub struct NoopSignal;

impl PlatformChangeSignal for NoopSignal {
    fn on_external_write(&self, _handler: NoticeHandler) -> SignalSubscription {
        SignalSubscription::detached()
    }
}
