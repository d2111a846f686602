//! Single-flight guard collapsing duplicate in-flight mutations within one context.
//!
//! Every acquired lock is released automatically once its timeout elapses; the release cannot be
//! cancelled. The guard is local to one context and gives no mutual exclusion across contexts.

use std::{
    cell::RefCell,
    collections::HashMap,
    rc::{Rc, Weak},
};

use storefront_host::Scheduler;

#[derive(Debug, Clone, PartialEq, Eq)]
/// A live lock on one key.
pub struct MutationLock {
    /// Guarded key.
    pub key: String,
    /// Opaque identity of this acquisition.
    pub token: u64,
    /// When the lock was taken.
    pub acquired_at_ms: u64,
    /// How long the lock lives before auto-release.
    pub timeout_ms: u64,
}

impl MutationLock {
    fn has_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.acquired_at_ms.saturating_add(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Proof of acquisition, used to release a lock early.
pub struct LockToken {
    key: String,
    token: u64,
}

impl LockToken {
    /// Returns the locked key.
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[derive(Default)]
struct GuardState {
    locks: HashMap<String, MutationLock>,
    next_token: u64,
}

/// Per-key single-flight lock table for one context.
pub struct MutationGuard {
    scheduler: Rc<dyn Scheduler>,
    default_timeout_ms: u64,
    state: Rc<RefCell<GuardState>>,
}

impl MutationGuard {
    /// Creates a guard whose locks default to `default_timeout_ms`.
    pub fn new(scheduler: Rc<dyn Scheduler>, default_timeout_ms: u64) -> Self {
        Self {
            scheduler,
            default_timeout_ms,
            state: Rc::new(RefCell::new(GuardState::default())),
        }
    }

    /// Takes the lock for `key` unless a live lock already holds it.
    ///
    /// The lock is released after `timeout_ms`, or earlier through [`MutationGuard::release`].
    pub fn acquire(&self, key: &str, timeout_ms: u64) -> Option<LockToken> {
        let now = self.scheduler.now_ms();
        let token = {
            let mut state = self.state.borrow_mut();
            if state
                .locks
                .get(key)
                .is_some_and(|lock| !lock.has_expired(now))
            {
                return None;
            }
            state.next_token += 1;
            let token = state.next_token;
            state.locks.insert(
                key.to_string(),
                MutationLock {
                    key: key.to_string(),
                    token,
                    acquired_at_ms: now,
                    timeout_ms,
                },
            );
            token
        };

        let weak: Weak<RefCell<GuardState>> = Rc::downgrade(&self.state);
        let release_key = key.to_string();
        self.scheduler.schedule(
            timeout_ms,
            Box::new(move || {
                if let Some(state) = weak.upgrade() {
                    release_matching(&mut state.borrow_mut(), &release_key, token);
                }
            }),
        );

        Some(LockToken {
            key: key.to_string(),
            token,
        })
    }

    /// Releases the lock identified by `token`. Returns `false` if it was already released.
    pub fn release(&self, token: &LockToken) -> bool {
        release_matching(&mut self.state.borrow_mut(), &token.key, token.token)
    }

    /// Runs `mutation` if the lock for `key` is free, then holds the lock until it times out.
    ///
    /// Returns `false` without running `mutation` when the lock is busy; there is no queueing.
    /// `timeout_ms` defaults to the guard's configured timeout.
    pub fn with_lock<F: FnOnce()>(&self, key: &str, timeout_ms: Option<u64>, mutation: F) -> bool {
        let timeout_ms = timeout_ms.unwrap_or(self.default_timeout_ms);
        if self.acquire(key, timeout_ms).is_none() {
            leptos::logging::debug_warn!("mutation `{key}` rejected, lock busy");
            return false;
        }
        mutation();
        true
    }

    /// Returns whether a live lock holds `key`.
    pub fn is_locked(&self, key: &str) -> bool {
        self.lock(key).is_some()
    }

    /// Returns the live lock on `key`, if any.
    pub fn lock(&self, key: &str) -> Option<MutationLock> {
        let now = self.scheduler.now_ms();
        self.state
            .borrow()
            .locks
            .get(key)
            .filter(|lock| !lock.has_expired(now))
            .cloned()
    }
}

fn release_matching(state: &mut GuardState, key: &str, token: u64) -> bool {
    if state.locks.get(key).is_some_and(|lock| lock.token == token) {
        state.locks.remove(key);
        true
    } else {
        false
    }
}
