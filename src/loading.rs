//! Per-operation progress flags.
//!
//! Each [`OperationKey`] owns a boolean [`Signal`] that is `true` from dispatch
//! until the operation settles. A derived "any loading" signal is `true` while
//! at least one key is in flight.
//!
//! Flags are reference counted: concurrent operations sharing a key keep the
//! flag raised until the last one settles. Settlement is tied to dropping a
//! [`LoadingGuard`], so every exit path (success, error, panic, abandoned
//! future) clears the flag exactly once. A settled key's signal is dropped
//! once it has no subscribers, so per-id keys do not accumulate.

use crate::key::OperationKey;
use crate::signal::{Signal, Subscription};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Default)]
struct TrackerState {
    in_flight: HashMap<OperationKey, usize>,
    flags: HashMap<OperationKey, Arc<Signal<bool>>>,
}

impl TrackerState {
    fn flag(&mut self, key: &OperationKey) -> Arc<Signal<bool>> {
        Arc::clone(
            self.flags
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Signal::new(false))),
        )
    }

    /// Drop idle flags nobody is watching.
    fn prune_idle(&mut self) {
        let in_flight = &self.in_flight;
        self.flags
            .retain(|key, flag| in_flight.contains_key(key) || flag.subscriber_count() > 0);
    }
}

/// Tracks which operations are in flight.
pub struct LoadingTracker {
    state: Mutex<TrackerState>,
    any: Signal<bool>,
}

impl LoadingTracker {
    pub fn new() -> Self {
        LoadingTracker {
            state: Mutex::new(TrackerState::default()),
            any: Signal::new(false),
        }
    }

    /// Raise the flag for `key` and return the guard that lowers it.
    pub fn begin(self: &Arc<Self>, key: OperationKey) -> LoadingGuard {
        self.mark_started(&key);
        LoadingGuard {
            tracker: Arc::clone(self),
            key,
        }
    }

    fn mark_started(&self, key: &OperationKey) {
        let mut state = self.state.lock();
        let first = {
            let count = state.in_flight.entry(key.clone()).or_insert(0);
            *count += 1;
            *count == 1
        };
        if first {
            state.flag(key).set(true);
            trace!("Loading START {}", key);
        }
        if state.in_flight.len() == 1 {
            self.any.set(true);
        }
    }

    fn mark_settled(&self, key: &OperationKey) {
        let mut state = self.state.lock();
        let remaining = match state.in_flight.get_mut(key) {
            Some(count) => {
                *count -= 1;
                *count
            }
            None => {
                warn!("Loading flag for {} settled without being started", key);
                return;
            }
        };
        if remaining == 0 {
            state.in_flight.remove(key);
            let watched = state.flags.get(key).map(|flag| {
                flag.set(false);
                flag.subscriber_count() > 0
            });
            if watched == Some(false) {
                state.flags.remove(key);
            }
            trace!("Loading END {}", key);
        }
        if state.in_flight.is_empty() {
            self.any.set(false);
        }
    }

    /// Current flag for one key.
    pub fn is_loading(&self, key: &OperationKey) -> bool {
        self.state.lock().in_flight.contains_key(key)
    }

    /// Current value of the derived flag.
    pub fn any_loading(&self) -> bool {
        self.any.get()
    }

    /// Subscribe to one key's flag: current value first, then every flip.
    pub fn subscribe(&self, key: &OperationKey) -> Subscription<bool> {
        let mut state = self.state.lock();
        state.prune_idle();
        state.flag(key).subscribe()
    }

    /// Subscribe to the derived "any key in flight" flag.
    pub fn subscribe_any(&self) -> Subscription<bool> {
        self.any.subscribe()
    }

    /// Keys currently in flight, sorted.
    pub fn active_keys(&self) -> Vec<OperationKey> {
        let mut keys: Vec<OperationKey> = self.state.lock().in_flight.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for LoadingTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowers its operation's flag when dropped.
pub struct LoadingGuard {
    tracker: Arc<LoadingTracker>,
    key: OperationKey,
}

impl LoadingGuard {
    pub fn key(&self) -> &OperationKey {
        &self.key
    }
}

impl fmt::Debug for LoadingGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingGuard").field("key", &self.key).finish()
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.tracker.mark_settled(&self.key);
    }
}
