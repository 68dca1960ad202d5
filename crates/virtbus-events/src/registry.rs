//! Subscription registry
//!
//! Per-proxy bookkeeping of live subscriptions. The registry only stores
//! entries; it never talks to the bus and never runs callbacks, so its
//! lock is held for map operations only.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use virtbus_core::domain::{MatchRule, SubscriptionId};

/// One registered subscription
#[derive(Debug)]
pub struct Registered<T> {
    /// Bus rule acquired for this subscription
    pub rule: MatchRule,
    /// `interface.member` of the subscribed event
    pub event: String,
    /// Resources owned by the subscription
    pub handle: T,
}

/// Snapshot of one subscription, detached from the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionInfo {
    pub id: SubscriptionId,
    pub rule: MatchRule,
    pub event: String,
}

/// Concurrent map from [`SubscriptionId`] to subscription
pub struct Registry<T> {
    entries: Mutex<HashMap<SubscriptionId, Registered<T>>>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<SubscriptionId, Registered<T>>> {
        // Entries stay consistent even if a holder panicked: every
        // critical section is a single map operation.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores `entry` under a fresh id
    pub fn register(&self, entry: Registered<T>) -> SubscriptionId {
        let mut entries = self.entries();
        loop {
            let id = SubscriptionId::new();
            if let Entry::Vacant(slot) = entries.entry(id) {
                slot.insert(entry);
                return id;
            }
        }
    }

    /// Removes and returns the entry for `id`, if any
    pub fn unregister(&self, id: SubscriptionId) -> Option<Registered<T>> {
        if id.is_inert() {
            return None;
        }
        self.entries().remove(&id)
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.entries().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Copies out every entry's metadata
    pub fn snapshot(&self) -> Vec<SubscriptionInfo> {
        self.entries()
            .iter()
            .map(|(id, entry)| SubscriptionInfo {
                id: *id,
                rule: entry.rule.clone(),
                event: entry.event.clone(),
            })
            .collect()
    }

    /// Calls `f` for each entry of a snapshot; the lock is released first
    pub fn for_each(&self, mut f: impl FnMut(&SubscriptionInfo)) {
        for info in self.snapshot() {
            f(&info);
        }
    }

    /// Removes and returns every entry
    pub fn drain(&self) -> Vec<(SubscriptionId, Registered<T>)> {
        self.entries().drain().collect()
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("len", &self.len()).finish()
    }
}
