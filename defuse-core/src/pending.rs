//! Pending-request tracker: correlation key -> awaited value.
//!
//! Keys are issued locally and increase monotonically across `clear()`, so a late
//! response from before a reset never matches a newer request. A key is consumed at
//! most once; resolving an absent key is a stale response and yields `None`.

use std::collections::BTreeMap;

use tracing::warn;

/// Default bound on outstanding entries per tracker.
pub const DEFAULT_PENDING_CAPACITY: usize = 32;

#[derive(Debug)]
pub struct PendingRequests<V> {
    next_key: u32,
    entries: BTreeMap<u32, V>,
    capacity: usize,
}

impl<V> PendingRequests<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            next_key: 0,
            entries: BTreeMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Store `value` under the next key. When full, the oldest entry is evicted and returned.
    pub fn issue(&mut self, value: V) -> (u32, Option<(u32, V)>) {
        self.issue_with(|_| value)
    }

    /// Like `issue`, for values that embed their own key.
    pub fn issue_with<F: FnOnce(u32) -> V>(&mut self, make: F) -> (u32, Option<(u32, V)>) {
        let evicted = if self.entries.len() >= self.capacity {
            let oldest = self.entries.pop_first();
            if let Some((key, _)) = &oldest {
                warn!(key, capacity = self.capacity, "pending request evicted");
            }
            oldest
        } else {
            None
        };
        let key = self.next_key;
        self.next_key = self.next_key.wrapping_add(1);
        self.entries.insert(key, make(key));
        (key, evicted)
    }

    pub fn resolve(&mut self, key: u32) -> Option<V> {
        self.entries.remove(&key)
    }

    /// Earliest still-pending entry.
    pub fn earliest(&self) -> Option<(u32, &V)> {
        self.entries.first_key_value().map(|(k, v)| (*k, v))
    }

    /// Remove and return every entry in key order.
    pub fn take_all(&mut self) -> Vec<(u32, V)> {
        std::mem::take(&mut self.entries).into_iter().collect()
    }

    /// Drop every entry. The key sequence continues.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values()
    }
}

impl<V> Default for PendingRequests<V> {
    fn default() -> Self {
        Self::new(DEFAULT_PENDING_CAPACITY)
    }
}
