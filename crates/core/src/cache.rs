// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded LRU map with per-key update timestamps.
//!
//! Backs the partial-output caches: the value itself plus a stamp a watcher
//! can compare to decide whether anything new arrived since its last poll.

use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;

struct Entry<V> {
    value: V,
    stamp_ms: u64,
}

/// LRU map of bounded capacity. Stamps are strictly monotonic per map even
/// when the caller's clock stands still, so two rapid puts never compare
/// equal.
pub struct LruCacheMap<K: Hash + Eq, V> {
    inner: LruCache<K, Entry<V>>,
    last_stamp: u64,
}

impl<K: Hash + Eq, V> LruCacheMap<K, V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { inner: LruCache::new(capacity), last_stamp: 0 }
    }

    /// Insert or replace, evicting the least-recently-used entry at
    /// capacity. `now_ms` comes from the caller's clock.
    pub fn put(&mut self, key: K, value: V, now_ms: u64) {
        let stamp_ms = now_ms.max(self.last_stamp + 1);
        self.last_stamp = stamp_ms;
        self.inner.put(key, Entry { value, stamp_ms });
    }

    /// Fetch a value, marking the key most-recently-used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.inner.get(key).map(|e| &e.value)
    }

    /// Stamp of the last `put` for this key, without touching recency.
    pub fn updated_at_ms(&self, key: &K) -> Option<u64> {
        self.inner.peek(key).map(|e| e.stamp_ms)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.pop(key).map(|e| e.value)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
