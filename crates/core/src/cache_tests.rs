// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::ids::Qid;

#[test]
fn put_and_get() {
    let mut cache: LruCacheMap<Qid, i32> = LruCacheMap::new(3);
    cache.put(Qid::new("a"), 1, 100);
    assert_eq!(cache.get(&Qid::new("a")), Some(&1));
    assert_eq!(cache.get(&Qid::new("b")), None);
}

#[test]
fn capacity_evicts_least_recently_used() {
    let mut cache: LruCacheMap<Qid, i32> = LruCacheMap::new(3);
    cache.put(Qid::new("a"), 1, 100);
    cache.put(Qid::new("b"), 2, 101);
    cache.put(Qid::new("c"), 3, 102);
    // Touch "a" so "b" becomes the eviction candidate.
    cache.get(&Qid::new("a"));
    cache.put(Qid::new("d"), 4, 103);
    assert_eq!(cache.get(&Qid::new("b")), None);
    assert_eq!(cache.get(&Qid::new("a")), Some(&1));
    assert_eq!(cache.len(), 3);
}

#[test]
fn stamps_are_monotonic_even_with_a_stuck_clock() {
    let mut cache: LruCacheMap<Qid, i32> = LruCacheMap::new(3);
    cache.put(Qid::new("a"), 1, 500);
    cache.put(Qid::new("a"), 2, 500);
    let first = cache.updated_at_ms(&Qid::new("a")).unwrap();
    cache.put(Qid::new("a"), 3, 500);
    let second = cache.updated_at_ms(&Qid::new("a")).unwrap();
    assert!(second > first);
}

#[test]
fn updated_at_does_not_disturb_recency() {
    let mut cache: LruCacheMap<Qid, i32> = LruCacheMap::new(2);
    cache.put(Qid::new("a"), 1, 100);
    cache.put(Qid::new("b"), 2, 101);
    // Peeking "a" must not protect it from eviction.
    cache.updated_at_ms(&Qid::new("a"));
    cache.put(Qid::new("c"), 3, 102);
    assert_eq!(cache.get(&Qid::new("a")), None);
}

#[test]
fn remove_returns_the_value() {
    let mut cache: LruCacheMap<Qid, i32> = LruCacheMap::new(3);
    cache.put(Qid::new("a"), 1, 100);
    assert_eq!(cache.remove(&Qid::new("a")), Some(1));
    assert!(cache.is_empty());
}
