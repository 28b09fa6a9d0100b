// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn entry(bytes: usize, ttl_ms: u64, now_ms: u64) -> CacheEntry {
    CacheEntry::new(vec![7u8; bytes], ttl_ms, now_ms)
}

fn value(cache: &MemoryCache, key: &str, now_ms: u64) -> Option<Vec<u8>> {
    match cache.get(key, now_ms) {
        L1Lookup::Hit(v) => Some(v.to_vec()),
        _ => None,
    }
}

#[test]
fn insert_then_get() {
    let cache = MemoryCache::new(1024, 10);
    cache.insert("k", entry(3, 0, 100), 100, EvictionPolicy::Lru).unwrap();
    assert_eq!(value(&cache, "k", 200), Some(vec![7, 7, 7]));
    assert_eq!(cache.current_bytes(), 3);
}

#[test]
fn get_miss() {
    let cache = MemoryCache::new(1024, 10);
    assert!(matches!(cache.get("absent", 0), L1Lookup::Miss));
}

#[test]
fn expired_get_removes_the_entry() {
    let cache = MemoryCache::new(1024, 10);
    cache.insert("k", entry(3, 50, 100), 100, EvictionPolicy::Lru).unwrap();

    assert!(matches!(cache.get("k", 200), L1Lookup::Expired));
    assert!(!cache.contains("k"));
    assert_eq!(cache.current_bytes(), 0);
}

#[test]
fn replace_frees_old_bytes() {
    let cache = MemoryCache::new(10, 10);
    cache.insert("k", entry(8, 0, 0), 0, EvictionPolicy::Lru).unwrap();
    cache.insert("k", entry(6, 0, 1), 1, EvictionPolicy::Lru).unwrap();
    assert_eq!(cache.current_bytes(), 6);
    assert_eq!(cache.len(), 1);
}

#[test]
fn entry_cap_evicts_lru_victim() {
    let cache = MemoryCache::new(1024, 3);
    cache.insert("a", entry(1, 0, 10), 10, EvictionPolicy::Lru).unwrap();
    cache.insert("b", entry(1, 0, 20), 20, EvictionPolicy::Lru).unwrap();
    cache.insert("c", entry(1, 0, 30), 30, EvictionPolicy::Lru).unwrap();

    // Touch a so b is the LRU victim.
    assert!(matches!(cache.get("a", 40), L1Lookup::Hit(_)));

    let evicted = cache.insert("d", entry(1, 0, 50), 50, EvictionPolicy::Lru).unwrap();
    assert_eq!(evicted.len(), 1);
    assert_eq!(evicted[0].0, "b");
    assert!(cache.contains("a"));
    assert!(cache.contains("c"));
    assert!(cache.contains("d"));
}

#[test]
fn byte_cap_evicts_until_it_fits() {
    let cache = MemoryCache::new(10, 100);
    cache.insert("a", entry(4, 0, 10), 10, EvictionPolicy::Fifo).unwrap();
    cache.insert("b", entry(4, 0, 20), 20, EvictionPolicy::Fifo).unwrap();

    // 8 bytes held; inserting 7 must evict both FIFO victims.
    let evicted = cache.insert("c", entry(7, 0, 30), 30, EvictionPolicy::Fifo).unwrap();
    let keys: Vec<&str> = evicted.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["a", "b"]);
    assert_eq!(cache.current_bytes(), 7);
}

#[test]
fn oversized_value_is_refused() {
    let cache = MemoryCache::new(10, 100);
    let err = cache.insert("big", entry(11, 0, 0), 0, EvictionPolicy::Lru).unwrap_err();
    assert!(matches!(err, CacheError::ValueTooLarge { size: 11, max: 10 }));
    assert!(cache.is_empty());
}

#[test]
fn ttl_policy_with_no_victim_refuses_insert() {
    let cache = MemoryCache::new(1024, 1);
    cache.insert("eternal", entry(1, 0, 0), 0, EvictionPolicy::Ttl).unwrap();

    let err = cache.insert("next", entry(1, 0, 1), 1, EvictionPolicy::Ttl).unwrap_err();
    assert!(matches!(err, CacheError::NoVictim { .. }));
    assert!(cache.contains("eternal"));
}

#[test]
fn remove_is_idempotent() {
    let cache = MemoryCache::new(1024, 10);
    cache.insert("k", entry(2, 0, 0), 0, EvictionPolicy::Lru).unwrap();
    assert!(cache.remove("k"));
    assert!(!cache.remove("k"));
    assert_eq!(cache.current_bytes(), 0);
}

#[test]
fn sweep_removes_only_expired() {
    let cache = MemoryCache::new(1024, 10);
    cache.insert("old", entry(1, 100, 0), 0, EvictionPolicy::Lru).unwrap();
    cache.insert("eternal", entry(1, 0, 0), 0, EvictionPolicy::Lru).unwrap();
    cache.insert("fresh", entry(1, 10_000, 0), 0, EvictionPolicy::Lru).unwrap();

    assert_eq!(cache.sweep_expired(500), 1);
    assert!(!cache.contains("old"));
    assert!(cache.contains("eternal"));
    assert!(cache.contains("fresh"));
}

#[test]
fn clear_resets_accounting() {
    let cache = MemoryCache::new(1024, 10);
    cache.insert("a", entry(5, 0, 0), 0, EvictionPolicy::Lru).unwrap();
    cache.clear();
    assert!(cache.is_empty());
    assert_eq!(cache.current_bytes(), 0);
}
