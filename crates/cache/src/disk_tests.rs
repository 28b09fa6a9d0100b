// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn meta(ttl_ms: u64, size: u64, now_ms: u64) -> EntryMeta {
    EntryMeta::new(ttl_ms, size, now_ms)
}

fn open(dir: &Path) -> DiskCache {
    DiskCache::open(dir, 1024, 100).unwrap()
}

#[test]
fn insert_writes_md5_named_file() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = open(tmp.path());
    cache.insert("k1", b"hello", meta(0, 5, 100), 100, EvictionPolicy::Lru).unwrap();

    // md5("k1")
    let expected = tmp.path().join("b637b17af08aced8850c18cccde915da.cache");
    assert!(expected.is_file());
    assert_eq!(fs::read(expected).unwrap(), b"hello");
}

#[test]
fn get_returns_value_and_touches_meta() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = open(tmp.path());
    cache.insert("k", b"v", meta(0, 1, 100), 100, EvictionPolicy::Lru).unwrap();

    match cache.get("k", 200).unwrap() {
        L2Lookup::Hit { value, meta } => {
            assert_eq!(value, b"v");
            assert_eq!(meta.access_count, 1);
            assert_eq!(meta.accessed_at, 200);
        }
        _ => panic!("expected hit"),
    }
}

#[test]
fn expired_get_deletes_file_and_entry() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = open(tmp.path());
    cache.insert("k", b"v", meta(50, 1, 100), 100, EvictionPolicy::Lru).unwrap();

    assert!(matches!(cache.get("k", 500).unwrap(), L2Lookup::Expired));
    assert!(!cache.contains("k"));
    assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[test]
fn corrupted_file_is_dropped_on_get() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = open(tmp.path());
    cache.insert("k", b"payload", meta(0, 7, 0), 0, EvictionPolicy::Lru).unwrap();

    // Flip bytes behind the cache's back; checksum verification rejects it.
    let file = fs::read_dir(tmp.path()).unwrap().next().unwrap().unwrap().path();
    fs::write(&file, b"garbage").unwrap();

    assert!(matches!(cache.get("k", 10).unwrap(), L2Lookup::Miss));
    assert!(!cache.contains("k"));
}

#[test]
fn flush_and_reopen_restores_index() {
    let tmp = tempfile::tempdir().unwrap();
    {
        let cache = open(tmp.path());
        cache.insert("a", b"aa", meta(0, 2, 100), 100, EvictionPolicy::Lru).unwrap();
        cache.insert("b", b"bbb", meta(0, 3, 200), 200, EvictionPolicy::Lru).unwrap();
        cache.flush().unwrap();
    }

    let reopened = open(tmp.path());
    assert_eq!(reopened.len(), 2);
    assert_eq!(reopened.current_bytes(), 5);
    match reopened.get("b", 300).unwrap() {
        L2Lookup::Hit { value, .. } => assert_eq!(value, b"bbb"),
        _ => panic!("expected hit after reopen"),
    }
}

#[test]
fn reopen_drops_index_entries_with_missing_files() {
    let tmp = tempfile::tempdir().unwrap();
    {
        let cache = open(tmp.path());
        cache.insert("keep", b"k", meta(0, 1, 0), 0, EvictionPolicy::Lru).unwrap();
        cache.insert("lost", b"l", meta(0, 1, 0), 0, EvictionPolicy::Lru).unwrap();
        cache.flush().unwrap();

        // Delete one backing file out from under the index.
        fs::remove_file(tmp.path().join(super::file_name_for("lost"))).unwrap();
    }

    let reopened = open(tmp.path());
    assert!(reopened.contains("keep"));
    assert!(!reopened.contains("lost"));
    assert_eq!(reopened.current_bytes(), 1);
}

#[test]
fn reopen_removes_orphan_files() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("deadbeef.cache"), b"orphan").unwrap();

    let cache = open(tmp.path());
    assert!(cache.is_empty());
    assert!(!tmp.path().join("deadbeef.cache").exists());
}

#[test]
fn byte_cap_evicts_per_policy() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = DiskCache::open(tmp.path(), 10, 100).unwrap();
    cache.insert("a", b"aaaa", meta(0, 4, 10), 10, EvictionPolicy::Lru).unwrap();
    cache.insert("b", b"bbbb", meta(0, 4, 20), 20, EvictionPolicy::Lru).unwrap();

    let evicted = cache.insert("c", b"ccccc", meta(0, 5, 30), 30, EvictionPolicy::Lru).unwrap();
    assert_eq!(evicted, 1);
    assert!(!cache.contains("a"));
    assert!(cache.contains("b"));
    assert!(cache.contains("c"));
    assert!(cache.current_bytes() <= 10);
}

#[test]
fn remove_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = open(tmp.path());
    cache.insert("k", b"v", meta(0, 1, 0), 0, EvictionPolicy::Lru).unwrap();

    assert!(cache.remove("k").unwrap());
    assert!(!cache.remove("k").unwrap());
}

#[test]
fn clear_removes_files_and_entries() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = open(tmp.path());
    cache.insert("a", b"a", meta(0, 1, 0), 0, EvictionPolicy::Lru).unwrap();
    cache.insert("b", b"b", meta(0, 1, 0), 0, EvictionPolicy::Lru).unwrap();

    cache.clear().unwrap();
    assert!(cache.is_empty());
    assert_eq!(cache.current_bytes(), 0);
    let remaining = fs::read_dir(tmp.path())
        .unwrap()
        .filter(|e| {
            e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".cache")
        })
        .count();
    assert_eq!(remaining, 0);
}

#[test]
fn sweep_expired_removes_stale_entries() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = open(tmp.path());
    cache.insert("old", b"o", meta(100, 1, 0), 0, EvictionPolicy::Lru).unwrap();
    cache.insert("eternal", b"e", meta(0, 1, 0), 0, EvictionPolicy::Lru).unwrap();

    assert_eq!(cache.sweep_expired(5_000), 1);
    assert!(!cache.contains("old"));
    assert!(cache.contains("eternal"));
}
