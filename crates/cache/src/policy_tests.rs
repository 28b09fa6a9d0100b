// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn meta(created_at: u64, accessed_at: u64, access_count: u64, ttl_ms: u64) -> EntryMeta {
    EntryMeta { ttl_ms, created_at, accessed_at, access_count, size: 1 }
}

fn pick(policy: EvictionPolicy, now: u64, entries: &[(&str, EntryMeta)]) -> Option<String> {
    policy.select_victim(now, entries.iter().map(|(k, m)| (*k, m)))
}

#[test]
fn lru_picks_oldest_access() {
    let entries = [
        ("a", meta(0, 300, 9, 0)),
        ("b", meta(0, 100, 9, 0)),
        ("c", meta(0, 200, 9, 0)),
    ];
    assert_eq!(pick(EvictionPolicy::Lru, 1_000, &entries), Some("b".into()));
}

#[test]
fn lfu_picks_lowest_count_then_oldest_access() {
    let entries = [
        ("a", meta(0, 300, 2, 0)),
        ("b", meta(0, 100, 5, 0)),
        ("c", meta(0, 200, 2, 0)),
    ];
    // a and c tie on count; c has the older accessed_at.
    assert_eq!(pick(EvictionPolicy::Lfu, 1_000, &entries), Some("c".into()));
}

#[test]
fn fifo_picks_oldest_created() {
    let entries = [
        ("a", meta(50, 999, 9, 0)),
        ("b", meta(10, 999, 9, 0)),
        ("c", meta(30, 999, 9, 0)),
    ];
    assert_eq!(pick(EvictionPolicy::Fifo, 1_000, &entries), Some("b".into()));
}

#[test]
fn ttl_picks_soonest_expiry_and_skips_unexpiring() {
    let entries = [
        ("eternal", meta(0, 0, 0, 0)),
        ("soon", meta(100, 0, 0, 50)),
        ("later", meta(100, 0, 0, 500)),
    ];
    assert_eq!(pick(EvictionPolicy::Ttl, 1_000, &entries), Some("soon".into()));
}

#[test]
fn ttl_returns_none_when_nothing_expires() {
    let entries = [("a", meta(0, 0, 0, 0)), ("b", meta(0, 0, 0, 0))];
    assert_eq!(pick(EvictionPolicy::Ttl, 1_000, &entries), None);
}

#[test]
fn adaptive_prefers_cold_old_entries() {
    // "hot" is young with many hits, "cold" is old with few.
    let entries = [
        ("hot", meta(900, 990, 50, 0)),
        ("cold", meta(100, 150, 2, 0)),
    ];
    assert_eq!(pick(EvictionPolicy::Adaptive, 1_000, &entries), Some("cold".into()));
}

#[test]
fn adaptive_is_deterministic_on_ties() {
    // Identical metadata: key order decides.
    let entries = [("b", meta(100, 100, 1, 0)), ("a", meta(100, 100, 1, 0))];
    assert_eq!(pick(EvictionPolicy::Adaptive, 1_000, &entries), Some("a".into()));
}

#[test]
fn empty_input_selects_nothing() {
    assert_eq!(pick(EvictionPolicy::Lru, 0, &[]), None);
}

#[parameterized(
    lru = { "LRU", EvictionPolicy::Lru },
    lfu = { "lfu", EvictionPolicy::Lfu },
    fifo = { "FIFO", EvictionPolicy::Fifo },
    ttl = { "ttl", EvictionPolicy::Ttl },
    adaptive = { "Adaptive", EvictionPolicy::Adaptive },
)]
fn parses_config_values(input: &str, expected: EvictionPolicy) {
    assert_eq!(EvictionPolicy::parse(input).unwrap(), expected);
}

#[test]
fn parse_rejects_unknown() {
    assert!(EvictionPolicy::parse("random").is_err());
}
