// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Eviction policies and victim selection.
//!
//! Selection is a pure function over entry metadata so both cache levels
//! share it. The policy answers "which entry goes next?"; the levels decide
//! when eviction is needed and how many victims to take.

use crate::entry::EntryMeta;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Oldest `accessed_at` first.
    #[default]
    Lru,
    /// Lowest `access_count` first; ties broken by oldest `accessed_at`.
    Lfu,
    /// Oldest `created_at` first.
    Fifo,
    /// Soonest `created_at + ttl` first; entries without TTL are never
    /// chosen, so a full cache of unexpiring entries refuses the insert.
    Ttl,
    /// Frequency-aged LRU: the victim minimizes `access_count / age`,
    /// preferring rarely-used old entries over frequently-used ones of the
    /// same age. Ties broken by oldest `accessed_at`, then key order, so
    /// selection is deterministic given the same metadata.
    Adaptive,
}

impl EvictionPolicy {
    /// Pick the victim among `entries`. Returns `None` when the policy has
    /// no eligible candidate (TTL policy over unexpiring entries, or an
    /// empty iterator).
    pub fn select_victim<'a>(
        &self,
        now_ms: u64,
        entries: impl Iterator<Item = (&'a str, &'a EntryMeta)>,
    ) -> Option<String> {
        let mut best: Option<(&str, &EntryMeta)> = None;
        for (key, meta) in entries {
            if *self == EvictionPolicy::Ttl && meta.expires_at().is_none() {
                continue;
            }
            best = Some(match best {
                None => (key, meta),
                Some(current) => {
                    if self.prefers(now_ms, (key, meta), current) {
                        (key, meta)
                    } else {
                        current
                    }
                }
            });
        }
        best.map(|(key, _)| key.to_string())
    }

    /// Whether `a` is a better victim than `b`.
    fn prefers(&self, now_ms: u64, a: (&str, &EntryMeta), b: (&str, &EntryMeta)) -> bool {
        let (a_key, a_meta) = a;
        let (b_key, b_meta) = b;
        let ordering = match self {
            EvictionPolicy::Lru => a_meta.accessed_at.cmp(&b_meta.accessed_at),
            EvictionPolicy::Lfu => a_meta
                .access_count
                .cmp(&b_meta.access_count)
                .then(a_meta.accessed_at.cmp(&b_meta.accessed_at)),
            EvictionPolicy::Fifo => a_meta.created_at.cmp(&b_meta.created_at),
            EvictionPolicy::Ttl => a_meta
                .expires_at()
                .unwrap_or(u64::MAX)
                .cmp(&b_meta.expires_at().unwrap_or(u64::MAX)),
            EvictionPolicy::Adaptive => {
                // Compare access_count/age as cross products to stay in
                // integer arithmetic: a is colder than b iff
                // a.count * b.age < b.count * a.age.
                let a_age = now_ms.saturating_sub(a_meta.created_at).max(1) as u128;
                let b_age = now_ms.saturating_sub(b_meta.created_at).max(1) as u128;
                let a_heat = a_meta.access_count as u128 * b_age;
                let b_heat = b_meta.access_count as u128 * a_age;
                a_heat.cmp(&b_heat).then(a_meta.accessed_at.cmp(&b_meta.accessed_at))
            }
        };
        ordering.then(a_key.cmp(b_key)).is_lt()
    }

    /// Parse a configuration value like "LRU" or "adaptive".
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionPolicy::Lru),
            "lfu" => Ok(EvictionPolicy::Lfu),
            "fifo" => Ok(EvictionPolicy::Fifo),
            "ttl" => Ok(EvictionPolicy::Ttl),
            "adaptive" => Ok(EvictionPolicy::Adaptive),
            other => Err(format!("unknown eviction policy: {}", other)),
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EvictionPolicy::Lru => "lru",
            EvictionPolicy::Lfu => "lfu",
            EvictionPolicy::Fifo => "fifo",
            EvictionPolicy::Ttl => "ttl",
            EvictionPolicy::Adaptive => "adaptive",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
