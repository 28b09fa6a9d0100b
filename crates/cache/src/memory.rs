// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! L1: in-process byte cache with byte and entry caps.
//!
//! Pure with respect to time and policy — both arrive as arguments so the
//! two-tier façade owns the clock and the runtime-switchable policy.

use crate::entry::CacheEntry;
use crate::policy::EvictionPolicy;
use crate::CacheError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub struct MemoryCache {
    max_bytes: u64,
    max_entries: usize,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    map: HashMap<String, CacheEntry>,
    current_bytes: u64,
}

impl MemoryCache {
    pub fn new(max_bytes: u64, max_entries: usize) -> Self {
        Self { max_bytes, max_entries, inner: Mutex::new(Inner::default()) }
    }

    /// Look up a key. Hits touch access metadata; expired entries are
    /// removed and reported as `None`.
    pub fn get(&self, key: &str, now_ms: u64) -> L1Lookup {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.map.get_mut(key) else {
            return L1Lookup::Miss;
        };
        if entry.meta.is_expired(now_ms) {
            let size = entry.meta.size;
            inner.map.remove(key);
            inner.current_bytes -= size;
            return L1Lookup::Expired;
        }
        entry.meta.touch(now_ms);
        L1Lookup::Hit(Arc::clone(&entry.value))
    }

    /// Insert a fresh entry, evicting per `policy` until it fits.
    ///
    /// Returns the evicted entries so the caller can demote them to L2.
    pub fn insert(
        &self,
        key: &str,
        entry: CacheEntry,
        now_ms: u64,
        policy: EvictionPolicy,
    ) -> Result<Vec<(String, CacheEntry)>, CacheError> {
        if entry.meta.size > self.max_bytes {
            return Err(CacheError::ValueTooLarge { size: entry.meta.size, max: self.max_bytes });
        }

        let mut inner = self.inner.lock();

        // Replacing an existing entry frees its bytes first.
        if let Some(old) = inner.map.remove(key) {
            inner.current_bytes -= old.meta.size;
        }

        let mut evicted = Vec::new();
        while inner.current_bytes + entry.meta.size > self.max_bytes
            || inner.map.len() + 1 > self.max_entries
        {
            let victim = policy
                .select_victim(now_ms, inner.map.iter().map(|(k, e)| (k.as_str(), &e.meta)))
                .ok_or(CacheError::NoVictim { policy })?;
            if let Some(victim_entry) = inner.map.remove(&victim) {
                inner.current_bytes -= victim_entry.meta.size;
                evicted.push((victim, victim_entry));
            }
        }

        inner.current_bytes += entry.meta.size;
        inner.map.insert(key.to_string(), entry);
        Ok(evicted)
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        match inner.map.remove(key) {
            Some(entry) => {
                inner.current_bytes -= entry.meta.size;
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.current_bytes = 0;
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn sweep_expired(&self, now_ms: u64) -> usize {
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .map
            .iter()
            .filter(|(_, e)| e.meta.is_expired(now_ms))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            if let Some(entry) = inner.map.remove(key) {
                inner.current_bytes -= entry.meta.size;
            }
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn current_bytes(&self) -> u64 {
        self.inner.lock().current_bytes
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().map.contains_key(key)
    }
}

/// Outcome of an L1 lookup. `Expired` is distinct from `Miss` so the façade
/// can count expirations and still fall through to L2.
pub enum L1Lookup {
    Hit(Arc<[u8]>),
    Miss,
    Expired,
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
