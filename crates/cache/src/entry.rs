// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cache entry value and metadata.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Access and expiry metadata, shared between L1 entries and the L2 index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    /// Time-to-live in milliseconds; 0 means no expiry.
    pub ttl_ms: u64,
    pub created_at: u64,
    pub accessed_at: u64,
    pub access_count: u64,
    /// Value size in bytes.
    pub size: u64,
}

impl EntryMeta {
    pub fn new(ttl_ms: u64, size: u64, now_ms: u64) -> Self {
        Self { ttl_ms, created_at: now_ms, accessed_at: now_ms, access_count: 0, size }
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.ttl_ms > 0 && now_ms.saturating_sub(self.created_at) > self.ttl_ms
    }

    /// Absolute expiry time, if the entry has one.
    pub fn expires_at(&self) -> Option<u64> {
        (self.ttl_ms > 0).then(|| self.created_at + self.ttl_ms)
    }

    /// Record a hit.
    pub fn touch(&mut self, now_ms: u64) {
        self.accessed_at = now_ms;
        self.access_count += 1;
    }
}

/// An in-memory cache entry. Values are immutable byte blobs; a `set`
/// replaces the whole entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Arc<[u8]>,
    pub meta: EntryMeta,
}

impl CacheEntry {
    pub fn new(value: impl Into<Arc<[u8]>>, ttl_ms: u64, now_ms: u64) -> Self {
        let value = value.into();
        let size = value.len() as u64;
        Self { value, meta: EntryMeta::new(ttl_ms, size, now_ms) }
    }
}

#[cfg(test)]
#[path = "entry_tests.rs"]
mod tests;
