// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two-tier cache façade.
//!
//! `get` checks L1, then L2 with promotion; `set` writes L1 synchronously
//! and ships the L2 copy to a background writer task. All L2 mutations go
//! through that writer so they apply in submission order; `delete`/`clear`
//! await their acknowledgement, `set` does not.

use crate::disk::{DiskCache, L2Lookup};
use crate::entry::{CacheEntry, EntryMeta};
use crate::memory::{L1Lookup, MemoryCache};
use crate::policy::EvictionPolicy;
use crate::stats::{CacheStats, StatsSnapshot};
use crate::CacheError;
use aicli_core::limits::{DEFAULT_L1_MAX_BYTES, DEFAULT_L2_MAX_BYTES};
use aicli_core::Clock;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub l1_max_bytes: u64,
    pub l1_max_entries: usize,
    pub l2_dir: PathBuf,
    pub l2_max_bytes: u64,
    pub l2_max_entries: usize,
    pub policy: EvictionPolicy,
    /// Demote L1 eviction victims to L2 instead of dropping them.
    pub l1_to_l2_promotion: bool,
    /// L2 TTL = L1 TTL × this factor (unexpiring entries stay unexpiring).
    pub l2_ttl_factor: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_max_bytes: DEFAULT_L1_MAX_BYTES,
            l1_max_entries: 10_000,
            l2_dir: PathBuf::from("/tmp/aicli-cache"),
            l2_max_bytes: DEFAULT_L2_MAX_BYTES,
            l2_max_entries: 100_000,
            policy: EvictionPolicy::Lru,
            l1_to_l2_promotion: true,
            l2_ttl_factor: 4,
        }
    }
}

enum WriteOp {
    Set { key: String, value: Arc<[u8]>, meta: EntryMeta },
    Delete { key: String, ack: oneshot::Sender<Result<(), CacheError>> },
    Clear { ack: oneshot::Sender<Result<(), CacheError>> },
    Flush { ack: oneshot::Sender<Result<(), CacheError>> },
}

pub struct MultiLevelCache<C: Clock> {
    l1: MemoryCache,
    l2: Arc<DiskCache>,
    policy: Arc<Mutex<EvictionPolicy>>,
    clock: C,
    stats: Arc<CacheStats>,
    promotion: bool,
    l2_ttl_factor: u32,
    writer_tx: mpsc::UnboundedSender<WriteOp>,
}

impl<C: Clock> MultiLevelCache<C> {
    /// Open both levels and start the L2 writer task. Must be called from
    /// within a tokio runtime.
    pub fn open(config: CacheConfig, clock: C) -> Result<Self, CacheError> {
        let l2 =
            Arc::new(DiskCache::open(&config.l2_dir, config.l2_max_bytes, config.l2_max_entries)?);
        let stats = Arc::new(CacheStats::default());
        let policy = Arc::new(Mutex::new(config.policy));

        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        spawn_writer(
            Arc::clone(&l2),
            Arc::clone(&stats),
            Arc::clone(&policy),
            clock.clone(),
            writer_rx,
        );

        Ok(Self {
            l1: MemoryCache::new(config.l1_max_bytes, config.l1_max_entries),
            l2,
            policy,
            clock,
            stats,
            promotion: config.l1_to_l2_promotion,
            l2_ttl_factor: config.l2_ttl_factor.max(1),
            writer_tx,
        })
    }

    /// L1, then L2 with promotion back into L1. Absent on miss or expiry.
    pub fn get(&self, key: &str) -> Option<Arc<[u8]>> {
        let now = self.clock.epoch_ms();

        match self.l1.get(key, now) {
            L1Lookup::Hit(value) => {
                self.stats.hits_l1.fetch_add(1, Ordering::Relaxed);
                return Some(value);
            }
            L1Lookup::Expired => {
                self.stats.expirations.fetch_add(1, Ordering::Relaxed);
                // The L2 copy may have a longer TTL; fall through.
            }
            L1Lookup::Miss => {}
        }

        match self.l2.get(key, now) {
            Ok(L2Lookup::Hit { value, meta }) => {
                self.stats.hits_l2.fetch_add(1, Ordering::Relaxed);
                let value: Arc<[u8]> = value.into();
                self.promote(key, Arc::clone(&value), meta, now);
                Some(value)
            }
            Ok(L2Lookup::Expired) => {
                self.stats.expirations.fetch_add(1, Ordering::Relaxed);
                None
            }
            Ok(L2Lookup::Miss) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "l2 read failed");
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Write L1 now, queue the L2 copy. `ttl = None` means no expiry.
    pub fn set(
        &self,
        key: &str,
        value: impl Into<Arc<[u8]>>,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let now = self.clock.epoch_ms();
        let ttl_ms = ttl.map(|d| d.as_millis() as u64).unwrap_or(0);
        let value = value.into();
        let entry = CacheEntry::new(Arc::clone(&value), ttl_ms, now);
        let size = entry.meta.size;
        let policy = *self.policy.lock();

        let evicted = self.l1.insert(key, entry, now, policy)?;
        self.record_evictions(evicted);

        let l2_meta = EntryMeta::new(ttl_ms * self.l2_ttl_factor as u64, size, now);
        let _ = self.writer_tx.send(WriteOp::Set { key: key.to_string(), value, meta: l2_meta });
        Ok(())
    }

    /// Remove from both levels. Idempotent; L1 and L2 failures are
    /// aggregated without aborting each other.
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.l1.remove(key);
        let (ack, done) = oneshot::channel();
        let _ = self.writer_tx.send(WriteOp::Delete { key: key.to_string(), ack });
        let result = match done.await {
            Ok(result) => result,
            Err(_) => Ok(()), // writer gone during shutdown
        };
        // A concurrent get may have promoted the key back while the L2
        // delete was in flight; clear it again now that L2 is clean.
        self.l1.remove(key);
        result
    }

    /// Empty both levels.
    pub async fn clear(&self) -> Result<(), CacheError> {
        self.l1.clear();
        let (ack, done) = oneshot::channel();
        let _ = self.writer_tx.send(WriteOp::Clear { ack });
        let result = match done.await {
            Ok(result) => result,
            Err(_) => Ok(()),
        };
        self.l1.clear();
        result
    }

    /// Wait for every queued L2 write and flush the index to disk.
    pub async fn flush(&self) -> Result<(), CacheError> {
        let (ack, done) = oneshot::channel();
        let _ = self.writer_tx.send(WriteOp::Flush { ack });
        match done.await {
            Ok(result) => result,
            Err(_) => Ok(()),
        }
    }

    /// Drop expired entries from both levels; returns how many went.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.epoch_ms();
        let swept = self.l1.sweep_expired(now) + self.l2.sweep_expired(now);
        self.stats.expirations.fetch_add(swept as u64, Ordering::Relaxed);
        swept
    }

    pub fn policy(&self) -> EvictionPolicy {
        *self.policy.lock()
    }

    /// Switch the eviction policy at runtime. Applies to evictions from
    /// this point on; resident entries are untouched.
    pub fn set_policy(&self, policy: EvictionPolicy) {
        *self.policy.lock() = policy;
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn l1_len(&self) -> usize {
        self.l1.len()
    }

    pub fn l2_len(&self) -> usize {
        self.l2.len()
    }

    pub fn l1_contains(&self, key: &str) -> bool {
        self.l1.contains(key)
    }

    pub fn l2_contains(&self, key: &str) -> bool {
        self.l2.contains(key)
    }

    #[cfg(test)]
    pub(crate) fn l1_remove_for_test(&self, key: &str) {
        self.l1.remove(key);
    }

    /// Copy an L2 hit up into L1, demoting whatever L1 evicts to make room.
    /// Promotion failure is not an error; the caller already has the value.
    fn promote(&self, key: &str, value: Arc<[u8]>, meta: EntryMeta, now: u64) {
        let policy = *self.policy.lock();
        let entry = CacheEntry { value, meta };
        match self.l1.insert(key, entry, now, policy) {
            Ok(evicted) => {
                self.stats.promotions.fetch_add(1, Ordering::Relaxed);
                self.record_evictions(evicted);
            }
            Err(e) => tracing::debug!(key, error = %e, "promotion to l1 skipped"),
        }
    }

    /// Count L1 evictions and queue demotions when enabled.
    fn record_evictions(&self, evicted: Vec<(String, CacheEntry)>) {
        for (victim_key, victim) in evicted {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            if self.promotion {
                self.stats.demotions.fetch_add(1, Ordering::Relaxed);
                let _ = self.writer_tx.send(WriteOp::Set {
                    key: victim_key,
                    value: victim.value,
                    meta: victim.meta,
                });
            }
        }
    }
}

/// Background L2 writer: applies mutations in order so a queued `set` can
/// never resurrect a later `delete`.
fn spawn_writer<C: Clock>(
    l2: Arc<DiskCache>,
    stats: Arc<CacheStats>,
    policy: Arc<Mutex<EvictionPolicy>>,
    clock: C,
    mut rx: mpsc::UnboundedReceiver<WriteOp>,
) {
    tokio::spawn(async move {
        while let Some(op) = rx.recv().await {
            match op {
                WriteOp::Set { key, value, meta } => {
                    let now = clock.epoch_ms();
                    let policy = *policy.lock();
                    match l2.insert(&key, &value, meta, now, policy) {
                        Ok(evicted) => {
                            stats.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
                        }
                        Err(e) => tracing::warn!(key, error = %e, "l2 write failed"),
                    }
                }
                WriteOp::Delete { key, ack } => {
                    let result = l2.remove(&key).map(|_| ());
                    let _ = ack.send(result);
                }
                WriteOp::Clear { ack } => {
                    let _ = ack.send(l2.clear());
                }
                WriteOp::Flush { ack } => {
                    let _ = ack.send(l2.flush());
                }
            }
        }
        // Channel closed: the cache is being dropped. Best-effort index
        // flush so a clean shutdown persists metadata.
        if let Err(e) = l2.flush() {
            tracing::warn!(error = %e, "final l2 index flush failed");
        }
    });
}

#[cfg(test)]
#[path = "multi_tests.rs"]
mod tests;
