// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! aicli-cache: two-tier cache for expensive agent artifacts.
//!
//! L1 holds values in memory; L2 holds serialized copies on disk, addressed
//! by `md5(key)` with a JSON index. A single [`EvictionPolicy`] governs both
//! levels and may be switched at runtime. Readers always check L1 first, so
//! the latest `set` is visible even while the asynchronous L2 write is still
//! in flight.

mod disk;
mod entry;
mod memory;
mod multi;
mod policy;
mod stats;

pub use disk::{DiskCache, DiskEntry, L2Lookup};
pub use entry::{CacheEntry, EntryMeta};
pub use memory::{L1Lookup, MemoryCache};
pub use multi::{CacheConfig, MultiLevelCache};
pub use policy::EvictionPolicy;
pub use stats::{CacheStats, StatsSnapshot};

use thiserror::Error;

/// Errors from cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("value of {size} bytes exceeds cache capacity {max}")]
    ValueTooLarge { size: u64, max: u64 },

    #[error("no evictable entry under policy {policy}")]
    NoVictim { policy: EvictionPolicy },

    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt cache index: {0}")]
    CorruptIndex(String),

    /// Aggregation for `delete`/`clear`, which visit both levels and report
    /// every failure without aborting the other level.
    #[error("cache errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<CacheError>),
}
