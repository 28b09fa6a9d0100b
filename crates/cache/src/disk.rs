// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! L2: on-disk byte cache.
//!
//! Values live in `{md5(key)}.cache` files under one directory; `index.json`
//! maps keys to file metadata. The index is rebuilt against the directory on
//! open (entries whose backing file vanished are dropped, orphan files are
//! deleted) and flushed atomically via tmp + rename.

use crate::entry::EntryMeta;
use crate::policy::EvictionPolicy;
use crate::CacheError;
use md5::{Digest, Md5};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const INDEX_FILE: &str = "index.json";
const FILE_SUFFIX: &str = ".cache";

/// Index row for one cached value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskEntry {
    pub file_name: String,
    #[serde(flatten)]
    pub meta: EntryMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Index {
    entries: HashMap<String, DiskEntry>,
}

pub struct DiskCache {
    dir: PathBuf,
    max_bytes: u64,
    max_entries: usize,
    inner: Mutex<Inner>,
}

struct Inner {
    index: Index,
    current_bytes: u64,
}

impl DiskCache {
    /// Open (or create) the cache directory and reconcile the index.
    pub fn open(dir: impl Into<PathBuf>, max_bytes: u64, max_entries: usize) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut index = load_index(&dir)?;

        // Drop index rows whose backing file is gone.
        index.entries.retain(|key, entry| {
            let present = dir.join(&entry.file_name).is_file();
            if !present {
                tracing::debug!(key, file = %entry.file_name, "dropping index entry with missing file");
            }
            present
        });

        // Delete orphan value files the index no longer references.
        let referenced: std::collections::HashSet<&str> =
            index.entries.values().map(|e| e.file_name.as_str()).collect();
        if let Ok(dir_entries) = fs::read_dir(&dir) {
            for dir_entry in dir_entries.flatten() {
                let name = dir_entry.file_name().to_string_lossy().into_owned();
                if name.ends_with(FILE_SUFFIX) && !referenced.contains(name.as_str()) {
                    tracing::debug!(file = %name, "removing orphan cache file");
                    let _ = fs::remove_file(dir_entry.path());
                }
            }
        }

        let current_bytes = index.entries.values().map(|e| e.meta.size).sum();
        Ok(Self { dir, max_bytes, max_entries, inner: Mutex::new(Inner { index, current_bytes }) })
    }

    /// Look up a key, verifying the stored checksum when present.
    pub fn get(&self, key: &str, now_ms: u64) -> Result<L2Lookup, CacheError> {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.index.entries.get(key) else {
            return Ok(L2Lookup::Miss);
        };

        if entry.meta.is_expired(now_ms) {
            let file_name = entry.file_name.clone();
            let size = entry.meta.size;
            inner.index.entries.remove(key);
            inner.current_bytes -= size;
            let _ = fs::remove_file(self.dir.join(file_name));
            return Ok(L2Lookup::Expired);
        }

        let path = self.dir.join(&entry.file_name);
        let value = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                // File vanished or unreadable under us: self-heal the index.
                tracing::warn!(key, error = %e, "cache file unreadable, dropping entry");
                let size = entry.meta.size;
                inner.index.entries.remove(key);
                inner.current_bytes -= size;
                return Ok(L2Lookup::Miss);
            }
        };

        if let Some(expected) = &entry.checksum {
            if *expected != checksum_hex(&value) {
                tracing::warn!(key, "cache file checksum mismatch, dropping entry");
                let file_name = entry.file_name.clone();
                let size = entry.meta.size;
                inner.index.entries.remove(key);
                inner.current_bytes -= size;
                let _ = fs::remove_file(self.dir.join(file_name));
                return Ok(L2Lookup::Miss);
            }
        }

        // Borrow again mutably to touch metadata.
        let meta = match inner.index.entries.get_mut(key) {
            Some(entry) => {
                entry.meta.touch(now_ms);
                entry.meta.clone()
            }
            None => return Ok(L2Lookup::Miss),
        };
        Ok(L2Lookup::Hit { value, meta })
    }

    /// Write a value, evicting per `policy` until it fits.
    ///
    /// `meta` carries the TTL and creation time decided by the caller so
    /// demoted L1 entries keep their original timeline.
    pub fn insert(
        &self,
        key: &str,
        value: &[u8],
        meta: EntryMeta,
        now_ms: u64,
        policy: EvictionPolicy,
    ) -> Result<usize, CacheError> {
        if meta.size > self.max_bytes {
            return Err(CacheError::ValueTooLarge { size: meta.size, max: self.max_bytes });
        }

        let mut inner = self.inner.lock();

        if let Some(old) = inner.index.entries.remove(key) {
            inner.current_bytes -= old.meta.size;
            let _ = fs::remove_file(self.dir.join(&old.file_name));
        }

        let mut evicted = 0;
        while inner.current_bytes + meta.size > self.max_bytes
            || inner.index.entries.len() + 1 > self.max_entries
        {
            let victim = policy
                .select_victim(
                    now_ms,
                    inner.index.entries.iter().map(|(k, e)| (k.as_str(), &e.meta)),
                )
                .ok_or(CacheError::NoVictim { policy })?;
            if let Some(victim_entry) = inner.index.entries.remove(&victim) {
                inner.current_bytes -= victim_entry.meta.size;
                let _ = fs::remove_file(self.dir.join(&victim_entry.file_name));
                evicted += 1;
            }
        }

        let file_name = file_name_for(key);
        fs::write(self.dir.join(&file_name), value)?;

        inner.current_bytes += meta.size;
        inner.index.entries.insert(
            key.to_string(),
            DiskEntry { file_name, checksum: Some(checksum_hex(value)), meta },
        );
        Ok(evicted)
    }

    pub fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let mut inner = self.inner.lock();
        match inner.index.entries.remove(key) {
            Some(entry) => {
                inner.current_bytes -= entry.meta.size;
                fs::remove_file(self.dir.join(&entry.file_name))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        let mut inner = self.inner.lock();
        let mut first_err = None;
        for entry in inner.index.entries.values() {
            if let Err(e) = fs::remove_file(self.dir.join(&entry.file_name)) {
                if e.kind() != std::io::ErrorKind::NotFound && first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        inner.index.entries.clear();
        inner.current_bytes = 0;
        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn sweep_expired(&self, now_ms: u64) -> usize {
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .index
            .entries
            .iter()
            .filter(|(_, e)| e.meta.is_expired(now_ms))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            if let Some(entry) = inner.index.entries.remove(key) {
                inner.current_bytes -= entry.meta.size;
                let _ = fs::remove_file(self.dir.join(&entry.file_name));
            }
        }
        expired.len()
    }

    /// Flush the index atomically (tmp file + rename).
    pub fn flush(&self) -> Result<(), CacheError> {
        let inner = self.inner.lock();
        let json = serde_json::to_vec_pretty(&inner.index)
            .map_err(|e| CacheError::CorruptIndex(e.to_string()))?;
        let tmp = self.dir.join(format!("{INDEX_FILE}.tmp"));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, self.dir.join(INDEX_FILE))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().index.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn current_bytes(&self) -> u64 {
        self.inner.lock().current_bytes
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().index.entries.contains_key(key)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Outcome of an L2 lookup.
pub enum L2Lookup {
    Hit { value: Vec<u8>, meta: EntryMeta },
    Miss,
    Expired,
}

/// `{md5(key)}.cache`
fn file_name_for(key: &str) -> String {
    let digest = Md5::new_with_prefix(key.as_bytes()).finalize();
    let mut name = String::with_capacity(32 + FILE_SUFFIX.len());
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(name, "{:02x}", byte);
    }
    name.push_str(FILE_SUFFIX);
    name
}

fn checksum_hex(value: &[u8]) -> String {
    let digest = Md5::new_with_prefix(value).finalize();
    let mut out = String::with_capacity(32);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

fn load_index(dir: &Path) -> Result<Index, CacheError> {
    let path = dir.join(INDEX_FILE);
    if !path.exists() {
        return Ok(Index::default());
    }
    let bytes = fs::read(&path)?;
    serde_json::from_slice(&bytes).map_err(|e| CacheError::CorruptIndex(e.to_string()))
}

#[cfg(test)]
#[path = "disk_tests.rs"]
mod tests;
