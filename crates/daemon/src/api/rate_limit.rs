// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token-bucket rate limiter keyed by principal or client IP.
//!
//! Buckets refill continuously at `limit` tokens per minute. Whitelisted
//! IPs bypass the limiter entirely. A periodic sweep drops full buckets so
//! the key space does not grow without bound.

use aicli_core::{Clock, PrincipalId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub anon_per_minute: u32,
    pub auth_per_minute: u32,
    pub whitelist: HashSet<IpAddr>,
}

impl From<&crate::config::RateLimitConfig> for RateLimitSettings {
    fn from(c: &crate::config::RateLimitConfig) -> Self {
        Self {
            anon_per_minute: c.anon_per_minute,
            auth_per_minute: c.auth_per_minute,
            whitelist: c.whitelist.clone(),
        }
    }
}

/// Outcome of one admission check, with everything the response headers need.
#[derive(Debug, Clone, Copy)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// When the bucket is full again (epoch seconds).
    pub reset_epoch_secs: u64,
    /// Seconds until the next request would be admitted.
    pub retry_after_secs: u64,
}

struct Bucket {
    tokens: f64,
    updated_ms: u64,
}

pub struct RateLimiter<C: Clock> {
    clock: C,
    settings: RateLimitSettings,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl<C: Clock> RateLimiter<C> {
    pub fn new(settings: RateLimitSettings, clock: C) -> Self {
        Self { clock, settings, buckets: Mutex::new(HashMap::new()) }
    }

    pub fn is_whitelisted(&self, ip: &IpAddr) -> bool {
        self.settings.whitelist.contains(ip)
    }

    pub fn check_ip(&self, ip: &IpAddr) -> Decision {
        self.check(&format!("ip:{ip}"), self.settings.anon_per_minute)
    }

    pub fn check_principal(&self, principal: &PrincipalId) -> Decision {
        self.check(&format!("usr:{principal}"), self.settings.auth_per_minute)
    }

    /// Take one token from the bucket for `key`, refilling first.
    pub fn check(&self, key: &str, limit: u32) -> Decision {
        let now = self.clock.epoch_ms();
        let rate_per_ms = f64::from(limit) / 60_000.0;

        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry(key.to_string())
            .or_insert(Bucket { tokens: f64::from(limit), updated_ms: now });

        let elapsed = now.saturating_sub(bucket.updated_ms);
        bucket.tokens = (bucket.tokens + elapsed as f64 * rate_per_ms).min(f64::from(limit));
        bucket.updated_ms = now;

        let allowed = bucket.tokens >= 1.0;
        if allowed {
            bucket.tokens -= 1.0;
        }

        let missing = f64::from(limit) - bucket.tokens;
        let reset_epoch_secs = (now + (missing / rate_per_ms) as u64) / 1000;
        let retry_after_secs = if allowed {
            0
        } else {
            (((1.0 - bucket.tokens) / rate_per_ms) as u64).div_ceil(1000).max(1)
        };

        Decision {
            allowed,
            limit,
            remaining: bucket.tokens as u32,
            reset_epoch_secs,
            retry_after_secs,
        }
    }

    /// Drop buckets that have refilled completely.
    pub fn sweep(&self) {
        let now = self.clock.epoch_ms();
        let mut buckets = self.buckets.lock();
        buckets.retain(|_, bucket| {
            let elapsed = now.saturating_sub(bucket.updated_ms);
            // Anything idle for over a minute is full for every limit tier.
            elapsed < 60_000
        });
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod tests;
