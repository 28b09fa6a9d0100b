// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.
//!
//! Environment variables override the configuration file; the names are
//! part of the deployment contract, so they live in one place.

use std::time::Duration;

/// Daemon version reported by `/health`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Path to the configuration file (`AICLI_CONFIG`).
pub fn config_path() -> Option<String> {
    std::env::var("AICLI_CONFIG").ok().filter(|s| !s.is_empty())
}

pub fn string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

pub fn parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    string(name).and_then(|s| s.parse().ok())
}

/// Duration-valued variables accept `ms/s/m/h/d` suffixes ("30m", "45s").
pub fn duration(name: &str) -> Option<Duration> {
    string(name).and_then(|s| aicli_core::parse_duration(&s).ok())
}

/// Byte-size variables are plain integers ("104857600").
pub fn bytes(name: &str) -> Option<u64> {
    parse::<u64>(name)
}
