// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and shutdown.
//!
//! Init order: config → repositories → cache → session manager → broker →
//! task queue → event forwarder → janitor → HTTP listener. Shutdown runs
//! the reverse: stop accepting, stop the workers, close every session,
//! disconnect the broker, flush the cache.

mod startup;

pub use startup::{startup, Daemon};

use crate::config::ConfigError;
use aicli_cache::CacheError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cache initialization failed: {0}")]
    Cache(#[from] CacheError),

    #[error("failed to bind port {port}: {source}")]
    Bind { port: u16, source: std::io::Error },

    #[error("server error: {0}")]
    Serve(std::io::Error),
}
