// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Janitor loop: periodic idle/lifetime enforcement.
//!
//! The sweep itself lives on the manager (`SessionManager::sweep`) so tests
//! can drive it directly with a fake clock; this task only supplies the
//! cadence.

use super::SessionManager;
use aicli_core::Clock;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub fn spawn_janitor<C: Clock>(
    manager: Arc<SessionManager<C>>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let interval = manager.config().cleanup_interval;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("janitor stopping");
                    return;
                }
                _ = tokio::time::sleep(interval) => {
                    manager.sweep().await;
                }
            }
        }
    })
}
