// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup: construct every subsystem in dependency order.

use super::LifecycleError;
use crate::api::{self, AppState, RateLimitSettings, RateLimiter};
use crate::broker::{spawn_event_forwarder, BrokerConfig, Hub};
use crate::config::DaemonConfig;
use crate::publish::FramePublisher;
use crate::sessions::{spawn_janitor, SessionConfig, SessionManager};
use crate::tasks::{TaskConfig, TaskQueue};
use aicli_adapters::{
    AllowAllAccess, BearerMapVerifier, ContainerRuntime, LocalProcessRuntime, TokenVerifier,
};
use aicli_cache::{CacheConfig, MultiLevelCache};
use aicli_core::{Clock, Event, Principal, PrincipalId, SystemClock};
use aicli_storage::Repositories;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Capacity of the lifecycle event channel feeding the broker.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A fully wired daemon, ready to serve.
pub struct Daemon {
    pub state: AppState<SystemClock>,
    pub config: DaemonConfig,
    listener: TcpListener,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon").field("config", &self.config).finish_non_exhaustive()
    }
}

/// Start the daemon: config is already loaded and validated.
pub async fn startup(config: DaemonConfig) -> Result<Daemon, LifecycleError> {
    let clock = SystemClock;
    let shutdown = CancellationToken::new();

    // 1. Repositories (memory engine; durable engines plug in here).
    let repos = Repositories::memory();

    // 2. Cache.
    let cache_config = CacheConfig {
        l1_max_bytes: config.cache.l1_max_bytes,
        l1_max_entries: config.cache.l1_max_entries,
        l2_dir: config.cache.l2_dir.clone(),
        l2_max_bytes: config.cache.l2_max_bytes,
        l2_max_entries: config.cache.l2_max_entries,
        policy: config.eviction_policy(),
        l1_to_l2_promotion: config.cache.l1_to_l2_promotion,
        l2_ttl_factor: 4,
    };
    let cache = Arc::new(MultiLevelCache::open(cache_config, clock)?);

    // 3. Auth collaborators.
    let verifier = Arc::new(BearerMapVerifier::new());
    for entry in &config.auth.tokens {
        let principal = if entry.admin {
            Principal::admin(PrincipalId::generate(), &entry.name)
        } else {
            Principal::new(PrincipalId::generate(), &entry.name)
        };
        verifier.insert(entry.token.clone(), principal);
    }
    let verifier: Arc<dyn TokenVerifier> = verifier;
    let access: Arc<dyn aicli_adapters::AccessChecker> = Arc::new(AllowAllAccess);

    // 4. Session manager over the local container runtime.
    let (events_tx, events_rx) = mpsc::channel::<Event>(EVENT_CHANNEL_CAPACITY);
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(LocalProcessRuntime::new());
    let manager = SessionManager::new(
        repos.clone(),
        runtime,
        clock,
        SessionConfig::from(&config.sessions),
        events_tx.clone(),
    );

    // 5. Broker hub (created before the queue so it can publish chunks).
    let hub = Hub::new(
        BrokerConfig::from(&config.ws),
        clock,
        Arc::clone(&verifier),
        Arc::clone(&access),
    );

    // 6. Task queue and workers.
    let queue = TaskQueue::new(
        repos.clone(),
        Arc::clone(&manager),
        Arc::clone(&hub) as Arc<dyn FramePublisher>,
        clock,
        TaskConfig::from(&config.tasks),
        events_tx,
    );
    queue.start();

    // 7. Lifecycle event forwarder and janitors.
    let _ = spawn_event_forwarder(Arc::clone(&hub), events_rx);
    let _ = spawn_janitor(Arc::clone(&manager), shutdown.clone());
    let rate = Arc::new(RateLimiter::new(RateLimitSettings::from(&config.rate_limit), clock));
    spawn_maintenance(Arc::clone(&cache), Arc::clone(&rate), shutdown.clone(), &config);

    // 8. Bind last, once everything behind the socket works.
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| LifecycleError::Bind { port: config.server.port, source: e })?;
    info!(port = config.server.port, "daemon listening");

    let state = AppState {
        repos,
        manager,
        queue,
        hub,
        cache,
        rate,
        verifier,
        access,
        clock,
    };
    Ok(Daemon { state, config, listener, shutdown })
}

/// Periodic cache expiry sweep and rate-limit bucket pruning.
fn spawn_maintenance<C: Clock>(
    cache: Arc<MultiLevelCache<C>>,
    rate: Arc<RateLimiter<C>>,
    shutdown: CancellationToken,
    config: &DaemonConfig,
) {
    let interval = config.sessions.cleanup_interval;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(interval) => {
                    let swept = cache.sweep_expired();
                    if swept > 0 {
                        tracing::debug!(swept, "cache entries expired");
                    }
                    rate.sweep();
                }
            }
        }
    });
}

impl Daemon {
    /// Serve until the shutdown signal fires, then tear down in reverse
    /// dependency order.
    pub async fn serve(self) -> Result<(), LifecycleError> {
        let Daemon { state, config: _, listener, shutdown } = self;

        let router = api::router(state.clone());
        let signal = shutdown.clone();
        let server = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { signal.cancelled().await });

        let result = server.await.map_err(LifecycleError::Serve);

        shutdown_subsystems(&state).await;
        result
    }

    /// Trigger a graceful stop from a signal handler.
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;

/// Reverse of startup: workers, sessions, connections, cache.
async fn shutdown_subsystems(state: &AppState<SystemClock>) {
    info!("shutting down");
    state.queue.stop();

    for id in state.manager.live_ids() {
        if let Err(e) = state.manager.close(&id).await {
            warn!(session_id = %id, error = %e, "session close during shutdown failed");
        }
    }

    state.hub.close_all();

    if let Err(e) = state.cache.flush().await {
        warn!(error = %e, "cache flush during shutdown failed");
    }
    info!("shutdown complete");
}
