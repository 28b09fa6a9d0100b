// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST surface under `/api/v1`, plus `/health` and the `/ws` upgrade.
//!
//! Handlers are thin: authenticate, parse, call the owning subsystem, wrap
//! the result in the response envelope. Rate limiting runs as middleware so
//! the `X-RateLimit-*` headers appear on every response.

mod projects;
mod rate_limit;
mod sessions;
mod tasks;
mod workspaces;

pub use rate_limit::{Decision, RateLimitSettings, RateLimiter};

use crate::broker::Hub;
use crate::sessions::SessionManager;
use crate::tasks::TaskQueue;
use aicli_adapters::{AccessChecker, TokenVerifier};
use aicli_cache::MultiLevelCache;
use aicli_core::{Clock, ErrorKind, PageMeta, Principal};
use aicli_storage::Repositories;
use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

pub struct AppState<C: Clock> {
    pub repos: Repositories,
    pub manager: Arc<SessionManager<C>>,
    pub queue: Arc<TaskQueue<C>>,
    pub hub: Arc<Hub<C>>,
    pub cache: Arc<MultiLevelCache<C>>,
    pub rate: Arc<RateLimiter<C>>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub access: Arc<dyn AccessChecker>,
    pub clock: C,
}

impl<C: Clock> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            repos: self.repos.clone(),
            manager: Arc::clone(&self.manager),
            queue: Arc::clone(&self.queue),
            hub: Arc::clone(&self.hub),
            cache: Arc::clone(&self.cache),
            rate: Arc::clone(&self.rate),
            verifier: Arc::clone(&self.verifier),
            access: Arc::clone(&self.access),
            clock: self.clock.clone(),
        }
    }
}

pub fn router<C: Clock>(state: AppState<C>) -> Router {
    Router::new()
        .route("/api/v1/workspaces", post(workspaces::create::<C>).get(workspaces::list::<C>))
        .route(
            "/api/v1/workspaces/{id}",
            get(workspaces::get_one::<C>)
                .put(workspaces::update::<C>)
                .delete(workspaces::remove::<C>),
        )
        .route(
            "/api/v1/workspaces/{id}/projects",
            post(projects::create::<C>).get(projects::list::<C>),
        )
        .route(
            "/api/v1/projects/{id}",
            get(projects::get_one::<C>).put(projects::update::<C>).delete(projects::remove::<C>),
        )
        .route("/api/v1/projects/{id}/sessions", post(sessions::create::<C>))
        .route("/api/v1/sessions", get(sessions::list::<C>))
        .route("/api/v1/sessions/active", get(sessions::active::<C>))
        .route("/api/v1/sessions/{id}", get(sessions::get_one::<C>).delete(sessions::close::<C>))
        .route("/api/v1/sessions/{id}/activity", put(sessions::activity::<C>))
        .route("/api/v1/sessions/{id}/tasks", post(tasks::create::<C>))
        .route("/api/v1/tasks", get(tasks::list::<C>))
        .route("/api/v1/tasks/active", get(tasks::active::<C>))
        .route("/api/v1/tasks/stats", get(tasks::stats::<C>))
        .route("/api/v1/tasks/{id}", get(tasks::get_one::<C>).delete(tasks::cancel::<C>))
        .route("/health", get(health::<C>))
        .route("/ws", get(ws_upgrade::<C>))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_layer::<C>))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Envelope helpers

pub(crate) fn ok<T: Serialize>(data: T) -> Response {
    Json(aicli_wire::ApiSuccess::new(data)).into_response()
}

pub(crate) fn ok_paged<T: Serialize>(data: T, meta: PageMeta) -> Response {
    Json(aicli_wire::ApiSuccess::paged(data, meta)).into_response()
}

pub(crate) fn created<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(aicli_wire::ApiSuccess::new(data))).into_response()
}

pub(crate) fn fail(kind: ErrorKind, message: impl Into<String>) -> Response {
    let status = StatusCode::from_u16(kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(aicli_wire::ApiFailure::new(kind, message))).into_response()
}

// ---------------------------------------------------------------------------
// Authentication

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Every `/api/v1` endpoint requires a verified principal.
pub(crate) fn authenticate<C: Clock>(
    state: &AppState<C>,
    headers: &HeaderMap,
) -> Result<Principal, Response> {
    let Some(token) = bearer_token(headers) else {
        return Err(fail(ErrorKind::Unauthorized, "missing bearer token"));
    };
    state
        .verifier
        .verify(&token)
        .map_err(|_| fail(ErrorKind::Unauthorized, "invalid token"))
}

// ---------------------------------------------------------------------------
// Rate limiting middleware

async fn rate_limit_layer<C: Clock>(
    State(state): State<AppState<C>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let ip = addr.ip();
    if state.rate.is_whitelisted(&ip) {
        return next.run(request).await;
    }

    // Authenticated callers are keyed by principal, anonymous by IP.
    let principal = bearer_token(request.headers())
        .and_then(|token| state.verifier.verify(&token).ok());
    let decision = match principal {
        Some(principal) => state.rate.check_principal(&principal.id),
        None => state.rate.check_ip(&ip),
    };

    if !decision.allowed {
        let mut response = fail(ErrorKind::RateLimited, "rate limit exceeded");
        apply_rate_headers(&mut response, &decision);
        if let Ok(value) = HeaderValue::from_str(&decision.retry_after_secs.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        return response;
    }

    let mut response = next.run(request).await;
    apply_rate_headers(&mut response, &decision);
    response
}

fn apply_rate_headers(response: &mut Response, decision: &Decision) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("X-RateLimit-Limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("X-RateLimit-Remaining", value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.reset_epoch_secs.to_string()) {
        headers.insert("X-RateLimit-Reset", value);
    }
}

// ---------------------------------------------------------------------------
// Health

#[derive(Serialize)]
struct HealthReport {
    status: &'static str,
    version: &'static str,
    sessions: SessionsHealth,
    tasks: aicli_storage::TaskStats,
    connections: usize,
    cache: aicli_cache::StatsSnapshot,
}

#[derive(Serialize)]
struct SessionsHealth {
    live: usize,
    max: usize,
}

async fn health<C: Clock>(State(state): State<AppState<C>>) -> Response {
    let tasks = state.queue.stats().await.unwrap_or_default();
    let healthy = !state.queue.is_stopped();
    let report = HealthReport {
        status: if healthy { "ok" } else { "degraded" },
        version: crate::env::VERSION,
        sessions: SessionsHealth {
            live: state.manager.live_count(),
            max: state.manager.config().max_sessions,
        },
        tasks,
        connections: state.hub.connection_count(),
        cache: state.cache.stats(),
    };
    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(aicli_wire::ApiSuccess::new(report))).into_response()
}

// ---------------------------------------------------------------------------
// WebSocket upgrade

async fn ws_upgrade<C: Clock>(
    State(state): State<AppState<C>>,
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    // Token from the Authorization header or `?token=`.
    let token = bearer_token(&headers).or_else(|| params.get("token").cloned());
    let hub = Arc::clone(&state.hub);
    ws.max_message_size(state.hub.config().max_message)
        .on_upgrade(move |socket| crate::broker::serve(socket, hub, token))
}
