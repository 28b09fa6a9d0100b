// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task endpoints. Submission and cancellation go through the task queue;
//! listings read the repository.

use super::{authenticate, created, fail, ok, ok_paged, AppState};
use crate::tasks::TaskError;
use aicli_core::{Clock, ErrorKind, PageRequest, SessionId, TaskId, TaskStatus};
use aicli_storage::TaskFilter;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(super) struct CreateTaskRequest {
    command: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct TaskListQuery {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    limit: Option<u32>,
}

pub(super) fn parse_task_status(s: &str) -> Option<TaskStatus> {
    match s {
        "pending" => Some(TaskStatus::Pending),
        "running" => Some(TaskStatus::Running),
        "completed" => Some(TaskStatus::Completed),
        "failed" => Some(TaskStatus::Failed),
        "cancelled" => Some(TaskStatus::Cancelled),
        _ => None,
    }
}

fn task_fail(e: TaskError) -> Response {
    fail(e.kind(), e.to_string())
}

pub(super) async fn create<C: Clock>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
    body: Result<Json<CreateTaskRequest>, axum::extract::rejection::JsonRejection>,
) -> Response {
    if let Err(response) = authenticate(&state, &headers) {
        return response;
    }
    let Json(body) = match body {
        Ok(body) => body,
        Err(e) => return fail(ErrorKind::Validation, e.to_string()),
    };

    let session_id = SessionId::from_string(&session_id);
    match state.queue.submit(session_id, &body.command).await {
        Ok(record) => created(record),
        Err(e) => task_fail(e),
    }
}

pub(super) async fn list<C: Clock>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
    Query(query): Query<TaskListQuery>,
) -> Response {
    if let Err(response) = authenticate(&state, &headers) {
        return response;
    }

    let status = match query.status.as_deref() {
        Some(s) => match parse_task_status(s) {
            Some(status) => Some(status),
            None => return fail(ErrorKind::Validation, format!("unknown status: {s}")),
        },
        None => None,
    };
    let filter = TaskFilter {
        session_id: query.session_id.as_deref().map(SessionId::from_string),
        status,
    };
    let page = PageRequest::new(query.page.unwrap_or(1), query.limit.unwrap_or(0));

    match state.queue.list(filter, page).await {
        Ok(page) => ok_paged(page.items, page.meta),
        Err(e) => task_fail(e),
    }
}

pub(super) async fn active<C: Clock>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = authenticate(&state, &headers) {
        return response;
    }
    match state.queue.list_active().await {
        Ok(tasks) => ok(tasks),
        Err(e) => task_fail(e),
    }
}

/// Stats are aggregated over every task row; memoize briefly.
const STATS_CACHE_KEY: &str = "tasks:stats";
const STATS_CACHE_TTL: std::time::Duration = std::time::Duration::from_secs(5);

pub(super) async fn stats<C: Clock>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = authenticate(&state, &headers) {
        return response;
    }

    if let Some(bytes) = state.cache.get(STATS_CACHE_KEY) {
        if let Ok(stats) = serde_json::from_slice::<aicli_storage::TaskStats>(&bytes) {
            return ok(stats);
        }
    }

    match state.queue.stats().await {
        Ok(stats) => {
            if let Ok(bytes) = serde_json::to_vec(&stats) {
                if let Err(e) = state.cache.set(STATS_CACHE_KEY, bytes, Some(STATS_CACHE_TTL)) {
                    tracing::debug!(error = %e, "stats cache write skipped");
                }
            }
            ok(stats)
        }
        Err(e) => task_fail(e),
    }
}

pub(super) async fn get_one<C: Clock>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(response) = authenticate(&state, &headers) {
        return response;
    }
    match state.queue.get(&TaskId::from_string(&id)).await {
        Ok(record) => ok(record),
        Err(e) => task_fail(e),
    }
}

pub(super) async fn cancel<C: Clock>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(response) = authenticate(&state, &headers) {
        return response;
    }
    let id = TaskId::from_string(&id);

    // Distinguish "cancelled now" from "finished long ago": cancelling a
    // terminal task is an internal no-op, surfaced as a conflict.
    match state.queue.get(&id).await {
        Ok(record) if record.is_terminal() => {
            return fail(
                ErrorKind::Conflict,
                format!("task already {} and cannot be cancelled", record.status),
            );
        }
        Ok(_) => {}
        Err(e) => return task_fail(e),
    }

    match state.queue.cancel(&id).await {
        Ok(record) => ok(record),
        Err(e) => task_fail(e),
    }
}
