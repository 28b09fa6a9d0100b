// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session endpoints. Everything mutating goes through the session
//! manager; the repository is only read for listings.

use super::{authenticate, created, fail, ok, ok_paged, AppState};
use crate::sessions::SessionError;
use aicli_core::{Clock, ErrorKind, PageRequest, ProjectId, SessionId, SessionStatus};
use aicli_storage::SessionFilter;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(super) struct SessionListQuery {
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    active: Option<bool>,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    limit: Option<u32>,
}

pub(super) fn parse_session_status(s: &str) -> Option<SessionStatus> {
    match s {
        "pending" => Some(SessionStatus::Pending),
        "active" => Some(SessionStatus::Active),
        "idle" => Some(SessionStatus::Idle),
        "ending" => Some(SessionStatus::Ending),
        "ended" => Some(SessionStatus::Ended),
        "error" => Some(SessionStatus::Error),
        _ => None,
    }
}

fn session_fail(e: SessionError) -> Response {
    fail(e.kind(), e.to_string())
}

pub(super) async fn create<C: Clock>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
) -> Response {
    let principal = match authenticate(&state, &headers) {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    let project_id = ProjectId::from_string(&project_id);

    let project = match state.repos.projects.get(&project_id).await {
        Ok(project) => project,
        Err(e) => return fail(e.kind(), e.to_string()),
    };

    // The caller must be able to write the project's workspace.
    let writable = match state.repos.workspaces.get(&project.workspace_id).await {
        Ok(workspace) => {
            !workspace.is_deleted()
                && (principal.admin
                    || workspace.owner_id == principal.id
                    || state.access.can_write(
                        &principal,
                        &aicli_adapters::Resource::Workspace(workspace.id),
                    ))
        }
        Err(e) => return fail(e.kind(), e.to_string()),
    };
    if !writable {
        return fail(ErrorKind::Forbidden, "project's workspace is not writable");
    }

    match state.manager.create(&project).await {
        Ok(record) => created(record),
        Err(e) => session_fail(e),
    }
}

pub(super) async fn list<C: Clock>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
    Query(query): Query<SessionListQuery>,
) -> Response {
    if let Err(response) = authenticate(&state, &headers) {
        return response;
    }

    let status = match query.status.as_deref() {
        Some(s) => match parse_session_status(s) {
            Some(status) => Some(status),
            None => return fail(ErrorKind::Validation, format!("unknown status: {s}")),
        },
        None => None,
    };
    let filter = SessionFilter {
        project_id: query.project_id.as_deref().map(ProjectId::from_string),
        status,
        live_only: query.active.unwrap_or(false),
    };
    let page = PageRequest::new(query.page.unwrap_or(1), query.limit.unwrap_or(0));

    match state.manager.list(filter, page).await {
        Ok(page) => ok_paged(page.items, page.meta),
        Err(e) => session_fail(e),
    }
}

pub(super) async fn active<C: Clock>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = authenticate(&state, &headers) {
        return response;
    }
    match state.manager.list_active().await {
        Ok(sessions) => ok(sessions),
        Err(e) => session_fail(e),
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
    match state.manager.get(&SessionId::from_string(&id)).await {
        Ok(record) => ok(record),
        Err(e) => session_fail(e),
    }
}

pub(super) async fn close<C: Clock>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(response) = authenticate(&state, &headers) {
        return response;
    }
    let id = SessionId::from_string(&id);
    match state.manager.close(&id).await {
        Ok(()) => ok(serde_json::json!({ "id": id, "closed": true })),
        Err(e) => session_fail(e),
    }
}

pub(super) async fn activity<C: Clock>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(response) = authenticate(&state, &headers) {
        return response;
    }
    let id = SessionId::from_string(&id);
    match state.manager.touch(&id).await {
        Ok(()) => ok(serde_json::json!({ "id": id, "touched": true })),
        Err(e) => session_fail(e),
    }
}
