// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project endpoints.

use super::workspaces::ListQuery;
use super::{authenticate, created, fail, ok, ok_paged, AppState};
use aicli_core::{
    Clock, ErrorKind, GitInfo, PageRequest, Principal, ProjectConfig, ProjectId, ProjectStatus,
    WorkspaceId,
};
use aicli_storage::{SessionFilter, StorageError};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub(super) struct CreateProjectRequest {
    name: String,
    path: PathBuf,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    git_info: Option<GitInfo>,
    #[serde(default)]
    config: Option<ProjectConfig>,
}

#[derive(Debug, Deserialize)]
pub(super) struct UpdateProjectRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    status: Option<ProjectStatus>,
    #[serde(default)]
    config: Option<ProjectConfig>,
}

fn storage_fail(e: StorageError) -> Response {
    fail(e.kind(), e.to_string())
}

/// The project's workspace, when the principal may touch it.
async fn owned_workspace<C: Clock>(
    state: &AppState<C>,
    principal: &Principal,
    id: &WorkspaceId,
) -> Result<aicli_core::WorkspaceRecord, Response> {
    match state.repos.workspaces.get(id).await {
        Ok(record) if record.is_deleted() => Err(fail(ErrorKind::NotFound, "workspace deleted")),
        Ok(record) => {
            if principal.admin || record.owner_id == principal.id {
                Ok(record)
            } else {
                Err(fail(ErrorKind::Forbidden, "not your workspace"))
            }
        }
        Err(e) => Err(storage_fail(e)),
    }
}

pub(super) async fn create<C: Clock>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
    Path(workspace_id): Path<String>,
    body: Result<Json<CreateProjectRequest>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let principal = match authenticate(&state, &headers) {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    let Json(body) = match body {
        Ok(body) => body,
        Err(e) => return fail(ErrorKind::Validation, e.to_string()),
    };
    let workspace_id = WorkspaceId::from_string(&workspace_id);
    if let Err(response) = owned_workspace(&state, &principal, &workspace_id).await {
        return response;
    }

    if body.name.trim().is_empty() {
        return fail(ErrorKind::Validation, "project name must not be empty");
    }
    if !body.path.is_dir() {
        return fail(
            ErrorKind::Validation,
            format!("project path does not exist: {}", body.path.display()),
        );
    }

    let mut record = aicli_core::ProjectRecord::new(
        workspace_id,
        body.name.trim(),
        body.path,
        state.clock.epoch_ms(),
    );
    record.language = body.language;
    record.git_info = body.git_info;
    if let Some(config) = body.config {
        record.config = config;
    }

    match state.repos.projects.create(record).await {
        Ok(record) => created(record),
        Err(e) => storage_fail(e),
    }
}

pub(super) async fn list<C: Clock>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
    Path(workspace_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Response {
    let principal = match authenticate(&state, &headers) {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    let workspace_id = WorkspaceId::from_string(&workspace_id);
    if let Err(response) = owned_workspace(&state, &principal, &workspace_id).await {
        return response;
    }

    match state.repos.projects.list_by_workspace(&workspace_id, query.page_request()).await {
        Ok(page) => ok_paged(page.items, page.meta),
        Err(e) => storage_fail(e),
    }
}

/// The project plus its workspace ownership check.
async fn accessible_project<C: Clock>(
    state: &AppState<C>,
    principal: &Principal,
    id: &ProjectId,
) -> Result<aicli_core::ProjectRecord, Response> {
    let record = match state.repos.projects.get(id).await {
        Ok(record) => record,
        Err(e) => return Err(storage_fail(e)),
    };
    owned_workspace(state, principal, &record.workspace_id).await?;
    Ok(record)
}

pub(super) async fn get_one<C: Clock>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let principal = match authenticate(&state, &headers) {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    match accessible_project(&state, &principal, &ProjectId::from_string(&id)).await {
        Ok(record) => ok(record),
        Err(response) => response,
    }
}

pub(super) async fn update<C: Clock>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<UpdateProjectRequest>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let principal = match authenticate(&state, &headers) {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    let Json(body) = match body {
        Ok(body) => body,
        Err(e) => return fail(ErrorKind::Validation, e.to_string()),
    };

    let mut record =
        match accessible_project(&state, &principal, &ProjectId::from_string(&id)).await {
            Ok(record) => record,
            Err(response) => return response,
        };

    if let Some(name) = body.name {
        if name.trim().is_empty() {
            return fail(ErrorKind::Validation, "project name must not be empty");
        }
        record.name = name.trim().to_string();
    }
    if let Some(language) = body.language {
        record.language = Some(language);
    }
    if let Some(status) = body.status {
        record.status = status;
    }
    if let Some(config) = body.config {
        record.config = config;
    }
    record.bump(state.clock.epoch_ms());

    match state.repos.projects.update(record).await {
        Ok(record) => ok(record),
        Err(e) => storage_fail(e),
    }
}

pub(super) async fn remove<C: Clock>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let principal = match authenticate(&state, &headers) {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    let id = ProjectId::from_string(&id);
    let record = match accessible_project(&state, &principal, &id).await {
        Ok(record) => record,
        Err(response) => return response,
    };

    // A project with a live session cannot be removed.
    let live = state
        .repos
        .sessions
        .list(
            SessionFilter { project_id: Some(record.id), live_only: true, ..Default::default() },
            PageRequest::new(1, 1),
        )
        .await;
    match live {
        Ok(page) if !page.items.is_empty() => {
            return fail(ErrorKind::Conflict, "project has an active session");
        }
        Ok(_) => {}
        Err(e) => return storage_fail(e),
    }

    match state.repos.projects.delete(&id).await {
        Ok(()) => ok(serde_json::json!({ "id": id, "deleted": true })),
        Err(e) => storage_fail(e),
    }
}
