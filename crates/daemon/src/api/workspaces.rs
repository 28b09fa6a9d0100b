// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace endpoints.

use super::{authenticate, created, fail, ok, ok_paged, AppState};
use aicli_core::{
    Clock, ErrorKind, PageRequest, Principal, SortOrder, WorkspaceId, WorkspaceRecord,
    WorkspaceStatus,
};
use aicli_storage::{SessionFilter, Sort, StorageError, WorkspaceFilter};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub(super) struct CreateWorkspaceRequest {
    name: String,
    project_path: PathBuf,
}

#[derive(Debug, Deserialize)]
pub(super) struct UpdateWorkspaceRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<WorkspaceStatus>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ListQuery {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    sort: Option<String>,
    #[serde(default)]
    order: Option<String>,
}

impl ListQuery {
    pub(super) fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page.unwrap_or(1), self.limit.unwrap_or(0))
    }

    fn sort_spec(&self) -> Option<Sort> {
        self.sort.as_ref().map(|field| Sort {
            field: field.clone(),
            order: match self.order.as_deref() {
                Some("desc") => SortOrder::Desc,
                _ => SortOrder::Asc,
            },
        })
    }
}

fn storage_fail(e: StorageError) -> Response {
    fail(e.kind(), e.to_string())
}

/// Mutation rights: the owner, or an admin.
fn may_mutate(principal: &Principal, workspace: &WorkspaceRecord) -> bool {
    principal.admin || workspace.owner_id == principal.id
}

pub(super) async fn create<C: Clock>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
    body: Result<Json<CreateWorkspaceRequest>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let principal = match authenticate(&state, &headers) {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    let Json(body) = match body {
        Ok(body) => body,
        Err(e) => return fail(ErrorKind::Validation, e.to_string()),
    };

    if body.name.trim().is_empty() {
        return fail(ErrorKind::Validation, "workspace name must not be empty");
    }
    if !body.project_path.is_dir() {
        return fail(
            ErrorKind::Validation,
            format!("project path does not exist: {}", body.project_path.display()),
        );
    }

    let record = WorkspaceRecord::new(
        body.name.trim(),
        principal.id,
        body.project_path,
        state.clock.epoch_ms(),
    );
    match state.repos.workspaces.create(record).await {
        Ok(record) => created(record),
        Err(e) => storage_fail(e),
    }
}

pub(super) async fn list<C: Clock>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    let principal = match authenticate(&state, &headers) {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    // Admins see everything; everyone else sees their own workspaces.
    let filter = WorkspaceFilter {
        owner_id: (!principal.admin).then_some(principal.id),
        ..Default::default()
    };
    match state.repos.workspaces.list(filter, query.sort_spec(), query.page_request()).await {
        Ok(page) => ok_paged(page.items, page.meta),
        Err(e) => storage_fail(e),
    }
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
    let id = WorkspaceId::from_string(&id);

    match state.repos.workspaces.get(&id).await {
        Ok(record) if record.is_deleted() => fail(ErrorKind::NotFound, "workspace deleted"),
        Ok(record) => {
            if may_mutate(&principal, &record) {
                ok(record)
            } else {
                fail(ErrorKind::Forbidden, "not your workspace")
            }
        }
        Err(e) => storage_fail(e),
    }
}

pub(super) async fn update<C: Clock>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<UpdateWorkspaceRequest>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let principal = match authenticate(&state, &headers) {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    let Json(body) = match body {
        Ok(body) => body,
        Err(e) => return fail(ErrorKind::Validation, e.to_string()),
    };
    let id = WorkspaceId::from_string(&id);

    let mut record = match state.repos.workspaces.get(&id).await {
        Ok(record) if record.is_deleted() => return fail(ErrorKind::NotFound, "workspace deleted"),
        Ok(record) => record,
        Err(e) => return storage_fail(e),
    };
    if !may_mutate(&principal, &record) {
        return fail(ErrorKind::Forbidden, "not your workspace");
    }

    if let Some(name) = body.name {
        if name.trim().is_empty() {
            return fail(ErrorKind::Validation, "workspace name must not be empty");
        }
        record.name = name.trim().to_string();
    }
    if let Some(status) = body.status {
        if status == WorkspaceStatus::Deleted {
            return fail(ErrorKind::Validation, "use DELETE to remove a workspace");
        }
        record.status = status;
    }
    record.bump(state.clock.epoch_ms());

    match state.repos.workspaces.update(record).await {
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
    let id = WorkspaceId::from_string(&id);

    let record = match state.repos.workspaces.get(&id).await {
        Ok(record) if record.is_deleted() => return fail(ErrorKind::NotFound, "workspace deleted"),
        Ok(record) => record,
        Err(e) => return storage_fail(e),
    };
    if !may_mutate(&principal, &record) {
        return fail(ErrorKind::Forbidden, "not your workspace");
    }

    // Deletion is blocked while any project in the workspace has a live
    // session.
    let projects = match state
        .repos
        .projects
        .list_by_workspace(&id, PageRequest::new(1, aicli_core::page::MAX_LIMIT))
        .await
    {
        Ok(page) => page.items,
        Err(e) => return storage_fail(e),
    };
    for project in &projects {
        let live = state
            .repos
            .sessions
            .list(
                SessionFilter { project_id: Some(project.id), live_only: true, ..Default::default() },
                PageRequest::new(1, 1),
            )
            .await;
        match live {
            Ok(page) if !page.items.is_empty() => {
                return fail(
                    ErrorKind::Conflict,
                    format!("project {} has an active session", project.name),
                );
            }
            Ok(_) => {}
            Err(e) => return storage_fail(e),
        }
    }

    match state.repos.workspaces.soft_delete(&id, state.clock.epoch_ms()).await {
        Ok(()) => ok(serde_json::json!({ "id": id, "deleted": true })),
        Err(e) => storage_fail(e),
    }
}
