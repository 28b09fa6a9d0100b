// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repository traits and the errors they surface.

use aicli_core::{
    ErrorKind, Page, PageRequest, PrincipalId, ProjectId, ProjectRecord, SessionId, SessionRecord,
    SessionStatus, SortOrder, TaskId, TaskRecord, TaskStatus, WorkspaceId, WorkspaceRecord,
    WorkspaceStatus,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} already exists: {detail}")]
    AlreadyExists { entity: &'static str, detail: String },

    #[error("version conflict on {entity} {id}: expected {expected}, found {found}")]
    VersionConflict { entity: &'static str, id: String, expected: u64, found: u64 },

    #[error("invalid {entity}: {reason}")]
    Invalid { entity: &'static str, reason: String },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound { .. } => ErrorKind::NotFound,
            StorageError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            StorageError::VersionConflict { .. } => ErrorKind::Conflict,
            StorageError::Invalid { .. } => ErrorKind::Validation,
            StorageError::Backend(_) => ErrorKind::Transient,
        }
    }
}

/// Sort specification from `?sort=field&order=asc|desc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Default)]
pub struct WorkspaceFilter {
    pub owner_id: Option<PrincipalId>,
    pub status: Option<WorkspaceStatus>,
    /// Soft-deleted rows are hidden unless explicitly requested.
    pub include_deleted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub project_id: Option<ProjectId>,
    pub status: Option<SessionStatus>,
    /// Restrict to live (non-terminal) sessions.
    pub live_only: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub session_id: Option<SessionId>,
    pub status: Option<TaskStatus>,
}

/// Aggregates for `GET /tasks/stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    pub total: u64,
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub avg_duration_ms: u64,
}

#[async_trait]
pub trait WorkspaceRepo: Send + Sync {
    async fn create(&self, record: WorkspaceRecord) -> Result<WorkspaceRecord, StorageError>;
    async fn get(&self, id: &WorkspaceId) -> Result<WorkspaceRecord, StorageError>;
    /// Optimistic update: `record.version` must be exactly one past the
    /// stored version (the caller bumped it via `WorkspaceRecord::bump`).
    async fn update(&self, record: WorkspaceRecord) -> Result<WorkspaceRecord, StorageError>;
    async fn soft_delete(&self, id: &WorkspaceId, now_ms: u64) -> Result<(), StorageError>;
    async fn list(
        &self,
        filter: WorkspaceFilter,
        sort: Option<Sort>,
        page: PageRequest,
    ) -> Result<Page<WorkspaceRecord>, StorageError>;
}

#[async_trait]
pub trait ProjectRepo: Send + Sync {
    async fn create(&self, record: ProjectRecord) -> Result<ProjectRecord, StorageError>;
    async fn get(&self, id: &ProjectId) -> Result<ProjectRecord, StorageError>;
    async fn update(&self, record: ProjectRecord) -> Result<ProjectRecord, StorageError>;
    async fn delete(&self, id: &ProjectId) -> Result<(), StorageError>;
    async fn list_by_workspace(
        &self,
        workspace_id: &WorkspaceId,
        page: PageRequest,
    ) -> Result<Page<ProjectRecord>, StorageError>;
}

#[async_trait]
pub trait SessionRepo: Send + Sync {
    async fn create(&self, record: SessionRecord) -> Result<SessionRecord, StorageError>;
    async fn get(&self, id: &SessionId) -> Result<SessionRecord, StorageError>;
    /// Sessions have a single writer (the session manager), so updates are
    /// last-write-wins rather than version-checked.
    async fn update(&self, record: SessionRecord) -> Result<SessionRecord, StorageError>;
    async fn list(
        &self,
        filter: SessionFilter,
        page: PageRequest,
    ) -> Result<Page<SessionRecord>, StorageError>;
    async fn list_live(&self) -> Result<Vec<SessionRecord>, StorageError>;
}

#[async_trait]
pub trait TaskRepo: Send + Sync {
    async fn create(&self, record: TaskRecord) -> Result<TaskRecord, StorageError>;
    async fn get(&self, id: &TaskId) -> Result<TaskRecord, StorageError>;
    async fn update(&self, record: TaskRecord) -> Result<TaskRecord, StorageError>;
    async fn list(
        &self,
        filter: TaskFilter,
        page: PageRequest,
    ) -> Result<Page<TaskRecord>, StorageError>;
    async fn list_active(&self) -> Result<Vec<TaskRecord>, StorageError>;
    async fn stats(&self) -> Result<TaskStats, StorageError>;
}

/// Bundle of every repository, cloned freely across subsystems.
#[derive(Clone)]
pub struct Repositories {
    pub workspaces: Arc<dyn WorkspaceRepo>,
    pub projects: Arc<dyn ProjectRepo>,
    pub sessions: Arc<dyn SessionRepo>,
    pub tasks: Arc<dyn TaskRepo>,
}

impl Repositories {
    /// In-memory engine for dev and tests.
    pub fn memory() -> Self {
        let store = Arc::new(crate::memory::MemoryStore::default());
        Self {
            workspaces: Arc::clone(&store) as Arc<dyn WorkspaceRepo>,
            projects: Arc::clone(&store) as Arc<dyn ProjectRepo>,
            sessions: Arc::clone(&store) as Arc<dyn SessionRepo>,
            tasks: store as Arc<dyn TaskRepo>,
        }
    }
}
