// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory repository engine.
//!
//! Reader-writer locked maps per entity. Lists clone matching records out
//! of the lock, then sort and paginate outside it.

use crate::repo::{
    ProjectRepo, SessionFilter, SessionRepo, Sort, StorageError, TaskFilter, TaskRepo, TaskStats,
    WorkspaceFilter, WorkspaceRepo,
};
use aicli_core::{
    Page, PageRequest, ProjectId, ProjectRecord, SessionId, SessionRecord, SortOrder, TaskId,
    TaskRecord, TaskStatus, WorkspaceId, WorkspaceRecord,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct MemoryStore {
    workspaces: RwLock<HashMap<WorkspaceId, WorkspaceRecord>>,
    projects: RwLock<HashMap<ProjectId, ProjectRecord>>,
    sessions: RwLock<HashMap<SessionId, SessionRecord>>,
    tasks: RwLock<HashMap<TaskId, TaskRecord>>,
}

fn not_found(entity: &'static str, id: impl std::fmt::Display) -> StorageError {
    StorageError::NotFound { entity, id: id.to_string() }
}

/// Version check shared by the optimistic-update paths.
fn check_version(
    entity: &'static str,
    id: impl std::fmt::Display,
    stored: u64,
    incoming: u64,
) -> Result<(), StorageError> {
    if incoming != stored + 1 {
        return Err(StorageError::VersionConflict {
            entity,
            id: id.to_string(),
            expected: stored + 1,
            found: incoming,
        });
    }
    Ok(())
}

#[async_trait]
impl WorkspaceRepo for MemoryStore {
    async fn create(&self, record: WorkspaceRecord) -> Result<WorkspaceRecord, StorageError> {
        let mut map = self.workspaces.write();
        let duplicate = map.values().any(|existing| {
            !existing.is_deleted()
                && existing.owner_id == record.owner_id
                && existing.name == record.name
        });
        if duplicate {
            return Err(StorageError::AlreadyExists {
                entity: "workspace",
                detail: format!("name {:?} for owner {}", record.name, record.owner_id),
            });
        }
        tracing::debug!(workspace_id = %record.id, name = %record.name, "workspace stored");
        map.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: &WorkspaceId) -> Result<WorkspaceRecord, StorageError> {
        self.workspaces.read().get(id).cloned().ok_or_else(|| not_found("workspace", id))
    }

    async fn update(&self, record: WorkspaceRecord) -> Result<WorkspaceRecord, StorageError> {
        let mut map = self.workspaces.write();
        let stored = map.get(&record.id).ok_or_else(|| not_found("workspace", record.id))?;
        check_version("workspace", record.id, stored.version, record.version)?;
        map.insert(record.id, record.clone());
        Ok(record)
    }

    async fn soft_delete(&self, id: &WorkspaceId, now_ms: u64) -> Result<(), StorageError> {
        let mut map = self.workspaces.write();
        let stored = map.get_mut(id).ok_or_else(|| not_found("workspace", id))?;
        if !stored.is_deleted() {
            stored.soft_delete(now_ms);
            tracing::debug!(workspace_id = %id, "workspace soft-deleted");
        }
        Ok(())
    }

    async fn list(
        &self,
        filter: WorkspaceFilter,
        sort: Option<Sort>,
        page: PageRequest,
    ) -> Result<Page<WorkspaceRecord>, StorageError> {
        let mut items: Vec<WorkspaceRecord> = self
            .workspaces
            .read()
            .values()
            .filter(|ws| filter.include_deleted || !ws.is_deleted())
            .filter(|ws| filter.owner_id.is_none_or(|owner| ws.owner_id == owner))
            .filter(|ws| filter.status.is_none_or(|status| ws.status == status))
            .cloned()
            .collect();

        sort_workspaces(&mut items, sort)?;
        Ok(Page::slice(items, page))
    }
}

fn sort_workspaces(items: &mut [WorkspaceRecord], sort: Option<Sort>) -> Result<(), StorageError> {
    let Some(sort) = sort else {
        items.sort_by_key(|ws| ws.created_at);
        return Ok(());
    };
    match sort.field.as_str() {
        "name" => items.sort_by(|a, b| a.name.cmp(&b.name)),
        "created_at" => items.sort_by_key(|ws| ws.created_at),
        "updated_at" => items.sort_by_key(|ws| ws.updated_at),
        other => {
            return Err(StorageError::Invalid {
                entity: "workspace",
                reason: format!("unknown sort field: {}", other),
            })
        }
    }
    if sort.order == SortOrder::Desc {
        items.reverse();
    }
    Ok(())
}

#[async_trait]
impl ProjectRepo for MemoryStore {
    async fn create(&self, record: ProjectRecord) -> Result<ProjectRecord, StorageError> {
        let mut map = self.projects.write();
        for existing in map.values() {
            if existing.workspace_id == record.workspace_id && existing.name == record.name {
                return Err(StorageError::AlreadyExists {
                    entity: "project",
                    detail: format!("name {:?} in workspace {}", record.name, record.workspace_id),
                });
            }
            if existing.path == record.path {
                return Err(StorageError::AlreadyExists {
                    entity: "project",
                    detail: format!("path {}", record.path.display()),
                });
            }
        }
        map.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: &ProjectId) -> Result<ProjectRecord, StorageError> {
        self.projects.read().get(id).cloned().ok_or_else(|| not_found("project", id))
    }

    async fn update(&self, record: ProjectRecord) -> Result<ProjectRecord, StorageError> {
        let mut map = self.projects.write();
        let stored = map.get(&record.id).ok_or_else(|| not_found("project", record.id))?;
        check_version("project", record.id, stored.version, record.version)?;
        map.insert(record.id, record.clone());
        Ok(record)
    }

    async fn delete(&self, id: &ProjectId) -> Result<(), StorageError> {
        self.projects.write().remove(id).map(|_| ()).ok_or_else(|| not_found("project", id))
    }

    async fn list_by_workspace(
        &self,
        workspace_id: &WorkspaceId,
        page: PageRequest,
    ) -> Result<Page<ProjectRecord>, StorageError> {
        let mut items: Vec<ProjectRecord> = self
            .projects
            .read()
            .values()
            .filter(|p| p.workspace_id == *workspace_id)
            .cloned()
            .collect();
        items.sort_by_key(|p| p.created_at);
        Ok(Page::slice(items, page))
    }
}

#[async_trait]
impl SessionRepo for MemoryStore {
    async fn create(&self, record: SessionRecord) -> Result<SessionRecord, StorageError> {
        self.sessions.write().insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: &SessionId) -> Result<SessionRecord, StorageError> {
        self.sessions.read().get(id).cloned().ok_or_else(|| not_found("session", id))
    }

    async fn update(&self, record: SessionRecord) -> Result<SessionRecord, StorageError> {
        let mut map = self.sessions.write();
        if !map.contains_key(&record.id) {
            return Err(not_found("session", record.id));
        }
        map.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list(
        &self,
        filter: SessionFilter,
        page: PageRequest,
    ) -> Result<Page<SessionRecord>, StorageError> {
        let mut items: Vec<SessionRecord> = self
            .sessions
            .read()
            .values()
            .filter(|s| filter.project_id.is_none_or(|p| s.project_id == p))
            .filter(|s| filter.status.is_none_or(|status| s.status == status))
            .filter(|s| !filter.live_only || s.status.is_live())
            .cloned()
            .collect();
        items.sort_by_key(|s| s.started_at);
        Ok(Page::slice(items, page))
    }

    async fn list_live(&self) -> Result<Vec<SessionRecord>, StorageError> {
        let mut items: Vec<SessionRecord> =
            self.sessions.read().values().filter(|s| s.status.is_live()).cloned().collect();
        items.sort_by_key(|s| s.started_at);
        Ok(items)
    }
}

#[async_trait]
impl TaskRepo for MemoryStore {
    async fn create(&self, record: TaskRecord) -> Result<TaskRecord, StorageError> {
        self.tasks.write().insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: &TaskId) -> Result<TaskRecord, StorageError> {
        self.tasks.read().get(id).cloned().ok_or_else(|| not_found("task", id))
    }

    async fn update(&self, record: TaskRecord) -> Result<TaskRecord, StorageError> {
        let mut map = self.tasks.write();
        if !map.contains_key(&record.id) {
            return Err(not_found("task", record.id));
        }
        map.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list(
        &self,
        filter: TaskFilter,
        page: PageRequest,
    ) -> Result<Page<TaskRecord>, StorageError> {
        let mut items: Vec<TaskRecord> = self
            .tasks
            .read()
            .values()
            .filter(|t| filter.session_id.is_none_or(|s| t.session_id == s))
            .filter(|t| filter.status.is_none_or(|status| t.status == status))
            .cloned()
            .collect();
        items.sort_by_key(|t| t.created_at);
        Ok(Page::slice(items, page))
    }

    async fn list_active(&self) -> Result<Vec<TaskRecord>, StorageError> {
        let mut items: Vec<TaskRecord> = self
            .tasks
            .read()
            .values()
            .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::Running))
            .cloned()
            .collect();
        items.sort_by_key(|t| t.created_at);
        Ok(items)
    }

    async fn stats(&self) -> Result<TaskStats, StorageError> {
        let map = self.tasks.read();
        let mut stats = TaskStats { total: map.len() as u64, ..TaskStats::default() };
        let mut finished = 0u64;
        let mut duration_sum = 0u64;
        for task in map.values() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
            if task.status.is_terminal() && task.started_at.is_some() {
                finished += 1;
                duration_sum += task.duration_ms;
            }
        }
        if finished > 0 {
            stats.avg_duration_ms = duration_sum / finished;
        }
        Ok(stats)
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
