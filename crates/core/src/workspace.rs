// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace record and lifecycle status.
//!
//! A workspace is an owner-scoped container for projects. Deletion is soft:
//! the record stays behind with `status = deleted` so ID references in task
//! history keep resolving.

use crate::principal::PrincipalId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for a workspace.
    pub struct WorkspaceId("wks-");
}

/// Lifecycle status of a workspace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceStatus {
    #[default]
    Active,
    Inactive,
    Archived,
    Deleted,
}

impl fmt::Display for WorkspaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkspaceStatus::Active => "active",
            WorkspaceStatus::Inactive => "inactive",
            WorkspaceStatus::Archived => "archived",
            WorkspaceStatus::Deleted => "deleted",
        };
        write!(f, "{}", s)
    }
}

/// A workspace: owner-scoped container for projects.
///
/// Invariants enforced by the repository layer: `(owner_id, name)` is unique
/// among non-deleted rows, and `project_path` exists on disk at create time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceRecord {
    pub id: WorkspaceId,
    pub name: String,
    pub owner_id: PrincipalId,
    pub project_path: PathBuf,
    pub status: WorkspaceStatus,
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<u64>,
    /// Optimistic concurrency version, bumped on every mutation.
    pub version: u64,
}

impl WorkspaceRecord {
    pub fn new(
        name: impl Into<String>,
        owner_id: PrincipalId,
        project_path: PathBuf,
        now_ms: u64,
    ) -> Self {
        Self {
            id: WorkspaceId::generate(),
            name: name.into(),
            owner_id,
            project_path,
            status: WorkspaceStatus::Active,
            created_at: now_ms,
            updated_at: now_ms,
            deleted_at: None,
            version: 1,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.status == WorkspaceStatus::Deleted
    }

    /// Soft-delete: keeps the row, marks it deleted.
    pub fn soft_delete(&mut self, now_ms: u64) {
        self.status = WorkspaceStatus::Deleted;
        self.deleted_at = Some(now_ms);
        self.bump(now_ms);
    }

    /// Record a mutation: bump version and `updated_at`.
    pub fn bump(&mut self, now_ms: u64) {
        self.updated_at = now_ms;
        self.version += 1;
    }
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
