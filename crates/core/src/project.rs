// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project record: a path-identified code tree with agent configuration.

use crate::workspace::WorkspaceId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for a project.
    pub struct ProjectId("prj-");
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Active,
    Inactive,
    Archived,
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Inactive => "inactive",
            ProjectStatus::Archived => "archived",
        };
        write!(f, "{}", s)
    }
}

/// Git metadata captured when the project is registered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

/// Agent defaults applied to sessions created for this project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
}

/// A project: a path-identified code tree inside a workspace.
///
/// `(workspace_id, name)` is unique; `path` is unique across all projects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: ProjectId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_info: Option<GitInfo>,
    pub status: ProjectStatus,
    #[serde(default)]
    pub config: ProjectConfig,
    pub created_at: u64,
    pub updated_at: u64,
    pub version: u64,
}

impl ProjectRecord {
    pub fn new(
        workspace_id: WorkspaceId,
        name: impl Into<String>,
        path: PathBuf,
        now_ms: u64,
    ) -> Self {
        Self {
            id: ProjectId::generate(),
            workspace_id,
            name: name.into(),
            path,
            language: None,
            git_info: None,
            status: ProjectStatus::Active,
            config: ProjectConfig::default(),
            created_at: now_ms,
            updated_at: now_ms,
            version: 1,
        }
    }

    pub fn bump(&mut self, now_ms: u64) {
        self.updated_at = now_ms;
        self.version += 1;
    }
}

#[cfg(test)]
#[path = "project_tests.rs"]
mod tests;
