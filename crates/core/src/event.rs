// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle events disseminated through the broker.
//!
//! The session manager and the task executor emit these; the daemon
//! translates each into WebSocket frames on the channels returned by
//! [`Event::channels`]. Raw task output is relayed separately by the
//! executor and does not pass through this enum.

use crate::project::ProjectId;
use crate::session::{SessionId, SessionStatus};
use crate::task::{TaskId, TaskStatus};
use crate::workspace::WorkspaceId;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    SessionCreated {
        session_id: SessionId,
        project_id: ProjectId,
        workspace_id: WorkspaceId,
        at_ms: u64,
    },
    SessionStatusChanged {
        session_id: SessionId,
        workspace_id: WorkspaceId,
        from: SessionStatus,
        to: SessionStatus,
        at_ms: u64,
    },
    SessionEnded {
        session_id: SessionId,
        workspace_id: WorkspaceId,
        at_ms: u64,
    },
    TaskStarted {
        task_id: TaskId,
        session_id: SessionId,
        at_ms: u64,
    },
    TaskFinished {
        task_id: TaskId,
        session_id: SessionId,
        status: TaskStatus,
        duration_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        at_ms: u64,
    },
}

impl Event {
    /// Event name for logs and the WS frame `data.kind` field.
    pub fn name(&self) -> &'static str {
        match self {
            Event::SessionCreated { .. } => "session.created",
            Event::SessionStatusChanged { .. } => "session.status",
            Event::SessionEnded { .. } => "session.ended",
            Event::TaskStarted { .. } => "task.started",
            Event::TaskFinished { status, .. } => match status {
                TaskStatus::Completed => "task.completed",
                TaskStatus::Failed => "task.failed",
                TaskStatus::Cancelled => "task.cancelled",
                _ => "task.finished",
            },
        }
    }

    /// Channels this event is published on.
    pub fn channels(&self) -> Vec<SmolStr> {
        match self {
            Event::SessionCreated { session_id, workspace_id, .. }
            | Event::SessionStatusChanged { session_id, workspace_id, .. }
            | Event::SessionEnded { session_id, workspace_id, .. } => vec![
                SmolStr::new(format!("session:{session_id}")),
                SmolStr::new(format!("workspace:{workspace_id}")),
            ],
            Event::TaskStarted { task_id, session_id, .. }
            | Event::TaskFinished { task_id, session_id, .. } => vec![
                SmolStr::new(format!("task:{task_id}")),
                SmolStr::new(format!("session:{session_id}")),
            ],
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
