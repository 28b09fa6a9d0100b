// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task record and its status state machine.
//!
//! A task is one command executed in a session. Legal paths are
//! `pending → running → {completed, failed, cancelled}` and
//! `pending → cancelled`; status never regresses.

use crate::session::SessionId;
use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for a task.
    pub struct TaskId("tsk-");
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }

    /// Legal edges: pending→running, pending→cancelled, running→terminal.
    pub fn can_transition(self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, to) {
            (Pending, Running) | (Pending, Cancelled) => true,
            (Running, Completed) | (Running, Failed) | (Running, Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// One command executed in a session, with captured output and status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub session_id: SessionId,
    pub command: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
    pub duration_ms: u64,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub created_at: u64,
}

impl TaskRecord {
    pub fn new(session_id: SessionId, command: impl Into<String>, now_ms: u64) -> Self {
        Self {
            id: TaskId::generate(),
            session_id,
            command: command.into(),
            status: TaskStatus::Pending,
            started_at: None,
            completed_at: None,
            duration_ms: 0,
            output: String::new(),
            error_text: None,
            bytes_in: 0,
            bytes_out: 0,
            created_at: now_ms,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// pending → running. Returns false (and changes nothing) on an
    /// illegal edge, e.g. when the task was cancelled while queued.
    pub fn start(&mut self, now_ms: u64) -> bool {
        if !self.status.can_transition(TaskStatus::Running) {
            return false;
        }
        self.status = TaskStatus::Running;
        self.started_at = Some(now_ms);
        true
    }

    /// Move to a terminal state, recording completion time and duration.
    pub fn finish(&mut self, status: TaskStatus, error: Option<String>, now_ms: u64) -> bool {
        debug_assert!(status.is_terminal(), "finish called with non-terminal {status}");
        if !self.status.can_transition(status) {
            return false;
        }
        self.status = status;
        self.completed_at = Some(now_ms);
        self.duration_ms = now_ms.saturating_sub(self.started_at.unwrap_or(now_ms));
        self.error_text = error;
        true
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
