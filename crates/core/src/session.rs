// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session record and its status state machine.
//!
//! A session is a live agent subprocess bound to a project. The record
//! never holds the process handle; that lives inside the session manager.
//!
//! ```text
//! pending ──spawn ok──► active ◄──activity──┐
//!    │                    │                 │
//!    │                    ├──no activity───► idle
//!    │                    ▼                 │
//!    │                  ending ── drain ──► ended
//!    └── spawn fail ──► error ── cleanup ─► ended
//! ```

use crate::project::ProjectId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

crate::define_id! {
    /// Unique identifier for an agent session.
    pub struct SessionId("ses-");
}

/// Status of a session in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Subprocess spawn requested, not yet ready.
    #[default]
    Pending,
    /// Subprocess ready; tasks may run.
    Active,
    /// No activity for the idle timeout; revived by the next task.
    Idle,
    /// Close in progress: output draining, process being stopped.
    Ending,
    /// Finalized. Sticky.
    Ended,
    /// Spawn failed or the process crashed; cleanup pending.
    Error,
}

impl SessionStatus {
    /// Terminal states are sticky: no transition leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Ended)
    }

    /// Live sessions count against `MaxConcurrentSessions`.
    pub fn is_live(&self) -> bool {
        !matches!(self, SessionStatus::Ended | SessionStatus::Error)
    }

    /// Whether a task may start in this state.
    pub fn accepts_tasks(&self) -> bool {
        matches!(self, SessionStatus::Active | SessionStatus::Idle)
    }

    /// Legal edges of the state machine.
    pub fn can_transition(self, to: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, to) {
            (Pending, Active) | (Pending, Error) => true,
            (Active, Idle) | (Idle, Active) => true,
            (Active, Ending) | (Idle, Ending) => true,
            // A crash can surface from any non-terminal state.
            (Pending, Ending) | (Active, Error) | (Idle, Error) | (Ending, Error) => true,
            (Ending, Ended) | (Error, Ended) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Active => "active",
            SessionStatus::Idle => "idle",
            SessionStatus::Ending => "ending",
            SessionStatus::Ended => "ended",
            SessionStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Rejected state-machine transition.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal session transition {from} -> {to}")]
pub struct TransitionError {
    pub from: SessionStatus,
    pub to: SessionStatus,
}

/// A live agent session bound to a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub project_id: ProjectId,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
    pub started_at: u64,
    pub last_active_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<u64>,
    pub command_count: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub error_count: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl SessionRecord {
    pub fn new(project_id: ProjectId, now_ms: u64) -> Self {
        Self {
            id: SessionId::generate(),
            project_id,
            status: SessionStatus::Pending,
            system_prompt: None,
            max_turns: None,
            started_at: now_ms,
            last_active_at: now_ms,
            ended_at: None,
            command_count: 0,
            bytes_in: 0,
            bytes_out: 0,
            error_count: 0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a checked state-machine transition.
    ///
    /// `Ended` sets `ended_at`; re-entering `Active` counts as activity.
    pub fn transition(&mut self, to: SessionStatus, now_ms: u64) -> Result<(), TransitionError> {
        if !self.status.can_transition(to) {
            return Err(TransitionError { from: self.status, to });
        }
        self.status = to;
        match to {
            SessionStatus::Ended => self.ended_at = Some(now_ms),
            SessionStatus::Active => self.last_active_at = now_ms,
            _ => {}
        }
        Ok(())
    }

    /// Record activity (task start, stdio frame).
    pub fn touch(&mut self, now_ms: u64) {
        self.last_active_at = now_ms;
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
