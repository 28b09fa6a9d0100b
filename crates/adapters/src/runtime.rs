// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container runtime abstraction.
//!
//! One agent subprocess per session. The runtime owns process handles and
//! pipes; the session manager sees only session IDs and a stream of
//! [`RuntimeEvent`]s per session. Output ordering within a session is the
//! pipe order; the `Exited` event is always last.

use aicli_core::SessionId;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc;

/// End-of-turn sentinel.
///
/// The agent signals end of turn by writing a line equal to this marker to
/// stdout. The RS (0x1e) prefix keeps it out of any plausible agent output.
/// Runtimes pass the marker to the agent via the `AICLI_EOT_MARKER`
/// environment variable.
pub const EOT_MARKER: &str = "\x1e[done]";

/// Environment variable carrying [`EOT_MARKER`] to the agent command.
pub const EOT_MARKER_ENV: &str = "AICLI_EOT_MARKER";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

/// One line of agent output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub stream: OutputStream,
    pub data: String,
}

impl OutputChunk {
    pub fn stdout(data: impl Into<String>) -> Self {
        Self { stream: OutputStream::Stdout, data: data.into() }
    }

    pub fn stderr(data: impl Into<String>) -> Self {
        Self { stream: OutputStream::Stderr, data: data.into() }
    }

    /// Whether this chunk is the end-of-turn sentinel.
    pub fn is_eot(&self) -> bool {
        self.stream == OutputStream::Stdout && self.data.trim_end() == EOT_MARKER
    }
}

/// Everything a session's supervisor needs to observe, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    Output(OutputChunk),
    /// A pipe read failed. The session manager counts these; the process
    /// may still be alive.
    ReadError { detail: String },
    /// The process exited. Terminal: no further events follow.
    Exited(ExitStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: Option<i32>,
}

/// Signals deliverable to an agent process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Interrupt the current turn (task cancellation).
    Interrupt,
    /// Ask the process to shut down.
    Terminate,
    /// Force kill after the grace period.
    Kill,
}

/// Instructions for spawning one agent process.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub session_id: SessionId,
    /// Agent CLI command line, run through the shell.
    pub command: String,
    pub workdir: PathBuf,
    pub env: Vec<(String, String)>,
    pub system_prompt: Option<String>,
}

impl SpawnSpec {
    pub fn new(session_id: SessionId, command: impl Into<String>, workdir: PathBuf) -> Self {
        Self { session_id, command: command.into(), workdir, env: Vec::new(), system_prompt: None }
    }
}

/// Errors from runtime operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("no agent process for session {0}")]
    NotFound(SessionId),

    #[error("stdin write failed: {0}")]
    StdinClosed(String),

    #[error("signal delivery failed: {0}")]
    SignalFailed(String),
}

/// Spawns and isolates agent processes.
///
/// Implementations keep the per-session process table; callers interact by
/// session ID only, so no process handle ever escapes this boundary.
#[async_trait]
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Spawn the agent for `spec.session_id`.
    ///
    /// Output lines, read errors, and the final exit arrive on `events_tx`.
    /// The channel is bounded by the caller; a full channel applies
    /// backpressure to the pipe readers, never to the child process.
    async fn spawn(
        &self,
        spec: SpawnSpec,
        events_tx: mpsc::Sender<RuntimeEvent>,
    ) -> Result<(), RuntimeError>;

    /// Write a command line to the agent's stdin.
    async fn send_stdin(&self, session_id: &SessionId, input: &str) -> Result<(), RuntimeError>;

    /// Deliver a signal to the agent process.
    async fn signal(&self, session_id: &SessionId, signal: Signal) -> Result<(), RuntimeError>;

    /// Whether the runtime still tracks a process for this session.
    async fn is_running(&self, session_id: &SessionId) -> bool;

    /// Drop all state for the session, killing the process if needed.
    async fn remove(&self, session_id: &SessionId);
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
