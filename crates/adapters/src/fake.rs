// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted runtime for tests: no processes, fully deterministic.
//!
//! By default every stdin line is echoed back on stdout followed by the
//! end-of-turn sentinel. Commands can be scripted to produce specific
//! output, to hang (for timeout and cancellation tests), and sessions can
//! be made to exit abruptly (for crash handling tests).

use crate::runtime::{
    ContainerRuntime, ExitStatus, OutputChunk, RuntimeError, RuntimeEvent, Signal, SpawnSpec,
    EOT_MARKER,
};
use aicli_core::SessionId;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Every call made against the fake, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Spawn(SessionId),
    Stdin(SessionId, String),
    Signal(SessionId, Signal),
    Remove(SessionId),
}

enum Script {
    /// Send these chunks, then the sentinel (when `eot`), after `delay`.
    Respond { chunks: Vec<OutputChunk>, eot: bool, delay: Option<std::time::Duration> },
    /// Produce nothing; the turn never ends on its own.
    Hang,
}

#[derive(Default)]
pub struct FakeRuntime {
    sessions: Mutex<HashMap<SessionId, mpsc::Sender<RuntimeEvent>>>,
    scripts: Mutex<HashMap<String, Script>>,
    fail_next_spawn: Mutex<Option<String>>,
    calls: Mutex<Vec<RuntimeCall>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a command to reply with these stdout lines, then end the turn.
    pub fn script(&self, command: impl Into<String>, lines: &[&str]) {
        let chunks = lines.iter().map(|l| OutputChunk::stdout(*l)).collect();
        self.scripts.lock().insert(command.into(), Script::Respond { chunks, eot: true, delay: None });
    }

    /// Script a command that replies only after `delay` has elapsed.
    pub fn script_with_delay(
        &self,
        command: impl Into<String>,
        lines: &[&str],
        delay: std::time::Duration,
    ) {
        let chunks = lines.iter().map(|l| OutputChunk::stdout(*l)).collect();
        self.scripts
            .lock()
            .insert(command.into(), Script::Respond { chunks, eot: true, delay: Some(delay) });
    }

    /// Script a command with explicit chunks and sentinel control.
    pub fn script_chunks(&self, command: impl Into<String>, chunks: Vec<OutputChunk>, eot: bool) {
        self.scripts.lock().insert(command.into(), Script::Respond { chunks, eot, delay: None });
    }

    /// Script a command to hang forever (until cancelled or killed).
    pub fn script_hang(&self, command: impl Into<String>) {
        self.scripts.lock().insert(command.into(), Script::Hang);
    }

    /// Make the next spawn fail with this reason.
    pub fn fail_next_spawn(&self, reason: impl Into<String>) {
        *self.fail_next_spawn.lock() = Some(reason.into());
    }

    /// Simulate the agent process exiting (crash or normal exit).
    pub async fn exit_session(&self, session_id: &SessionId, code: Option<i32>) {
        let tx = self.sessions.lock().remove(session_id);
        if let Some(tx) = tx {
            let _ = tx.send(RuntimeEvent::Exited(ExitStatus { code })).await;
        }
    }

    /// Inject a raw event into a live session's stream.
    pub async fn inject(&self, session_id: &SessionId, event: RuntimeEvent) {
        let tx = self.sessions.lock().get(session_id).cloned();
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: RuntimeCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn spawn(
        &self,
        spec: SpawnSpec,
        events_tx: mpsc::Sender<RuntimeEvent>,
    ) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::Spawn(spec.session_id));
        if let Some(reason) = self.fail_next_spawn.lock().take() {
            return Err(RuntimeError::SpawnFailed(reason));
        }
        self.sessions.lock().insert(spec.session_id, events_tx);
        Ok(())
    }

    async fn send_stdin(&self, session_id: &SessionId, input: &str) -> Result<(), RuntimeError> {
        let input = input.trim_end_matches('\n').to_string();
        self.record(RuntimeCall::Stdin(*session_id, input.clone()));

        let tx = self
            .sessions
            .lock()
            .get(session_id)
            .cloned()
            .ok_or(RuntimeError::NotFound(*session_id))?;

        let (response, delay): (Vec<OutputChunk>, Option<std::time::Duration>) = {
            let scripts = self.scripts.lock();
            match scripts.get(&input) {
                Some(Script::Hang) => return Ok(()),
                Some(Script::Respond { chunks, eot, delay }) => {
                    let mut out = chunks.clone();
                    if *eot {
                        out.push(OutputChunk::stdout(EOT_MARKER));
                    }
                    (out, *delay)
                }
                // Unscripted commands echo themselves, then end the turn.
                None => (vec![OutputChunk::stdout(input), OutputChunk::stdout(EOT_MARKER)], None),
            }
        };

        tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            for chunk in response {
                if tx.send(RuntimeEvent::Output(chunk)).await.is_err() {
                    break;
                }
            }
        });
        Ok(())
    }

    async fn signal(&self, session_id: &SessionId, signal: Signal) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::Signal(*session_id, signal));
        if !self.sessions.lock().contains_key(session_id) {
            return Err(RuntimeError::NotFound(*session_id));
        }
        // Terminate and kill end the fake process like a signal would.
        if matches!(signal, Signal::Terminate | Signal::Kill) {
            self.exit_session(session_id, None).await;
        }
        Ok(())
    }

    async fn is_running(&self, session_id: &SessionId) -> bool {
        self.sessions.lock().contains_key(session_id)
    }

    async fn remove(&self, session_id: &SessionId) {
        self.record(RuntimeCall::Remove(*session_id));
        self.sessions.lock().remove(session_id);
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
