// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local subprocess runtime.
//!
//! Runs the agent command through the shell with piped stdio. Two reader
//! tasks pump stdout/stderr lines into the session's event channel; a
//! watcher task reaps the child and emits the terminal `Exited` event after
//! both readers finish, so output is never lost behind the exit.

use crate::runtime::{
    ContainerRuntime, ExitStatus, OutputChunk, OutputStream, RuntimeError, RuntimeEvent, Signal,
    SpawnSpec, EOT_MARKER, EOT_MARKER_ENV,
};
use aicli_core::SessionId;
use async_trait::async_trait;
use nix::sys::signal::{kill, Signal as NixSignal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;

#[derive(Default, Clone)]
pub struct LocalProcessRuntime {
    inner: Arc<Mutex<HashMap<SessionId, ProcEntry>>>,
}

struct ProcEntry {
    /// Async-locked so a write in flight never blocks the table lock.
    stdin: Arc<tokio::sync::Mutex<ChildStdin>>,
    pid: Option<i32>,
}

impl LocalProcessRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn pid_of(&self, session_id: &SessionId) -> Result<i32, RuntimeError> {
        let inner = self.inner.lock();
        let entry = inner.get(session_id).ok_or(RuntimeError::NotFound(*session_id))?;
        entry.pid.ok_or_else(|| RuntimeError::SignalFailed("process already reaped".to_string()))
    }
}

#[async_trait]
impl ContainerRuntime for LocalProcessRuntime {
    async fn spawn(
        &self,
        spec: SpawnSpec,
        events_tx: mpsc::Sender<RuntimeEvent>,
    ) -> Result<(), RuntimeError> {
        if !spec.workdir.is_dir() {
            return Err(RuntimeError::SpawnFailed(format!(
                "working directory does not exist: {}",
                spec.workdir.display()
            )));
        }

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(&spec.command)
            .current_dir(&spec.workdir)
            .env(EOT_MARKER_ENV, EOT_MARKER)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        if let Some(prompt) = &spec.system_prompt {
            cmd.env("AICLI_SYSTEM_PROMPT", prompt);
        }

        let mut child =
            cmd.spawn().map_err(|e| RuntimeError::SpawnFailed(format!("{}: {e}", spec.command)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RuntimeError::SpawnFailed("stdin pipe missing".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::SpawnFailed("stdout pipe missing".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RuntimeError::SpawnFailed("stderr pipe missing".to_string()))?;

        let pid = child.id().map(|p| p as i32);
        self.inner
            .lock()
            .insert(spec.session_id, ProcEntry { stdin: Arc::new(tokio::sync::Mutex::new(stdin)), pid });

        let stdout_done = spawn_reader(spec.session_id, OutputStream::Stdout, stdout, events_tx.clone());
        let stderr_done = spawn_reader(spec.session_id, OutputStream::Stderr, stderr, events_tx.clone());

        spawn_watcher(spec.session_id, child, stdout_done, stderr_done, events_tx, Arc::clone(&self.inner));

        tracing::info!(session_id = %spec.session_id, pid = ?pid, "agent process spawned");
        Ok(())
    }

    async fn send_stdin(&self, session_id: &SessionId, input: &str) -> Result<(), RuntimeError> {
        let stdin = self
            .inner
            .lock()
            .get(session_id)
            .map(|entry| Arc::clone(&entry.stdin))
            .ok_or(RuntimeError::NotFound(*session_id))?;

        let mut stdin = stdin.lock().await;
        let result = async {
            stdin.write_all(input.as_bytes()).await?;
            if !input.ends_with('\n') {
                stdin.write_all(b"\n").await?;
            }
            stdin.flush().await
        }
        .await;
        result.map_err(|e| RuntimeError::StdinClosed(e.to_string()))
    }

    async fn signal(&self, session_id: &SessionId, signal: Signal) -> Result<(), RuntimeError> {
        let pid = self.pid_of(session_id)?;
        eprintln!("DEBUG signal: pid={pid}");
        let nix_signal = match signal {
            Signal::Interrupt => NixSignal::SIGINT,
            Signal::Terminate => NixSignal::SIGTERM,
            Signal::Kill => NixSignal::SIGKILL,
        };
        let r = kill(Pid::from_raw(pid), nix_signal)
            .map_err(|e| RuntimeError::SignalFailed(format!("kill({pid}, {nix_signal}): {e}")));
        eprintln!("DEBUG signal result: {:?}", r);
        r
    }

    async fn is_running(&self, session_id: &SessionId) -> bool {
        self.inner.lock().contains_key(session_id)
    }

    async fn remove(&self, session_id: &SessionId) {
        let entry = self.inner.lock().remove(session_id);
        if let Some(entry) = entry {
            if let Some(pid) = entry.pid {
                // The watcher task reaps the exit; we only make sure the
                // process is gone.
                let _ = kill(Pid::from_raw(pid), NixSignal::SIGKILL);
            }
        }
    }
}

/// Pump one pipe line-by-line into the event channel.
///
/// Returns a receiver that resolves when the pipe reaches EOF, so the
/// watcher can order `Exited` after the last output line.
fn spawn_reader(
    session_id: SessionId,
    stream: OutputStream,
    pipe: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    events_tx: mpsc::Sender<RuntimeEvent>,
) -> tokio::sync::oneshot::Receiver<()> {
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        eprintln!("DEBUG reader {:?} started", stream);
        let mut lines = BufReader::new(pipe).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let chunk = OutputChunk { stream, data: line };
                    if events_tx.send(RuntimeEvent::Output(chunk)).await.is_err() {
                        break; // supervisor gone
                    }
                }
                Ok(None) => { eprintln!("DEBUG reader {:?} EOF", stream); break } // EOF
                Err(e) => {
                    tracing::warn!(%session_id, stream = stream.as_str(), error = %e, "pipe read error");
                    let event = RuntimeEvent::ReadError { detail: e.to_string() };
                    if events_tx.send(event).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = done_tx.send(());
    });
    done_rx
}

/// Reap the child and emit the terminal `Exited` event.
fn spawn_watcher(
    session_id: SessionId,
    mut child: Child,
    stdout_done: tokio::sync::oneshot::Receiver<()>,
    stderr_done: tokio::sync::oneshot::Receiver<()>,
    events_tx: mpsc::Sender<RuntimeEvent>,
    table: Arc<Mutex<HashMap<SessionId, ProcEntry>>>,
) {
    tokio::spawn(async move {
        eprintln!("DEBUG watcher: waiting on child");
        let status = child.wait().await;
        eprintln!("DEBUG watcher: child exited status={:?}", status);
        // Let both readers drain before the exit event.
        let _ = stdout_done.await;
        eprintln!("DEBUG watcher: stdout done");
        let _ = stderr_done.await;
        eprintln!("DEBUG watcher: stderr done");

        let code = match status {
            Ok(status) => status.code(),
            Err(e) => {
                tracing::error!(%session_id, error = %e, "failed to wait on agent process");
                None
            }
        };
        tracing::info!(%session_id, exit_code = ?code, "agent process exited");

        // Clear the pid so late signals don't hit a recycled process id.
        if let Some(entry) = table.lock().get_mut(&session_id) {
            entry.pid = None;
        }
        let _ = events_tx.send(RuntimeEvent::Exited(ExitStatus { code })).await;
    });
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
