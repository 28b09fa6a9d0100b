// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session manager: exclusive owner of every session's lifecycle.
//!
//! The manager holds the live-session table, enforces the concurrency cap,
//! spawns agent processes through the [`ContainerRuntime`], and runs the
//! state machine. Each live session has a supervisor task pumping runtime
//! events; the janitor sweeps idle and over-lifetime sessions.

mod janitor;
mod supervisor;

pub use janitor::spawn_janitor;

use aicli_adapters::{ContainerRuntime, OutputChunk, RuntimeError, Signal, SpawnSpec};
use aicli_core::{
    Clock, ErrorKind, Event, Page, PageRequest, ProjectRecord, SessionId, SessionRecord,
    SessionStatus, WorkspaceId,
};
use aicli_storage::{Repositories, SessionFilter, StorageError};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Session manager tunables, extracted from the daemon configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_sessions: usize,
    pub idle_timeout: Duration,
    pub lifetime: Duration,
    pub cleanup_interval: Duration,
    pub kill_grace: Duration,
    /// Per-session output chunk buffer (chunks).
    pub output_buffer: usize,
    /// Shell command that launches the agent CLI.
    pub agent_command: String,
}

impl From<&crate::config::SessionsConfig> for SessionConfig {
    fn from(c: &crate::config::SessionsConfig) -> Self {
        Self {
            max_sessions: c.max_sessions,
            idle_timeout: c.idle_timeout,
            lifetime: c.lifetime,
            cleanup_interval: c.cleanup_interval,
            kill_grace: c.kill_grace,
            output_buffer: c.output_buffer,
            agent_command: c.agent_command.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(SessionId),

    #[error("session already ended: {0}")]
    AlreadyEnded(SessionId),

    #[error("session limit reached ({0})")]
    MaxSessions(usize),

    #[error("session {id} is {status}")]
    InvalidState { id: SessionId, status: SessionStatus },

    #[error("agent spawn failed: {0}")]
    Spawn(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::NotFound(_) => ErrorKind::NotFound,
            SessionError::AlreadyEnded(_) => ErrorKind::Conflict,
            SessionError::MaxSessions(_) => ErrorKind::Capacity,
            SessionError::InvalidState { .. } => ErrorKind::Conflict,
            SessionError::Spawn(_) => ErrorKind::Fatal,
            SessionError::Storage(e) => e.kind(),
            SessionError::Runtime(_) => ErrorKind::Transient,
        }
    }
}

/// Per-session stream fanned out to the executor.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Output(OutputChunk),
    Exited(Option<i32>),
}

/// Permission to run one task in a session.
///
/// Holding the grant holds the session's task lock, which is what
/// serializes tasks per session. Dropping it releases the slot.
#[derive(Debug)]
pub struct TaskGrant {
    pub stream: broadcast::Receiver<StreamEvent>,
    /// Child of the session token: session close cancels every task.
    pub cancel: CancellationToken,
    /// Time left before the session's lifetime cap.
    pub remaining_lifetime: Duration,
    _serialize: tokio::sync::OwnedMutexGuard<()>,
}

pub(crate) struct SessionSlot {
    pub record: Mutex<SessionRecord>,
    pub workspace_id: WorkspaceId,
    pub stream: broadcast::Sender<StreamEvent>,
    /// Session-scoped; task tokens are children.
    pub cancel: CancellationToken,
    /// Serializes `close` and the supervisor's finalization.
    pub close_lock: tokio::sync::Mutex<()>,
    /// At most one running task per session.
    pub task_lock: Arc<tokio::sync::Mutex<()>>,
    /// Flips to true once the record is finalized and the slot removed.
    pub ended: watch::Sender<bool>,
}

pub struct SessionManager<C: Clock> {
    repos: Repositories,
    runtime: Arc<dyn ContainerRuntime>,
    clock: C,
    config: SessionConfig,
    table: RwLock<HashMap<SessionId, Arc<SessionSlot>>>,
    events_tx: mpsc::Sender<Event>,
}

impl<C: Clock> SessionManager<C> {
    pub fn new(
        repos: Repositories,
        runtime: Arc<dyn ContainerRuntime>,
        clock: C,
        config: SessionConfig,
        events_tx: mpsc::Sender<Event>,
    ) -> Arc<Self> {
        Arc::new(Self { repos, runtime, clock, config, table: RwLock::new(HashMap::new()), events_tx })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Live (non-terminal) session count; what the cap is enforced against.
    pub fn live_count(&self) -> usize {
        self.table.read().len()
    }

    /// IDs of every live session (shutdown closes them in turn).
    pub fn live_ids(&self) -> Vec<SessionId> {
        self.table.read().keys().copied().collect()
    }

    /// Create a session for a project and spawn its agent.
    pub async fn create(
        self: &Arc<Self>,
        project: &ProjectRecord,
    ) -> Result<SessionRecord, SessionError> {
        let now = self.clock.epoch_ms();
        let mut record = SessionRecord::new(project.id, now);
        record.system_prompt = project.config.system_prompt.clone();
        record.max_turns = project.config.max_turns;

        let (events_tx, events_rx) = mpsc::channel(self.config.output_buffer);
        let slot = Arc::new(SessionSlot {
            record: Mutex::new(record.clone()),
            workspace_id: project.workspace_id,
            stream: broadcast::channel(self.config.output_buffer).0,
            cancel: CancellationToken::new(),
            close_lock: tokio::sync::Mutex::new(()),
            task_lock: Arc::new(tokio::sync::Mutex::new(())),
            ended: watch::channel(false).0,
        });

        // Cap check and insert are atomic under the write lock.
        {
            let mut table = self.table.write();
            if table.len() >= self.config.max_sessions {
                return Err(SessionError::MaxSessions(self.config.max_sessions));
            }
            table.insert(record.id, Arc::clone(&slot));
        }

        if let Err(e) = self.repos.sessions.create(record.clone()).await {
            self.table.write().remove(&record.id);
            return Err(e.into());
        }
        self.emit(Event::SessionCreated {
            session_id: record.id,
            project_id: project.id,
            workspace_id: project.workspace_id,
            at_ms: now,
        });

        let spec = SpawnSpec {
            session_id: record.id,
            command: self.config.agent_command.clone(),
            workdir: project.path.clone(),
            env: Vec::new(),
            system_prompt: record.system_prompt.clone(),
        };

        if let Err(e) = self.runtime.spawn(spec, events_tx).await {
            warn!(session_id = %record.id, error = %e, "agent spawn failed");
            self.transition(&slot, SessionStatus::Error).await;
            self.finalize(&record.id, &slot).await;
            return Err(SessionError::Spawn(e.to_string()));
        }

        // Runtime reported ready.
        self.transition(&slot, SessionStatus::Active).await;
        supervisor::spawn(Arc::clone(self), record.id, events_rx);

        info!(session_id = %record.id, project_id = %project.id, "session created");
        Ok(self.snapshot(&slot))
    }

    pub async fn get(&self, id: &SessionId) -> Result<SessionRecord, SessionError> {
        Ok(self.repos.sessions.get(id).await?)
    }

    pub async fn list(
        &self,
        filter: SessionFilter,
        page: PageRequest,
    ) -> Result<Page<SessionRecord>, SessionError> {
        Ok(self.repos.sessions.list(filter, page).await?)
    }

    pub async fn list_active(&self) -> Result<Vec<SessionRecord>, SessionError> {
        Ok(self.repos.sessions.list_live().await?)
    }

    /// Record session activity (`PUT /sessions/{id}/activity`, task frames).
    pub async fn touch(&self, id: &SessionId) -> Result<(), SessionError> {
        let slot = self.slot(id)?;
        let record = {
            let mut record = slot.record.lock();
            record.touch(self.clock.epoch_ms());
            record.clone()
        };
        self.repos.sessions.update(record).await?;
        Ok(())
    }

    /// Close a session: idempotent, `ending → ended` happens exactly once.
    pub async fn close(&self, id: &SessionId) -> Result<(), SessionError> {
        let Some(slot) = self.table.read().get(id).cloned() else {
            // Not live: distinguish "ended earlier" from "never existed".
            return match self.repos.sessions.get(id).await {
                Ok(record) if record.is_terminal() => Err(SessionError::AlreadyEnded(*id)),
                Ok(_) | Err(StorageError::NotFound { .. }) => Err(SessionError::NotFound(*id)),
                Err(e) => Err(e.into()),
            };
        };

        // Serialize concurrent closes; only the first transitions to ending.
        {
            let _guard = slot.close_lock.lock().await;
            let status = slot.record.lock().status;
            if status.is_terminal() {
                return Err(SessionError::AlreadyEnded(*id));
            }
            if status != SessionStatus::Ending {
                self.transition(&slot, SessionStatus::Ending).await;
            }
        }

        slot.cancel.cancel();
        self.stop_process(id).await;
        self.await_ended(id, &slot).await;
        Ok(())
    }

    /// SIGTERM, then SIGKILL after the grace period if still alive.
    async fn stop_process(&self, id: &SessionId) {
        if !self.runtime.is_running(id).await {
            return;
        }
        if let Err(e) = self.runtime.signal(id, Signal::Terminate).await {
            debug!(session_id = %id, error = %e, "terminate signal failed");
        }
        let runtime = Arc::clone(&self.runtime);
        let grace = self.config.kill_grace;
        let id = *id;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if runtime.is_running(&id).await {
                warn!(session_id = %id, "grace expired, killing agent");
                let _ = runtime.signal(&id, Signal::Kill).await;
            }
        });
    }

    /// Wait for the supervisor to finalize; force it if nothing arrives.
    async fn await_ended(&self, id: &SessionId, slot: &Arc<SessionSlot>) {
        let mut ended = slot.ended.subscribe();
        let deadline = self.config.kill_grace * 2 + Duration::from_secs(1);
        let done = tokio::time::timeout(deadline, async {
            while !*ended.borrow_and_update() {
                if ended.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;
        if done.is_err() {
            warn!(session_id = %id, "exit event never arrived, forcing finalization");
            self.finalize(id, slot).await;
        }
    }

    /// Reserve the session for one task. Idle sessions re-activate.
    pub async fn begin_task(&self, id: &SessionId) -> Result<TaskGrant, SessionError> {
        let slot = self.slot(id)?;
        let serialize = Arc::clone(&slot.task_lock).lock_owned().await;

        let (status, started_at) = {
            let record = slot.record.lock();
            (record.status, record.started_at)
        };
        if !status.accepts_tasks() {
            return Err(SessionError::InvalidState { id: *id, status });
        }
        if status == SessionStatus::Idle {
            self.transition(&slot, SessionStatus::Active).await;
        } else {
            self.touch(id).await?;
        }

        let elapsed = self.clock.epoch_ms().saturating_sub(started_at);
        let remaining_lifetime =
            self.config.lifetime.saturating_sub(Duration::from_millis(elapsed));

        Ok(TaskGrant {
            stream: slot.stream.subscribe(),
            cancel: slot.cancel.child_token(),
            remaining_lifetime,
            _serialize: serialize,
        })
    }

    /// Write a command to the session's stdin, with activity accounting.
    pub async fn send_command(&self, id: &SessionId, command: &str) -> Result<(), SessionError> {
        let slot = self.slot(id)?;
        self.runtime.send_stdin(id, command).await?;
        let record = {
            let mut record = slot.record.lock();
            record.command_count += 1;
            record.bytes_in += command.len() as u64 + 1;
            record.touch(self.clock.epoch_ms());
            record.clone()
        };
        self.repos.sessions.update(record).await?;
        Ok(())
    }

    /// Interrupt the current turn (task cancellation).
    pub async fn interrupt(&self, id: &SessionId) {
        if let Err(e) = self.runtime.signal(id, Signal::Interrupt).await {
            debug!(session_id = %id, error = %e, "interrupt failed");
        }
    }

    /// Janitor sweep: idle and lifetime enforcement. Lifetime wins.
    pub async fn sweep(&self) {
        let now = self.clock.epoch_ms();
        let slots: Vec<(SessionId, Arc<SessionSlot>)> =
            self.table.read().iter().map(|(id, slot)| (*id, Arc::clone(slot))).collect();

        let mut to_close = Vec::new();
        for (id, slot) in slots {
            let (status, started_at, last_active_at) = {
                let record = slot.record.lock();
                (record.status, record.started_at, record.last_active_at)
            };
            if status.is_terminal() {
                continue;
            }
            let age = Duration::from_millis(now.saturating_sub(started_at));
            let idle_for = Duration::from_millis(now.saturating_sub(last_active_at));

            if age > self.config.lifetime {
                info!(session_id = %id, "lifetime exceeded, closing");
                to_close.push(id);
            } else if status == SessionStatus::Active && idle_for > self.config.idle_timeout {
                debug!(session_id = %id, "idle timeout, marking idle");
                self.transition(&slot, SessionStatus::Idle).await;
            }
        }

        for id in to_close {
            match self.close(&id).await {
                Ok(()) | Err(SessionError::AlreadyEnded(_)) | Err(SessionError::NotFound(_)) => {}
                Err(e) => warn!(session_id = %id, error = %e, "janitor close failed"),
            }
        }
    }

    fn slot(&self, id: &SessionId) -> Result<Arc<SessionSlot>, SessionError> {
        self.table.read().get(id).cloned().ok_or(SessionError::NotFound(*id))
    }

    fn snapshot(&self, slot: &SessionSlot) -> SessionRecord {
        slot.record.lock().clone()
    }

    /// Apply a legal transition, persist, and publish the status event.
    pub(crate) async fn transition(&self, slot: &Arc<SessionSlot>, to: SessionStatus) {
        let now = self.clock.epoch_ms();
        let (from, record) = {
            let mut record = slot.record.lock();
            let from = record.status;
            if let Err(e) = record.transition(to, now) {
                debug!(error = %e, "transition skipped");
                return;
            }
            (from, record.clone())
        };
        if let Err(e) = self.repos.sessions.update(record.clone()).await {
            warn!(session_id = %record.id, error = %e, "failed to persist session transition");
        }
        self.emit(Event::SessionStatusChanged {
            session_id: record.id,
            workspace_id: slot.workspace_id,
            from,
            to,
            at_ms: now,
        });
    }

    /// Drain done: finalize the record, drop the slot, notify waiters.
    /// Idempotent under the close lock.
    pub(crate) async fn finalize(&self, id: &SessionId, slot: &Arc<SessionSlot>) {
        let _guard = slot.close_lock.lock().await;
        {
            let status = slot.record.lock().status;
            if status.is_terminal() {
                return;
            }
            if !matches!(status, SessionStatus::Ending | SessionStatus::Error) {
                self.transition(slot, SessionStatus::Ending).await;
            }
        }
        self.transition(slot, SessionStatus::Ended).await;

        self.runtime.remove(id).await;
        self.table.write().remove(id);
        let _ = slot.ended.send(true);
        self.emit(Event::SessionEnded {
            session_id: *id,
            workspace_id: slot.workspace_id,
            at_ms: self.clock.epoch_ms(),
        });
        info!(session_id = %id, "session ended");
    }

    /// Output observed: account, touch, fan out to the task stream.
    pub(crate) fn on_output(&self, slot: &Arc<SessionSlot>, chunk: OutputChunk) {
        {
            let mut record = slot.record.lock();
            record.bytes_out += chunk.data.len() as u64;
            record.touch(self.clock.epoch_ms());
        }
        // Receiver lag drops the oldest buffered chunk; count it as an
        // overflow error on the session.
        let _ = slot.stream.send(StreamEvent::Output(chunk));
    }

    /// Pipe read failures and chunk-buffer overflows both land here.
    pub(crate) fn bump_error_count(&self, slot: &Arc<SessionSlot>) {
        slot.record.lock().error_count += 1;
    }

    pub(crate) async fn persist(&self, slot: &Arc<SessionSlot>) {
        let record = slot.record.lock().clone();
        if let Err(e) = self.repos.sessions.update(record).await {
            warn!(error = %e, "failed to persist session record");
        }
    }

    pub(crate) fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub(crate) fn table_slot(&self, id: &SessionId) -> Option<Arc<SessionSlot>> {
        self.table.read().get(id).cloned()
    }

    fn emit(&self, event: Event) {
        if self.events_tx.try_send(event).is_err() {
            debug!("event channel full, dropping lifecycle event");
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
