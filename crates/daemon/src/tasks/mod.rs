// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task queue: exclusive owner of every task's status transitions.
//!
//! A semaphore-gated FIFO feeds the worker pool in `executor`. Admission
//! (allow-list, session validity, capacity) happens synchronously in
//! `submit`; execution, cancellation, and result capture happen on the
//! workers. Finalization of any task happens exactly once: either by
//! `cancel` (while still queued) or by the worker that claimed it.

mod executor;

use crate::publish::FramePublisher;
use crate::sessions::{SessionError, SessionManager};
use aicli_core::{
    Clock, ErrorKind, Event, Page, PageRequest, SessionId, TaskId, TaskRecord, TaskStatus,
};
use aicli_storage::{Repositories, StorageError, TaskFilter, TaskStats};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Task subsystem tunables, extracted from the daemon configuration.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub task_timeout: Duration,
    /// Captured output cap per task (bytes).
    pub output_cap: usize,
    /// Allowed command prefixes; empty permits everything.
    pub allowed_commands: Vec<String>,
}

impl From<&crate::config::TasksConfig> for TaskConfig {
    fn from(c: &crate::config::TasksConfig) -> Self {
        Self {
            workers: c.workers,
            queue_capacity: c.queue_capacity,
            task_timeout: c.task_timeout,
            output_cap: c.output_cap,
            allowed_commands: c.allowed_commands.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("command not allowed: {0:?}")]
    CommandNotAllowed(String),

    #[error("task queue full")]
    QueueFull,

    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("session {id} does not accept tasks ({status})")]
    SessionInvalid { id: SessionId, status: aicli_core::SessionStatus },

    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl TaskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::CommandNotAllowed(_) => ErrorKind::Validation,
            TaskError::QueueFull => ErrorKind::Capacity,
            TaskError::SessionNotFound(_) => ErrorKind::NotFound,
            TaskError::SessionInvalid { .. } => ErrorKind::Conflict,
            TaskError::NotFound(_) => ErrorKind::NotFound,
            TaskError::Session(e) => e.kind(),
            TaskError::Storage(e) => e.kind(),
        }
    }
}

/// Who finalizes the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CtlState {
    /// Still in the queue; `cancel` may finalize it directly.
    Queued,
    /// A worker claimed it; only that worker finalizes.
    Claimed,
}

struct TaskCtl {
    cancel: CancellationToken,
    state: CtlState,
}

pub(crate) struct QueuedTask {
    record: TaskRecord,
    cancel: CancellationToken,
    /// Queue occupancy permit, released when a worker dequeues the task.
    _permit: tokio::sync::OwnedSemaphorePermit,
}

pub struct TaskQueue<C: Clock> {
    repos: Repositories,
    manager: Arc<SessionManager<C>>,
    publisher: Arc<dyn FramePublisher>,
    clock: C,
    config: TaskConfig,
    capacity: Arc<Semaphore>,
    queue_tx: mpsc::UnboundedSender<QueuedTask>,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<QueuedTask>>>,
    ctl: Mutex<HashMap<TaskId, TaskCtl>>,
    events_tx: mpsc::Sender<Event>,
    shutdown: CancellationToken,
}

impl<C: Clock> TaskQueue<C> {
    pub fn new(
        repos: Repositories,
        manager: Arc<SessionManager<C>>,
        publisher: Arc<dyn FramePublisher>,
        clock: C,
        config: TaskConfig,
        events_tx: mpsc::Sender<Event>,
    ) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            repos,
            manager,
            publisher,
            clock,
            capacity: Arc::new(Semaphore::new(config.queue_capacity)),
            config,
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            ctl: Mutex::new(HashMap::new()),
            events_tx,
            shutdown: CancellationToken::new(),
        })
    }

    /// Start the worker pool. Call once during startup.
    pub fn start(self: &Arc<Self>) {
        let rx = self.queue_rx.lock().take();
        let Some(rx) = rx else {
            debug!("task queue already started");
            return;
        };
        executor::spawn_workers(Arc::clone(self), rx);
    }

    /// Stop accepting and stop the workers.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Synchronous, non-blocking admission.
    pub async fn submit(
        &self,
        session_id: SessionId,
        command: &str,
    ) -> Result<TaskRecord, TaskError> {
        let command = command.trim();
        if command.is_empty() {
            return Err(TaskError::CommandNotAllowed(command.to_string()));
        }
        if !self.command_allowed(command) {
            return Err(TaskError::CommandNotAllowed(command.to_string()));
        }

        // The session must exist and be live. Pending sessions queue tasks;
        // the worker re-verifies state at dequeue time.
        match self.repos.sessions.get(&session_id).await {
            Ok(record) if record.status.is_live() => {}
            Ok(record) => {
                return Err(TaskError::SessionInvalid { id: session_id, status: record.status })
            }
            Err(StorageError::NotFound { .. }) => {
                return Err(TaskError::SessionNotFound(session_id))
            }
            Err(e) => return Err(e.into()),
        }

        let permit = match Arc::clone(&self.capacity).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => return Err(TaskError::QueueFull),
            Err(TryAcquireError::Closed) => return Err(TaskError::QueueFull),
        };

        let record = TaskRecord::new(session_id, command, self.clock.epoch_ms());
        self.repos.tasks.create(record.clone()).await?;

        let cancel = CancellationToken::new();
        self.ctl
            .lock()
            .insert(record.id, TaskCtl { cancel: cancel.clone(), state: CtlState::Queued });

        if self
            .queue_tx
            .send(QueuedTask { record: record.clone(), cancel, _permit: permit })
            .is_err()
        {
            // Workers stopped: roll the admission back.
            self.ctl.lock().remove(&record.id);
            return Err(TaskError::QueueFull);
        }

        debug!(task_id = %record.id, session_id = %session_id, "task queued");
        Ok(record)
    }

    /// Idempotent cancel. Pending tasks are finalized here; running tasks
    /// are interrupted and finalized by their worker; terminal tasks are
    /// returned unchanged.
    pub async fn cancel(&self, task_id: &TaskId) -> Result<TaskRecord, TaskError> {
        let record = match self.repos.tasks.get(task_id).await {
            Ok(record) => record,
            Err(StorageError::NotFound { .. }) => return Err(TaskError::NotFound(*task_id)),
            Err(e) => return Err(e.into()),
        };
        if record.is_terminal() {
            return Ok(record);
        }

        let finalize_here = {
            let mut ctl = self.ctl.lock();
            match ctl.get_mut(task_id) {
                Some(entry) => {
                    entry.cancel.cancel();
                    if entry.state == CtlState::Queued {
                        ctl.remove(task_id);
                        true
                    } else {
                        false
                    }
                }
                // No control entry and not terminal: the worker is in its
                // finalization window; treat as already being cancelled.
                None => false,
            }
        };

        if finalize_here {
            let record = self.finalize(record, TaskStatus::Cancelled, None).await?;
            info!(task_id = %task_id, "queued task cancelled");
            return Ok(record);
        }

        info!(task_id = %task_id, "running task cancellation requested");
        self.repos.tasks.get(task_id).await.map_err(Into::into)
    }

    pub async fn get(&self, id: &TaskId) -> Result<TaskRecord, TaskError> {
        match self.repos.tasks.get(id).await {
            Ok(record) => Ok(record),
            Err(StorageError::NotFound { .. }) => Err(TaskError::NotFound(*id)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list(
        &self,
        filter: TaskFilter,
        page: PageRequest,
    ) -> Result<Page<TaskRecord>, TaskError> {
        Ok(self.repos.tasks.list(filter, page).await?)
    }

    pub async fn list_active(&self) -> Result<Vec<TaskRecord>, TaskError> {
        Ok(self.repos.tasks.list_active().await?)
    }

    pub async fn stats(&self) -> Result<TaskStats, TaskError> {
        Ok(self.repos.tasks.stats().await?)
    }

    /// Queue slots still available (tests probe exact capacity behavior).
    pub fn available_capacity(&self) -> usize {
        self.capacity.available_permits()
    }

    fn command_allowed(&self, command: &str) -> bool {
        self.config.allowed_commands.is_empty()
            || self.config.allowed_commands.iter().any(|prefix| command.starts_with(prefix))
    }

    /// Claim a dequeued task for a worker. `None` means `cancel` already
    /// finalized it and the worker must drop it silently.
    fn claim(&self, task_id: &TaskId) -> Option<CancellationToken> {
        let mut ctl = self.ctl.lock();
        let entry = ctl.get_mut(task_id)?;
        entry.state = CtlState::Claimed;
        Some(entry.cancel.clone())
    }

    /// Terminal transition + persistence + event, exactly once per task.
    async fn finalize(
        &self,
        mut record: TaskRecord,
        status: TaskStatus,
        error: Option<String>,
    ) -> Result<TaskRecord, TaskError> {
        let now = self.clock.epoch_ms();
        if !record.finish(status, error.clone(), now) {
            return Ok(record);
        }
        let record = self.repos.tasks.update(record).await?;
        self.ctl.lock().remove(&record.id);
        self.emit(Event::TaskFinished {
            task_id: record.id,
            session_id: record.session_id,
            status,
            duration_ms: record.duration_ms,
            error,
            at_ms: now,
        });
        Ok(record)
    }

    fn emit(&self, event: Event) {
        if self.events_tx.try_send(event).is_err() {
            debug!("event channel full, dropping task event");
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
