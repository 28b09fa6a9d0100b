// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker pool: runs each task exactly once inside its session.
//!
//! Workers share one queue receiver. Per task: re-verify the session (idle
//! sessions re-activate), write the command to stdin, relay output chunks
//! to the `task:{id}` channel while capturing them, and finalize on the
//! first of: end-of-turn sentinel, timeout, cancellation, session close,
//! or process exit.

use super::{QueuedTask, TaskQueue};
use crate::sessions::StreamEvent;
use aicli_core::{format_elapsed_ms, Clock, Event, TaskStatus};
use aicli_wire::{MessageType, WsMessage};
use smol_str::SmolStr;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

pub(super) fn spawn_workers<C: Clock>(
    queue: Arc<TaskQueue<C>>,
    rx: mpsc::UnboundedReceiver<QueuedTask>,
) {
    let rx = Arc::new(tokio::sync::Mutex::new(rx));
    for worker_id in 0..queue.config.workers {
        let queue = Arc::clone(&queue);
        let rx = Arc::clone(&rx);
        tokio::spawn(async move {
            debug!(worker_id, "task worker started");
            loop {
                let item = {
                    let mut rx = rx.lock().await;
                    let shutdown = queue.shutdown_token();
                    tokio::select! {
                        _ = shutdown.cancelled() => None,
                        item = rx.recv() => item,
                    }
                };
                let Some(item) = item else {
                    debug!(worker_id, "task worker stopping");
                    return;
                };
                run_one(&queue, item).await;
            }
        });
    }
}

async fn run_one<C: Clock>(queue: &Arc<TaskQueue<C>>, item: QueuedTask) {
    let QueuedTask { mut record, cancel: _, _permit } = item;
    drop(_permit); // the task no longer occupies a queue slot

    // Claim finalization; a concurrent `cancel` may have won.
    let Some(cancel) = queue.claim(&record.id) else {
        debug!(task_id = %record.id, "task cancelled before dispatch");
        return;
    };
    if cancel.is_cancelled() {
        let _ = queue.finalize(record, TaskStatus::Cancelled, None).await;
        return;
    }

    // Re-verify the session and serialize against its other tasks.
    let mut grant = match queue.manager.begin_task(&record.session_id).await {
        Ok(grant) => grant,
        Err(e) => {
            warn!(task_id = %record.id, error = %e, "session no longer runnable");
            let _ = queue
                .finalize(record, TaskStatus::Failed, Some(format!("session invalid: {e}")))
                .await;
            return;
        }
    };

    let started = queue.clock.epoch_ms();
    if !record.start(started) {
        // Defensive: claim() should have filtered every such case.
        let _ = queue.finalize(record, TaskStatus::Cancelled, None).await;
        return;
    }
    if let Err(e) = queue.repos.tasks.update(record.clone()).await {
        warn!(task_id = %record.id, error = %e, "failed to persist task start");
    }
    queue.emit(Event::TaskStarted {
        task_id: record.id,
        session_id: record.session_id,
        at_ms: started,
    });

    if let Err(e) = queue.manager.send_command(&record.session_id, &record.command).await {
        let _ = queue
            .finalize(record, TaskStatus::Failed, Some(format!("stdin write failed: {e}")))
            .await;
        return;
    }
    record.bytes_in = record.command.len() as u64 + 1;

    let channel = SmolStr::new(format!("task:{}", record.id));
    let deadline = queue.config.task_timeout.min(grant.remaining_lifetime);
    let timeout = tokio::time::sleep(deadline);
    tokio::pin!(timeout);

    let mut truncated = false;
    let (status, error) = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                queue.manager.interrupt(&record.session_id).await;
                break (TaskStatus::Cancelled, None);
            }
            _ = grant.cancel.cancelled() => {
                break (TaskStatus::Cancelled, Some("session closed".to_string()));
            }
            _ = &mut timeout => {
                queue.manager.interrupt(&record.session_id).await;
                break (TaskStatus::Failed, Some("task timeout".to_string()));
            }
            event = grant.stream.recv() => match event {
                Ok(StreamEvent::Output(chunk)) => {
                    if chunk.is_eot() {
                        break (TaskStatus::Completed, None);
                    }
                    record.bytes_out += chunk.data.len() as u64;
                    append_capped(&mut record.output, &chunk.data, queue.config.output_cap, &mut truncated);
                    let frame = WsMessage::new(
                        MessageType::Log,
                        serde_json::json!({
                            "task_id": record.id,
                            "stream": chunk.stream.as_str(),
                            "line": chunk.data,
                        }),
                        queue.clock.epoch_ms(),
                    )
                    .on_channel(channel.clone());
                    queue.publisher.publish(&channel, &frame);
                }
                Ok(StreamEvent::Exited(code)) => {
                    let detail = match code {
                        Some(code) => format!("agent exited (exit code: {code})"),
                        None => "agent exited".to_string(),
                    };
                    break (TaskStatus::Failed, Some(detail));
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Oldest chunks were dropped under backpressure; output
                    // integrity is best-effort, execution continues.
                    warn!(task_id = %record.id, dropped = n, "output chunks dropped");
                    if let Some(slot) = queue.manager.table_slot(&record.session_id) {
                        queue.manager.bump_error_count(&slot);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break (TaskStatus::Failed, Some("output stream closed".to_string()));
                }
            }
        }
    };

    match queue.finalize(record, status, error).await {
        Ok(record) => {
            info!(
                task_id = %record.id,
                session_id = %record.session_id,
                status = %record.status,
                elapsed = format_elapsed_ms(record.duration_ms),
                "task finished"
            );
        }
        Err(e) => warn!(error = %e, "task finalization failed"),
    }
    drop(grant);
}

/// Append up to the cap; note truncation once.
fn append_capped(output: &mut String, line: &str, cap: usize, truncated: &mut bool) {
    if output.len() >= cap {
        if !*truncated {
            output.push_str("\n[output truncated]");
            *truncated = true;
        }
        return;
    }
    let remaining = cap - output.len();
    if !output.is_empty() {
        output.push('\n');
    }
    if line.len() <= remaining {
        output.push_str(line);
    } else {
        let mut end = remaining;
        while !line.is_char_boundary(end) {
            end -= 1;
        }
        output.push_str(&line[..end]);
        output.push_str("\n[output truncated]");
        *truncated = true;
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
