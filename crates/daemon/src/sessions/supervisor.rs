// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session supervisor task.
//!
//! Pumps the runtime's event stream into the session slot: output chunks
//! fan out to the task stream, read errors are counted (three consecutive
//! failures kill the session), and the exit event drives finalization.

use super::{SessionManager, StreamEvent};
use aicli_adapters::{RuntimeEvent, Signal};
use aicli_core::{Clock, SessionId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const MAX_CONSECUTIVE_READ_ERRORS: u32 = 3;

pub(crate) fn spawn<C: Clock>(
    manager: Arc<SessionManager<C>>,
    session_id: SessionId,
    events: mpsc::Receiver<RuntimeEvent>,
) {
    tokio::spawn(run(manager, session_id, events));
}

async fn run<C: Clock>(
    manager: Arc<SessionManager<C>>,
    session_id: SessionId,
    mut events: mpsc::Receiver<RuntimeEvent>,
) {
    let mut consecutive_read_errors = 0u32;
    let mut exit_code = None;
    let mut exited = false;

    while let Some(event) = events.recv().await {
        let Some(slot) = manager.table_slot(&session_id) else {
            debug!(%session_id, "slot gone, supervisor stopping");
            return;
        };
        match event {
            RuntimeEvent::Output(chunk) => {
                consecutive_read_errors = 0;
                manager.on_output(&slot, chunk);
            }
            RuntimeEvent::ReadError { detail } => {
                consecutive_read_errors += 1;
                manager.bump_error_count(&slot);
                manager.persist(&slot).await;
                warn!(%session_id, detail, attempt = consecutive_read_errors, "pipe read error");
                if consecutive_read_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                    warn!(%session_id, "read errors exhausted retries, killing agent");
                    let _ = manager.runtime().signal(&session_id, Signal::Kill).await;
                }
            }
            RuntimeEvent::Exited(status) => {
                exit_code = status.code;
                exited = true;
                break;
            }
        }
    }

    // Either the process exited or the runtime dropped the channel; both
    // end the session. Running tasks observe `Exited` on the task stream
    // and fail with the exit code.
    if let Some(slot) = manager.table_slot(&session_id) {
        if !exited {
            debug!(%session_id, "runtime event channel closed without exit");
        }
        let _ = slot.stream.send(StreamEvent::Exited(exit_code));
        manager.finalize(&session_id, &slot).await;
    }
}
