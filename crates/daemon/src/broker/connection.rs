// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One WebSocket connection: auth, registration, and the two pumps.
//!
//! The read pump enforces the frame-size limit and the pong-refreshed read
//! deadline and dispatches client frames; the write pump drains the bounded
//! send buffer and emits heartbeats. Either pump ending tears the whole
//! connection down.

use super::{ConnectionHandle, Hub, HubError};
use aicli_adapters::AuthError;
use aicli_core::{Clock, ConnectionId, Principal};
use aicli_wire::{close_code, MessageType, SubscribePayload, WsMessage};
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

/// Messages-too-big and unsupported-data close codes from RFC 6455.
const CLOSE_TOO_BIG: u16 = 1009;
const CLOSE_UNSUPPORTED: u16 = 1003;

pub(crate) async fn serve<C: Clock>(socket: WebSocket, hub: Arc<Hub<C>>, token: Option<String>) {
    let mut socket = socket;

    let principal = match authenticate(&hub, token.as_deref()) {
        Ok(principal) => principal,
        Err(code) => {
            close(&mut socket, code).await;
            return;
        }
    };

    let handle = match hub.register(principal) {
        Ok(handle) => handle,
        Err(HubError::MaxClients(max)) => {
            debug!(max, "rejecting connection over the cap");
            close(&mut socket, close_code::MAX_CLIENTS_EXCEEDED).await;
            return;
        }
        Err(e) => {
            warn!(error = %e, "registration failed");
            close(&mut socket, 1011).await;
            return;
        }
    };

    let ConnectionHandle { id, principal, rx, kill, close_reason } = handle;
    let (sink, stream) = socket.split();

    let writer = tokio::spawn(write_pump(
        sink,
        rx,
        kill.clone(),
        Arc::clone(&close_reason),
        Arc::clone(&hub),
    ));

    read_pump(stream, &hub, &id, &principal, kill.clone()).await;

    // Read side done: tear down the write side and the indices.
    kill.cancel();
    let _ = writer.await;
    hub.unregister(&id);
}

fn authenticate<C: Clock>(hub: &Arc<Hub<C>>, token: Option<&str>) -> Result<Principal, u16> {
    let Some(token) = token else {
        return Err(close_code::NO_TOKEN);
    };
    hub.verifier().verify(token).map_err(|e| match e {
        AuthError::MissingToken => close_code::NO_TOKEN,
        AuthError::InvalidToken => close_code::INVALID_TOKEN,
    })
}

async fn close(socket: &mut WebSocket, code: u16) {
    let frame = CloseFrame { code, reason: axum::extract::ws::Utf8Bytes::from_static("") };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

/// Drain the send buffer to the socket; heartbeat on the ping interval.
async fn write_pump<C: Clock>(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: tokio::sync::mpsc::Receiver<String>,
    kill: tokio_util::sync::CancellationToken,
    close_reason: Arc<std::sync::OnceLock<u16>>,
    hub: Arc<Hub<C>>,
) {
    let mut heartbeat = tokio::time::interval(hub.config().ping_interval);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    heartbeat.tick().await; // first tick is immediate

    loop {
        tokio::select! {
            _ = kill.cancelled() => {
                let code = close_reason.get().copied().unwrap_or(1000);
                let frame = CloseFrame {
                    code,
                    reason: axum::extract::ws::Utf8Bytes::from_static(""),
                };
                let _ = sink.send(Message::Close(Some(frame))).await;
                return;
            }
            frame = rx.recv() => match frame {
                Some(encoded) => {
                    if sink.send(Message::Text(encoded.into())).await.is_err() {
                        return;
                    }
                }
                None => return,
            },
            _ = heartbeat.tick() => {
                let ping = WsMessage::new(MessageType::Ping, serde_json::Value::Null, hub.now_ms());
                if sink.send(Message::Text(ping.encode().into())).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Read frames until close, error, or the idle deadline expires.
async fn read_pump<C: Clock>(
    mut stream: SplitStream<WebSocket>,
    hub: &Arc<Hub<C>>,
    id: &ConnectionId,
    principal: &Principal,
    kill: tokio_util::sync::CancellationToken,
) {
    let read_timeout = hub.config().read_timeout;
    let max_message = hub.config().max_message;

    loop {
        let next = tokio::select! {
            _ = kill.cancelled() => return,
            next = tokio::time::timeout(read_timeout, stream.next()) => next,
        };
        let message = match next {
            Err(_) => {
                debug!(connection_id = %id, "read deadline expired without pong");
                return;
            }
            Ok(None) => return,
            Ok(Some(Err(e))) => {
                debug!(connection_id = %id, error = %e, "read error");
                return;
            }
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => {
                if text.len() > max_message {
                    warn!(connection_id = %id, size = text.len(), "oversized frame");
                    let _ = close_reason_set(hub, id, CLOSE_TOO_BIG);
                    return;
                }
                hub.note_rx(id);
                handle_frame(hub, id, principal, text.as_str());
            }
            Message::Binary(_) => {
                warn!(connection_id = %id, "binary frame on text-only endpoint");
                let _ = close_reason_set(hub, id, CLOSE_UNSUPPORTED);
                return;
            }
            // Protocol-level pings/pongs count as liveness.
            Message::Ping(_) | Message::Pong(_) => hub.note_rx(id),
            Message::Close(_) => return,
        }
    }
}

/// Record the close code so the write pump's close frame carries it.
fn close_reason_set<C: Clock>(hub: &Arc<Hub<C>>, id: &ConnectionId, code: u16) -> bool {
    hub.kill_with_code(id, code)
}

/// Exhaustive dispatch on the envelope type.
fn handle_frame<C: Clock>(hub: &Arc<Hub<C>>, id: &ConnectionId, principal: &Principal, text: &str) {
    let now = hub.now_ms();
    let message = match WsMessage::decode(text) {
        Ok(message) => message,
        Err(e) => {
            let frame = WsMessage::error("ERR_VALIDATION", format!("malformed frame: {e}"), now);
            hub.send_to(id, &frame);
            return;
        }
    };

    match message.kind {
        MessageType::Ping => {
            hub.send_to(id, &WsMessage::pong(now).in_reply_to(message.id));
        }
        MessageType::Pong => {} // liveness was noted on receive
        MessageType::Auth => {
            // The connection authenticated during the upgrade.
            let data = serde_json::json!({ "principal_id": principal.id });
            hub.send_to(id, &WsMessage::success(data, now).in_reply_to(message.id));
        }
        MessageType::Subscribe | MessageType::Unsubscribe => {
            let payload: SubscribePayload = match serde_json::from_value(message.data) {
                Ok(payload) => payload,
                Err(e) => {
                    let frame =
                        WsMessage::error("ERR_VALIDATION", format!("bad subscribe payload: {e}"), now);
                    hub.send_to(id, &frame);
                    return;
                }
            };
            let acks = if message.kind == MessageType::Subscribe {
                hub.subscribe(id, &payload.channels)
            } else {
                hub.unsubscribe(id, &payload.channels)
            };
            let data = serde_json::json!({ "results": acks });
            hub.send_to(id, &WsMessage::success(data, now).in_reply_to(message.id));
        }
        MessageType::Error | MessageType::Success => {
            // Replies are server-originated; ignore echoes.
        }
        MessageType::Log
        | MessageType::Status
        | MessageType::Event
        | MessageType::Command
        | MessageType::Task
        | MessageType::Session => {
            let frame = WsMessage::error(
                "ERR_VALIDATION",
                "business frames are published by the server",
                now,
            );
            hub.send_to(id, &frame);
        }
    }
}
