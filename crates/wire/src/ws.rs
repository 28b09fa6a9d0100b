// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket message envelope.
//!
//! Every frame is JSON text: `{type, id?, channel?, data, timestamp,
//! principal_id?}`. The `type` tag drives an exhaustive match at the broker
//! boundary; `data` is an opaque payload whose shape is dictated by `type`.

use aicli_core::PrincipalId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use thiserror::Error;

/// Close codes for fatal protocol errors.
pub mod close_code {
    pub const NO_TOKEN: u16 = 4001;
    pub const INVALID_TOKEN: u16 = 4002;
    pub const ACCESS_DENIED: u16 = 4003;
    pub const SEND_BUFFER_FULL: u16 = 4008;
    pub const MAX_CLIENTS_EXCEEDED: u16 = 4009;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    // System
    Auth,
    Ping,
    Pong,
    Subscribe,
    Unsubscribe,
    Error,
    Success,
    // Business
    Log,
    Status,
    Event,
    Command,
    Task,
    Session,
}

impl MessageType {
    pub fn is_system(&self) -> bool {
        matches!(
            self,
            MessageType::Auth
                | MessageType::Ping
                | MessageType::Pong
                | MessageType::Subscribe
                | MessageType::Unsubscribe
                | MessageType::Error
                | MessageType::Success
        )
    }
}

#[derive(Debug, Error)]
pub enum WsError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<SmolStr>,
    #[serde(default)]
    pub data: Value,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_id: Option<PrincipalId>,
}

impl WsMessage {
    pub fn new(kind: MessageType, data: Value, timestamp: u64) -> Self {
        Self { kind, id: None, channel: None, data, timestamp, principal_id: None }
    }

    pub fn on_channel(mut self, channel: impl Into<SmolStr>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn from_principal(mut self, principal_id: PrincipalId) -> Self {
        self.principal_id = Some(principal_id);
        self
    }

    /// Correlate a reply with the frame it answers.
    pub fn in_reply_to(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }

    pub fn pong(timestamp: u64) -> Self {
        Self::new(MessageType::Pong, Value::Null, timestamp)
    }

    pub fn error(code: &str, message: impl Into<String>, timestamp: u64) -> Self {
        Self::new(
            MessageType::Error,
            serde_json::json!({ "code": code, "message": message.into() }),
            timestamp,
        )
    }

    pub fn success(data: Value, timestamp: u64) -> Self {
        Self::new(MessageType::Success, data, timestamp)
    }

    pub fn encode(&self) -> String {
        // WsMessage serialization cannot fail: every field is a plain
        // serde type. Fall back to a bare error frame just in case.
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","data":{"code":"ERR_INTERNAL"},"timestamp":0}"#.to_string()
        })
    }

    pub fn decode(text: &str) -> Result<Self, WsError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Payload of a `subscribe`/`unsubscribe` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribePayload {
    pub channels: Vec<String>,
}

/// Per-channel acknowledgement inside the `success` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeAck {
    pub channel: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
