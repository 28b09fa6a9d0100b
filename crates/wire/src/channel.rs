// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker channel grammar.
//!
//! Channels are namespaced strings: `workspace:{id}`, `session:{id}`,
//! `task:{id}`, `user:{id}`, plus the bare `system` and `broadcast`.
//! Anything else is rejected at subscribe time.

use aicli_core::{PrincipalId, SessionId, TaskId, WorkspaceId};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown channel: {0}")]
pub struct ChannelError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Workspace(WorkspaceId),
    Session(SessionId),
    Task(TaskId),
    User(PrincipalId),
    /// Admin-only operational feed.
    System,
    /// Every authenticated principal.
    Broadcast,
}

impl Channel {
    pub fn parse(s: &str) -> Result<Self, ChannelError> {
        match s {
            "system" => return Ok(Channel::System),
            "broadcast" => return Ok(Channel::Broadcast),
            _ => {}
        }
        let (namespace, id) = s.split_once(':').ok_or_else(|| ChannelError(s.to_string()))?;
        if id.is_empty() || id.len() > aicli_core::id::ID_MAX_LEN {
            return Err(ChannelError(s.to_string()));
        }
        match namespace {
            "workspace" => Ok(Channel::Workspace(WorkspaceId::from_string(id))),
            "session" => Ok(Channel::Session(SessionId::from_string(id))),
            "task" => Ok(Channel::Task(TaskId::from_string(id))),
            "user" => Ok(Channel::User(PrincipalId::from_string(id))),
            _ => Err(ChannelError(s.to_string())),
        }
    }

    /// Canonical string form, used as the broker's index key.
    pub fn name(&self) -> SmolStr {
        match self {
            Channel::Workspace(id) => SmolStr::new(format!("workspace:{id}")),
            Channel::Session(id) => SmolStr::new(format!("session:{id}")),
            Channel::Task(id) => SmolStr::new(format!("task:{id}")),
            Channel::User(id) => SmolStr::new(format!("user:{id}")),
            Channel::System => SmolStr::new_static("system"),
            Channel::Broadcast => SmolStr::new_static("broadcast"),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Serialize for Channel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.name())
    }
}

impl<'de> Deserialize<'de> for Channel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Channel::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
