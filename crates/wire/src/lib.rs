// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! aicli-wire: protocol types shared between the daemon and its clients.
//!
//! The REST envelope, the WebSocket message envelope, and the channel
//! grammar. Everything here is plain serde data; behavior lives in the
//! daemon.

mod channel;
mod envelope;
mod ws;

pub use channel::{Channel, ChannelError};
pub use envelope::{ApiError, ApiFailure, ApiSuccess};
pub use ws::{
    close_code, MessageType, SubscribeAck, SubscribePayload, WsError, WsMessage,
};

#[cfg(test)]
mod property_tests;
