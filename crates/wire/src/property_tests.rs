// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Round-trip properties for the wire types.

use crate::{Channel, MessageType, WsMessage};
use proptest::prelude::*;

fn message_type() -> impl Strategy<Value = MessageType> {
    prop_oneof![
        Just(MessageType::Auth),
        Just(MessageType::Ping),
        Just(MessageType::Pong),
        Just(MessageType::Subscribe),
        Just(MessageType::Unsubscribe),
        Just(MessageType::Error),
        Just(MessageType::Success),
        Just(MessageType::Log),
        Just(MessageType::Status),
        Just(MessageType::Event),
        Just(MessageType::Command),
        Just(MessageType::Task),
        Just(MessageType::Session),
    ]
}

fn id_suffix() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_-]{1,19}"
}

proptest! {
    #[test]
    fn ws_frames_round_trip(
        kind in message_type(),
        payload in "[a-zA-Z0-9 ]{0,64}",
        timestamp in any::<u64>(),
    ) {
        let frame = WsMessage::new(kind, serde_json::json!({ "payload": payload }), timestamp);
        let decoded = WsMessage::decode(&frame.encode()).unwrap();
        prop_assert_eq!(decoded, frame);
    }

    #[test]
    fn entity_channels_round_trip(
        namespace in prop_oneof![
            Just("workspace"), Just("session"), Just("task"), Just("user"),
        ],
        suffix in id_suffix(),
    ) {
        let name = format!("{namespace}:{suffix}");
        let channel = Channel::parse(&name).unwrap();
        let channel_name = channel.name();
        prop_assert_eq!(channel_name.as_str(), name.as_str());
        let reparsed = Channel::parse(channel_name.as_str()).unwrap();
        prop_assert_eq!(reparsed, channel);
    }
}
