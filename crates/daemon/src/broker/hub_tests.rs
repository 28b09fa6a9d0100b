// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use aicli_adapters::AllowAllAccess;
use aicli_core::{FakeClock, Principal};
use aicli_wire::WsMessage;

fn config() -> BrokerConfig {
    BrokerConfig {
        max_connections: 100,
        send_buffer: 8,
        ping_interval: Duration::from_secs(30),
        read_timeout: Duration::from_secs(60),
        max_message: 1024,
    }
}

fn hub_with(config: BrokerConfig) -> Arc<Hub<FakeClock>> {
    let verifier = Arc::new(aicli_adapters::BearerMapVerifier::new());
    Hub::new(config, FakeClock::default(), verifier, Arc::new(AllowAllAccess))
}

fn user(name: &str) -> Principal {
    Principal::new(PrincipalId::generate(), name)
}

fn admin(name: &str) -> Principal {
    Principal::admin(PrincipalId::generate(), name)
}

fn frame(text: &str) -> WsMessage {
    WsMessage::new(MessageType::Log, serde_json::json!({ "line": text }), 1)
}

#[tokio::test]
async fn register_auto_subscribes_the_user_channel() {
    let hub = hub_with(config());
    let alice = user("alice");
    let mut handle = hub.register(alice.clone()).unwrap();

    let delivered = hub.publish_frame(&SmolStr::new(format!("user:{}", alice.id)), &frame("hi"));
    assert_eq!(delivered, 1);
    let received = handle.rx.recv().await.unwrap();
    assert!(received.contains("hi"));
}

#[tokio::test]
async fn connection_cap_rejects_at_exactly_max_plus_one() {
    let mut cfg = config();
    cfg.max_connections = 2;
    let hub = hub_with(cfg);

    let _first = hub.register(user("a")).unwrap();
    let _second = hub.register(user("b")).unwrap();
    let err = hub.register(user("c")).unwrap_err();
    assert!(matches!(err, HubError::MaxClients(2)));
    assert_eq!(hub.connection_count(), 2);
}

#[tokio::test]
async fn unregister_frees_a_slot_and_all_indices() {
    let mut cfg = config();
    cfg.max_connections = 1;
    let hub = hub_with(cfg);

    let alice = user("a");
    let handle = hub.register(alice.clone()).unwrap();
    hub.subscribe(&handle.id, &["broadcast".to_string()]);
    hub.unregister(&handle.id);

    assert_eq!(hub.connection_count(), 0);
    assert_eq!(hub.publish_frame(&SmolStr::new_static("broadcast"), &frame("x")), 0);
    assert_eq!(hub.publish_frame(&SmolStr::new(format!("user:{}", alice.id)), &frame("x")), 0);

    // Slot is free again.
    hub.register(user("b")).unwrap();
}

#[tokio::test]
async fn subscribe_acks_are_independent_per_channel() {
    let hub = hub_with(config());
    let handle = hub.register(user("alice")).unwrap();

    let acks = hub.subscribe(
        &handle.id,
        &[
            "task:tsk-1".to_string(),
            "bogus".to_string(),
            "system".to_string(),
            "broadcast".to_string(),
        ],
    );

    assert_eq!(acks.len(), 4);
    assert!(acks[0].ok);
    assert!(!acks[1].ok, "unknown channel rejected");
    assert!(!acks[2].ok, "system is admin-only");
    assert!(acks[3].ok, "broadcast open to authenticated users");
}

#[tokio::test]
async fn admin_may_join_system() {
    let hub = hub_with(config());
    let handle = hub.register(admin("root")).unwrap();
    let acks = hub.subscribe(&handle.id, &["system".to_string()]);
    assert!(acks[0].ok);
}

#[tokio::test]
async fn user_channel_of_another_principal_is_denied() {
    let hub = hub_with(config());
    let _bob = hub.register(user("bob")).unwrap();
    let alice_handle = hub.register(user("alice")).unwrap();

    let acks = hub.subscribe(&alice_handle.id, &["user:usr-someone-else".to_string()]);
    assert!(!acks[0].ok);
}

#[tokio::test]
async fn publish_reaches_only_subscribers() {
    let hub = hub_with(config());
    let mut sub = hub.register(user("sub")).unwrap();
    let mut other = hub.register(user("other")).unwrap();

    hub.subscribe(&sub.id, &["task:tsk-9".to_string()]);
    let delivered = hub.publish_frame(&SmolStr::new_static("task:tsk-9"), &frame("chunk"));

    assert_eq!(delivered, 1);
    assert!(sub.rx.try_recv().is_ok());
    assert!(other.rx.try_recv().is_err());
}

#[tokio::test]
async fn frames_arrive_in_publish_order() {
    let hub = hub_with(config());
    let mut sub = hub.register(user("sub")).unwrap();
    hub.subscribe(&sub.id, &["session:ses-1".to_string()]);

    let channel = SmolStr::new_static("session:ses-1");
    for i in 0..5 {
        hub.publish_frame(&channel, &frame(&format!("line {i}")));
    }
    for i in 0..5 {
        let text = sub.rx.recv().await.unwrap();
        assert!(text.contains(&format!("line {i}")));
    }
}

#[tokio::test]
async fn slow_consumer_is_closed_not_awaited() {
    let mut cfg = config();
    cfg.send_buffer = 2;
    let hub = hub_with(cfg);

    let mut healthy = hub.register(user("fast")).unwrap();
    let slow = hub.register(user("slow")).unwrap();
    hub.subscribe(&healthy.id, &["broadcast".to_string()]);
    hub.subscribe(&slow.id, &["broadcast".to_string()]);

    // Drain the healthy consumer but never `slow`: two frames fit its
    // buffer, the third overflows it.
    let channel = SmolStr::new_static("broadcast");
    hub.publish_frame(&channel, &frame("one"));
    assert!(healthy.rx.recv().await.unwrap().contains("one"));
    hub.publish_frame(&channel, &frame("two"));
    assert!(healthy.rx.recv().await.unwrap().contains("two"));
    let delivered = hub.publish_frame(&channel, &frame("three"));

    assert_eq!(delivered, 1, "only the healthy consumer got the third frame");
    assert!(slow.kill.is_cancelled());
    assert_eq!(slow.close_reason.get().copied(), Some(close_code::SEND_BUFFER_FULL));
    assert!(healthy.rx.recv().await.unwrap().contains("three"));
}

#[tokio::test]
async fn broadcast_unions_dedupes_and_excludes() {
    let hub = hub_with(config());
    let alice = user("alice");
    let mut a = hub.register(alice.clone()).unwrap();
    let mut b = hub.register(user("bob")).unwrap();
    let mut c = hub.register(user("carol")).unwrap();

    hub.subscribe(&a.id, &["broadcast".to_string()]);
    hub.subscribe(&b.id, &["broadcast".to_string()]);

    // a is targeted twice (channel + user) but must receive once.
    let delivered = hub.broadcast(
        &BroadcastRequest {
            target_channels: vec![SmolStr::new_static("broadcast")],
            target_users: vec![alice.id],
            exclude: vec![b.id],
        },
        &frame("fan"),
    );

    assert_eq!(delivered, 1);
    assert!(a.rx.try_recv().is_ok());
    assert!(a.rx.try_recv().is_err(), "deduplicated by connection");
    assert!(b.rx.try_recv().is_err(), "excluded");
    assert!(c.rx.try_recv().is_err(), "not targeted");
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let hub = hub_with(config());
    let mut handle = hub.register(user("alice")).unwrap();

    hub.subscribe(&handle.id, &["task:tsk-1".to_string()]);
    let acks = hub.unsubscribe(&handle.id, &["task:tsk-1".to_string()]);
    assert!(acks[0].ok);

    assert_eq!(hub.publish_frame(&SmolStr::new_static("task:tsk-1"), &frame("x")), 0);
    assert!(handle.rx.try_recv().is_err());

    let acks = hub.unsubscribe(&handle.id, &["task:tsk-1".to_string()]);
    assert!(!acks[0].ok, "second unsubscribe reports not subscribed");
}

#[tokio::test]
async fn descriptor_reflects_subscriptions_and_depth() {
    let hub = hub_with(config());
    let handle = hub.register(user("alice")).unwrap();
    hub.subscribe(&handle.id, &["broadcast".to_string()]);

    hub.send_to(&handle.id, &frame("queued"));
    let descriptor = hub.descriptor(&handle.id).unwrap();

    assert!(descriptor.authenticated);
    assert_eq!(descriptor.send_queue_depth, 1);
    assert_eq!(descriptor.subscribed_channels.len(), 2); // user:{id} + broadcast
}

#[tokio::test]
async fn event_forwarder_frames_lifecycle_events() {
    let hub = hub_with(config());
    let mut sub = hub.register(user("watcher")).unwrap();
    hub.subscribe(&sub.id, &["task:tsk-42".to_string()]);

    let (tx, rx) = mpsc::channel(8);
    let forwarder = spawn_event_forwarder(Arc::clone(&hub), rx);

    tx.send(Event::TaskFinished {
        task_id: aicli_core::TaskId::from_string("tsk-42"),
        session_id: aicli_core::SessionId::from_string("ses-1"),
        status: aicli_core::TaskStatus::Completed,
        duration_ms: 12,
        error: None,
        at_ms: 5,
    })
    .await
    .unwrap();
    drop(tx);
    forwarder.await.unwrap();

    let text = sub.rx.recv().await.unwrap();
    let message = WsMessage::decode(&text).unwrap();
    assert_eq!(message.kind, MessageType::Task);
    assert_eq!(message.data["name"], "task.completed");
    assert_eq!(message.channel.as_deref(), Some("task:tsk-42"));
}
