// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end flows over the wired daemon: REST services, the executor,
//! and a real WebSocket client against a bound listener.

use crate::api::{AppState, RateLimitSettings, RateLimiter};
use crate::broker::{spawn_event_forwarder, BrokerConfig, Hub};
use crate::publish::FramePublisher;
use crate::sessions::{SessionConfig, SessionManager};
use crate::tasks::{TaskConfig, TaskQueue};
use aicli_adapters::{
    AccessChecker, AllowAllAccess, BearerMapVerifier, ContainerRuntime, FakeRuntime, TokenVerifier,
};
use aicli_cache::{CacheConfig, MultiLevelCache};
use aicli_core::Clock;
use aicli_core::{Event, FakeClock, ProjectRecord, TaskStatus, WorkspaceRecord};
use aicli_storage::Repositories;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

struct App {
    state: AppState<FakeClock>,
    runtime: Arc<FakeRuntime>,
    clock: FakeClock,
    addr: SocketAddr,
    token: String,
    _cache_dir: tempfile::TempDir,
}

struct AppOptions {
    max_clients: usize,
    max_message: usize,
    task_timeout: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            max_clients: 100,
            max_message: 64 * 1024,
            task_timeout: Duration::from_secs(5),
        }
    }
}

async fn spawn_app(options: AppOptions) -> App {
    let clock = FakeClock::default();
    let repos = Repositories::memory();
    let runtime = Arc::new(FakeRuntime::new());
    let cache_dir = tempfile::tempdir().unwrap();

    let cache_config = CacheConfig {
        l2_dir: cache_dir.path().to_path_buf(),
        ..CacheConfig::default()
    };
    let cache = Arc::new(MultiLevelCache::open(cache_config, clock.clone()).unwrap());

    let verifier = Arc::new(BearerMapVerifier::new());
    let token = "tok-e2e".to_string();
    verifier.register(&token, "e2e-user", false);
    let verifier: Arc<dyn TokenVerifier> = verifier;
    let access: Arc<dyn AccessChecker> = Arc::new(AllowAllAccess);

    let (events_tx, events_rx) = mpsc::channel::<Event>(256);
    let manager = SessionManager::new(
        repos.clone(),
        Arc::clone(&runtime) as Arc<dyn ContainerRuntime>,
        clock.clone(),
        SessionConfig {
            max_sessions: 10,
            idle_timeout: Duration::from_secs(60),
            lifetime: Duration::from_secs(600),
            cleanup_interval: Duration::from_secs(5),
            kill_grace: Duration::from_millis(50),
            output_buffer: 64,
            agent_command: "claude".to_string(),
        },
        events_tx.clone(),
    );

    let hub = Hub::new(
        BrokerConfig {
            max_connections: options.max_clients,
            send_buffer: 64,
            ping_interval: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            max_message: options.max_message,
        },
        clock.clone(),
        Arc::clone(&verifier),
        Arc::clone(&access),
    );

    let queue = TaskQueue::new(
        repos.clone(),
        Arc::clone(&manager),
        Arc::clone(&hub) as Arc<dyn FramePublisher>,
        clock.clone(),
        TaskConfig {
            workers: 5,
            queue_capacity: 100,
            task_timeout: options.task_timeout,
            output_cap: 64 * 1024,
            allowed_commands: Vec::new(),
        },
        events_tx,
    );
    queue.start();
    let _ = spawn_event_forwarder(Arc::clone(&hub), events_rx);

    let rate = Arc::new(RateLimiter::new(
        RateLimitSettings {
            anon_per_minute: 10_000,
            auth_per_minute: 10_000,
            whitelist: Default::default(),
        },
        clock.clone(),
    ));

    let state = AppState {
        repos,
        manager,
        queue,
        hub,
        cache,
        rate,
        verifier,
        access,
        clock: clock.clone(),
    };

    let router = crate::api::router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });

    App { state, runtime, clock, addr, token, _cache_dir: cache_dir }
}

async fn workspace_and_project(app: &App) -> (WorkspaceRecord, ProjectRecord) {
    let workspace = app
        .state
        .repos
        .workspaces
        .create(WorkspaceRecord::new(
            "w1",
            aicli_core::PrincipalId::from_string("usr-owner"),
            PathBuf::from("/tmp"),
            app.clock.epoch_ms(),
        ))
        .await
        .unwrap();
    let project = app
        .state
        .repos
        .projects
        .create(ProjectRecord::new(
            workspace.id,
            "p1",
            PathBuf::from("/tmp/p1"),
            app.clock.epoch_ms(),
        ))
        .await
        .unwrap();
    (workspace, project)
}

type WsClient = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn connect_ws(app: &App, token: Option<&str>) -> WsClient {
    let url = match token {
        Some(token) => format!("ws://{}/ws?token={token}", app.addr),
        None => format!("ws://{}/ws", app.addr),
    };
    let (stream, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    stream
}

async fn next_envelope(client: &mut WsClient) -> aicli_wire::WsMessage {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(10), client.next())
            .await
            .expect("ws read timed out")
            .expect("ws stream ended")
            .expect("ws read failed");
        match message {
            Message::Text(text) => return aicli_wire::WsMessage::decode(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected ws message: {other:?}"),
        }
    }
}

async fn expect_close_code(client: &mut WsClient, expected: u16) {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(10), client.next())
            .await
            .expect("ws read timed out");
        match message {
            Some(Ok(Message::Close(Some(frame)))) => {
                assert_eq!(u16::from(frame.code), expected);
                return;
            }
            Some(Ok(Message::Close(None))) => panic!("close frame without code"),
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => panic!("connection dropped before close frame"),
        }
    }
}

fn subscribe_frame(channels: &[&str]) -> Message {
    let frame = aicli_wire::WsMessage::new(
        aicli_wire::MessageType::Subscribe,
        serde_json::json!({ "channels": channels }),
        0,
    );
    Message::Text(frame.encode().into())
}

#[tokio::test]
async fn happy_path_prompt_to_terminal_event() {
    let app = spawn_app(AppOptions::default()).await;
    let (_workspace, project) = workspace_and_project(&app).await;

    let session = app.state.manager.create(&project).await.unwrap();
    app.runtime.script_with_delay("echo hello", &["hello"], Duration::from_millis(150));

    let task = app.state.queue.submit(session.id, "echo hello").await.unwrap();

    // Subscribe to the task channel while the scripted reply is delayed.
    let mut client = connect_ws(&app, Some(&app.token)).await;
    client.send(subscribe_frame(&[&format!("task:{}", task.id)])).await.unwrap();
    let ack = next_envelope(&mut client).await;
    assert_eq!(ack.kind, aicli_wire::MessageType::Success);
    assert_eq!(ack.data["results"][0]["ok"], true);

    // Give the duration a visible width on the fake clock.
    app.clock.advance(Duration::from_millis(200));

    // Output chunk first, then the terminal event.
    let mut saw_hello = false;
    loop {
        let frame = next_envelope(&mut client).await;
        match frame.kind {
            aicli_wire::MessageType::Log => {
                if frame.data["line"] == "hello" {
                    saw_hello = true;
                }
            }
            aicli_wire::MessageType::Task => {
                if frame.data["name"] == "task.started" {
                    continue;
                }
                assert_eq!(frame.data["name"], "task.completed");
                break;
            }
            other => panic!("unexpected frame type {other:?}"),
        }
    }
    assert!(saw_hello, "log frame with the output line");

    let record = app.state.queue.get(&task.id).await.unwrap();
    assert_eq!(record.status, TaskStatus::Completed);
    assert!(record.output.contains("hello"));
    assert!(record.duration_ms > 0);
}

#[tokio::test]
async fn ws_rejects_missing_and_invalid_tokens() {
    let app = spawn_app(AppOptions::default()).await;

    let mut no_token = connect_ws(&app, None).await;
    expect_close_code(&mut no_token, aicli_wire::close_code::NO_TOKEN).await;

    let mut bad_token = connect_ws(&app, Some("tok-wrong")).await;
    expect_close_code(&mut bad_token, aicli_wire::close_code::INVALID_TOKEN).await;
}

#[tokio::test]
async fn ws_connection_cap_closes_with_4009() {
    let app = spawn_app(AppOptions { max_clients: 1, ..Default::default() }).await;

    let mut first = connect_ws(&app, Some(&app.token)).await;
    // Prove the first connection is fully registered.
    first
        .send(Message::Text(
            aicli_wire::WsMessage::new(aicli_wire::MessageType::Ping, serde_json::Value::Null, 0)
                .encode()
                .into(),
        ))
        .await
        .unwrap();
    let pong = next_envelope(&mut first).await;
    assert_eq!(pong.kind, aicli_wire::MessageType::Pong);

    let mut second = connect_ws(&app, Some(&app.token)).await;
    expect_close_code(&mut second, aicli_wire::close_code::MAX_CLIENTS_EXCEEDED).await;
}

#[tokio::test]
async fn ws_oversized_frame_disconnects() {
    let app = spawn_app(AppOptions { max_message: 512, ..Default::default() }).await;

    let mut client = connect_ws(&app, Some(&app.token)).await;
    let huge = "x".repeat(4 * 1024);
    // The server either rejects it in the read pump (1009) or the
    // protocol layer kills the socket; both end the connection.
    let _ = client.send(Message::Text(huge.into())).await;

    let ended = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "oversized frame must end the connection");
}

#[tokio::test]
async fn ws_subscribe_errors_are_per_channel() {
    let app = spawn_app(AppOptions::default()).await;
    let mut client = connect_ws(&app, Some(&app.token)).await;

    client.send(subscribe_frame(&["broadcast", "system", "nope"])).await.unwrap();
    let ack = next_envelope(&mut client).await;

    let results = ack.data["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["ok"], true);
    assert_eq!(results[1]["ok"], false, "system requires admin");
    assert_eq!(results[2]["ok"], false, "unknown channel");
}

#[tokio::test]
async fn session_events_reach_workspace_subscribers() {
    let app = spawn_app(AppOptions::default()).await;
    let (workspace, project) = workspace_and_project(&app).await;

    let mut client = connect_ws(&app, Some(&app.token)).await;
    client.send(subscribe_frame(&[&format!("workspace:{}", workspace.id)])).await.unwrap();
    let ack = next_envelope(&mut client).await;
    assert_eq!(ack.data["results"][0]["ok"], true);

    let session = app.state.manager.create(&project).await.unwrap();

    let frame = next_envelope(&mut client).await;
    assert_eq!(frame.kind, aicli_wire::MessageType::Session);
    assert_eq!(frame.data["name"], "session.created");
    assert_eq!(frame.data["session_id"], session.id.as_str());
}

#[tokio::test]
async fn cancellation_keeps_the_session_usable_end_to_end() {
    let app = spawn_app(AppOptions::default()).await;
    let (_workspace, project) = workspace_and_project(&app).await;
    let session = app.state.manager.create(&project).await.unwrap();
    app.runtime.script_hang("work forever");

    let task = app.state.queue.submit(session.id, "work forever").await.unwrap();

    let mut client = connect_ws(&app, Some(&app.token)).await;
    client.send(subscribe_frame(&[&format!("task:{}", task.id)])).await.unwrap();
    let _ack = next_envelope(&mut client).await;

    // Wait until it is running, then cancel.
    for _ in 0..100 {
        if app.state.queue.get(&task.id).await.unwrap().status == TaskStatus::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    app.state.queue.cancel(&task.id).await.unwrap();

    // The subscriber sees a terminal cancelled event.
    loop {
        let frame = next_envelope(&mut client).await;
        if frame.kind == aicli_wire::MessageType::Task && frame.data["name"] != "task.started" {
            assert_eq!(frame.data["name"], "task.cancelled");
            break;
        }
    }

    // Session is still active and accepts the next task.
    let record = app.state.repos.sessions.get(&session.id).await.unwrap();
    assert_eq!(record.status, aicli_core::SessionStatus::Active);
    let next = app.state.queue.submit(session.id, "echo again").await.unwrap();
    for _ in 0..200 {
        if app.state.queue.get(&next.id).await.unwrap().status == TaskStatus::Completed {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("follow-up task never completed");
}
