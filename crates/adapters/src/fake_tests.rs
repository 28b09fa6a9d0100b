// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::PathBuf;

fn spec(id: &str) -> SpawnSpec {
    SpawnSpec::new(SessionId::from_string(id), "claude", PathBuf::from("/tmp"))
}

#[tokio::test]
async fn unscripted_commands_echo_then_end_turn() {
    let runtime = FakeRuntime::new();
    let (tx, mut rx) = mpsc::channel(16);
    runtime.spawn(spec("ses-a"), tx).await.unwrap();

    runtime.send_stdin(&SessionId::from_string("ses-a"), "echo hello").await.unwrap();

    let first = rx.recv().await.unwrap();
    assert_eq!(first, RuntimeEvent::Output(OutputChunk::stdout("echo hello")));
    let second = rx.recv().await.unwrap();
    match second {
        RuntimeEvent::Output(chunk) => assert!(chunk.is_eot()),
        other => panic!("expected eot, got {other:?}"),
    }
}

#[tokio::test]
async fn scripted_commands_reply_with_script() {
    let runtime = FakeRuntime::new();
    runtime.script("run tests", &["compiling", "ok"]);
    let (tx, mut rx) = mpsc::channel(16);
    runtime.spawn(spec("ses-a"), tx).await.unwrap();

    runtime.send_stdin(&SessionId::from_string("ses-a"), "run tests").await.unwrap();

    let mut lines = Vec::new();
    for _ in 0..3 {
        if let RuntimeEvent::Output(chunk) = rx.recv().await.unwrap() {
            lines.push(chunk);
        }
    }
    assert_eq!(lines[0].data, "compiling");
    assert_eq!(lines[1].data, "ok");
    assert!(lines[2].is_eot());
}

#[tokio::test]
async fn hanging_commands_produce_nothing() {
    let runtime = FakeRuntime::new();
    runtime.script_hang("slow");
    let (tx, mut rx) = mpsc::channel(16);
    runtime.spawn(spec("ses-a"), tx).await.unwrap();

    runtime.send_stdin(&SessionId::from_string("ses-a"), "slow").await.unwrap();
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn spawn_failure_is_one_shot() {
    let runtime = FakeRuntime::new();
    runtime.fail_next_spawn("no container");

    let (tx, _rx) = mpsc::channel(16);
    let err = runtime.spawn(spec("ses-a"), tx).await.unwrap_err();
    assert!(matches!(err, RuntimeError::SpawnFailed(_)));

    let (tx, _rx) = mpsc::channel(16);
    runtime.spawn(spec("ses-b"), tx).await.unwrap();
}

#[tokio::test]
async fn terminate_emits_exit_and_forgets_the_session() {
    let runtime = FakeRuntime::new();
    let session = SessionId::from_string("ses-a");
    let (tx, mut rx) = mpsc::channel(16);
    runtime.spawn(spec("ses-a"), tx).await.unwrap();

    runtime.signal(&session, Signal::Terminate).await.unwrap();

    assert_eq!(rx.recv().await.unwrap(), RuntimeEvent::Exited(ExitStatus { code: None }));
    assert!(!runtime.is_running(&session).await);
}

#[tokio::test]
async fn calls_are_recorded_in_order() {
    let runtime = FakeRuntime::new();
    let session = SessionId::from_string("ses-a");
    let (tx, _rx) = mpsc::channel(16);

    runtime.spawn(spec("ses-a"), tx).await.unwrap();
    runtime.send_stdin(&session, "ls").await.unwrap();
    runtime.signal(&session, Signal::Interrupt).await.unwrap();
    runtime.remove(&session).await;

    assert_eq!(
        runtime.calls(),
        vec![
            RuntimeCall::Spawn(session),
            RuntimeCall::Stdin(session, "ls".to_string()),
            RuntimeCall::Signal(session, Signal::Interrupt),
            RuntimeCall::Remove(session),
        ]
    );
}
