// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

fn spec(session_id: &str, command: &str, dir: &std::path::Path) -> SpawnSpec {
    SpawnSpec::new(SessionId::from_string(session_id), command, dir.to_path_buf())
}

async fn collect_until_exit(rx: &mut mpsc::Receiver<RuntimeEvent>) -> (Vec<OutputChunk>, ExitStatus) {
    let mut chunks = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("runtime event timed out")
            .expect("event channel closed before exit");
        match event {
            RuntimeEvent::Output(chunk) => chunks.push(chunk),
            RuntimeEvent::ReadError { .. } => {}
            RuntimeEvent::Exited(status) => return (chunks, status),
        }
    }
}

#[tokio::test]
async fn spawn_streams_stdout_then_exit() {
    let tmp = tempfile::tempdir().unwrap();
    let runtime = LocalProcessRuntime::new();
    let (tx, mut rx) = mpsc::channel(64);

    runtime.spawn(spec("ses-out", "echo hello; echo world", tmp.path()), tx).await.unwrap();

    let (chunks, status) = collect_until_exit(&mut rx).await;
    let lines: Vec<&str> = chunks.iter().map(|c| c.data.as_str()).collect();
    assert_eq!(lines, vec!["hello", "world"]);
    assert!(chunks.iter().all(|c| c.stream == OutputStream::Stdout));
    assert_eq!(status.code, Some(0));
}

#[tokio::test]
async fn stderr_is_tagged() {
    let tmp = tempfile::tempdir().unwrap();
    let runtime = LocalProcessRuntime::new();
    let (tx, mut rx) = mpsc::channel(64);

    runtime.spawn(spec("ses-err", "echo oops >&2", tmp.path()), tx).await.unwrap();

    let (chunks, _) = collect_until_exit(&mut rx).await;
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].stream, OutputStream::Stderr);
    assert_eq!(chunks[0].data, "oops");
}

#[tokio::test]
async fn exit_code_is_propagated() {
    let tmp = tempfile::tempdir().unwrap();
    let runtime = LocalProcessRuntime::new();
    let (tx, mut rx) = mpsc::channel(64);

    runtime.spawn(spec("ses-code", "exit 3", tmp.path()), tx).await.unwrap();

    let (_, status) = collect_until_exit(&mut rx).await;
    assert_eq!(status.code, Some(3));
}

#[tokio::test]
async fn stdin_reaches_the_process() {
    let tmp = tempfile::tempdir().unwrap();
    let runtime = LocalProcessRuntime::new();
    let (tx, mut rx) = mpsc::channel(64);
    let session = SessionId::from_string("ses-in");

    // `head -1` exits after echoing one line back.
    runtime.spawn(spec("ses-in", "head -1", tmp.path()), tx).await.unwrap();
    runtime.send_stdin(&session, "ping").await.unwrap();

    let (chunks, status) = collect_until_exit(&mut rx).await;
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].data, "ping");
    assert_eq!(status.code, Some(0));
}

#[tokio::test]
async fn eot_marker_env_is_exported() {
    let tmp = tempfile::tempdir().unwrap();
    let runtime = LocalProcessRuntime::new();
    let (tx, mut rx) = mpsc::channel(64);

    runtime
        .spawn(spec("ses-env", "printf '%s\\n' \"$AICLI_EOT_MARKER\"", tmp.path()), tx)
        .await
        .unwrap();

    let (chunks, _) = collect_until_exit(&mut rx).await;
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].is_eot());
}

#[tokio::test]
async fn terminate_signal_stops_the_process() {
    let tmp = tempfile::tempdir().unwrap();
    let runtime = LocalProcessRuntime::new();
    let (tx, mut rx) = mpsc::channel(64);
    let session = SessionId::from_string("ses-term");

    runtime.spawn(spec("ses-term", "sleep 30", tmp.path()), tx).await.unwrap();
    runtime.signal(&session, Signal::Terminate).await.unwrap();

    let (_, status) = collect_until_exit(&mut rx).await;
    // Killed by signal: no exit code.
    assert_eq!(status.code, None);
}

#[tokio::test]
async fn spawn_rejects_missing_workdir() {
    let runtime = LocalProcessRuntime::new();
    let (tx, _rx) = mpsc::channel(64);

    let err = runtime
        .spawn(spec("ses-bad", "true", std::path::Path::new("/nonexistent/dir")), tx)
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::SpawnFailed(_)));
}

#[tokio::test]
async fn remove_clears_tracking() {
    let tmp = tempfile::tempdir().unwrap();
    let runtime = LocalProcessRuntime::new();
    let (tx, mut rx) = mpsc::channel(64);
    let session = SessionId::from_string("ses-rm");

    runtime.spawn(spec("ses-rm", "sleep 30", tmp.path()), tx).await.unwrap();
    assert!(runtime.is_running(&session).await);

    runtime.remove(&session).await;
    assert!(!runtime.is_running(&session).await);

    // The watcher still reaps the killed child.
    let (_, status) = collect_until_exit(&mut rx).await;
    assert_eq!(status.code, None);

    let err = runtime.send_stdin(&session, "x").await.unwrap_err();
    assert!(matches!(err, RuntimeError::NotFound(_)));
}
