// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::DaemonConfig;
use serial_test::serial;

fn test_config(cache_dir: &std::path::Path) -> DaemonConfig {
    let mut config = DaemonConfig::default();
    config.server.port = 0; // ephemeral
    config.cache.l2_dir = cache_dir.to_path_buf();
    config
}

#[tokio::test]
#[serial]
async fn startup_wires_every_subsystem() {
    let tmp = tempfile::tempdir().unwrap();
    let daemon = startup(test_config(tmp.path())).await.unwrap();

    assert!(daemon.local_addr().is_some());
    assert_eq!(daemon.state.manager.live_count(), 0);
    assert_eq!(daemon.state.hub.connection_count(), 0);
    assert!(!daemon.state.queue.is_stopped());

    // Graceful stop: serve returns once the token fires.
    let handle = daemon.shutdown_handle();
    let server = tokio::spawn(daemon.serve());
    handle.cancel();
    tokio::time::timeout(std::time::Duration::from_secs(10), server)
        .await
        .expect("serve did not stop")
        .expect("serve task panicked")
        .expect("serve returned an error");
}

#[tokio::test]
#[serial]
async fn startup_fails_on_unbindable_port() {
    let tmp = tempfile::tempdir().unwrap();
    let first = startup(test_config(tmp.path())).await.unwrap();
    let addr = first.local_addr().unwrap();

    let tmp2 = tempfile::tempdir().unwrap();
    let mut config = test_config(tmp2.path());
    config.server.port = addr.port();

    let err = startup(config).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Bind { .. }));
}
