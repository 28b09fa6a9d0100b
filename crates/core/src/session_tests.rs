// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn session() -> SessionRecord {
    SessionRecord::new(ProjectId::from_string("prj-a"), 1_000)
}

#[parameterized(
    spawn_ok = { SessionStatus::Pending, SessionStatus::Active },
    spawn_fail = { SessionStatus::Pending, SessionStatus::Error },
    close_before_ready = { SessionStatus::Pending, SessionStatus::Ending },
    goes_idle = { SessionStatus::Active, SessionStatus::Idle },
    reactivates = { SessionStatus::Idle, SessionStatus::Active },
    close_active = { SessionStatus::Active, SessionStatus::Ending },
    close_idle = { SessionStatus::Idle, SessionStatus::Ending },
    crash_active = { SessionStatus::Active, SessionStatus::Error },
    crash_idle = { SessionStatus::Idle, SessionStatus::Error },
    drain_done = { SessionStatus::Ending, SessionStatus::Ended },
    cleanup_done = { SessionStatus::Error, SessionStatus::Ended },
)]
fn legal_transitions(from: SessionStatus, to: SessionStatus) {
    assert!(from.can_transition(to), "{from} -> {to} should be legal");
}

#[parameterized(
    skip_spawn = { SessionStatus::Pending, SessionStatus::Idle },
    skip_drain = { SessionStatus::Active, SessionStatus::Ended },
    ended_reopen = { SessionStatus::Ended, SessionStatus::Active },
    ended_error = { SessionStatus::Ended, SessionStatus::Error },
    ending_back = { SessionStatus::Ending, SessionStatus::Active },
    error_revive = { SessionStatus::Error, SessionStatus::Active },
)]
fn illegal_transitions(from: SessionStatus, to: SessionStatus) {
    assert!(!from.can_transition(to), "{from} -> {to} should be illegal");
}

#[test]
fn terminal_is_sticky() {
    let ended = SessionStatus::Ended;
    assert!(ended.is_terminal());
    for to in [
        SessionStatus::Pending,
        SessionStatus::Active,
        SessionStatus::Idle,
        SessionStatus::Ending,
        SessionStatus::Error,
    ] {
        assert!(!ended.can_transition(to));
    }
}

#[test]
fn live_and_task_acceptance() {
    assert!(SessionStatus::Pending.is_live());
    assert!(SessionStatus::Active.is_live());
    assert!(SessionStatus::Ending.is_live());
    assert!(!SessionStatus::Ended.is_live());
    assert!(!SessionStatus::Error.is_live());

    assert!(SessionStatus::Active.accepts_tasks());
    assert!(SessionStatus::Idle.accepts_tasks());
    assert!(!SessionStatus::Pending.accepts_tasks());
    assert!(!SessionStatus::Ending.accepts_tasks());
}

#[test]
fn transition_updates_timestamps() {
    let mut s = session();
    s.transition(SessionStatus::Active, 2_000).unwrap();
    assert_eq!(s.last_active_at, 2_000);

    s.transition(SessionStatus::Ending, 3_000).unwrap();
    s.transition(SessionStatus::Ended, 4_000).unwrap();
    assert_eq!(s.ended_at, Some(4_000));
}

#[test]
fn transition_rejects_illegal_edge() {
    let mut s = session();
    let err = s.transition(SessionStatus::Idle, 2_000).unwrap_err();
    assert_eq!(err, TransitionError { from: SessionStatus::Pending, to: SessionStatus::Idle });
    // State unchanged on rejection.
    assert_eq!(s.status, SessionStatus::Pending);
}

#[test]
fn touch_moves_last_active() {
    let mut s = session();
    s.touch(9_999);
    assert_eq!(s.last_active_at, 9_999);
    assert_eq!(s.started_at, 1_000);
}

#[test]
fn new_session_shape() {
    let s = session();
    assert!(s.id.as_str().starts_with("ses-"));
    assert_eq!(s.status, SessionStatus::Pending);
    assert_eq!(s.command_count, 0);
    assert!(s.metadata.is_empty());
}
