// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn bearer_map_verifies_known_tokens() {
    let verifier = BearerMapVerifier::new();
    let alice = verifier.register("tok-alice", "alice", false);

    let verified = verifier.verify("tok-alice").unwrap();
    assert_eq!(verified, alice);
    assert!(!verified.admin);
}

#[test]
fn bearer_map_rejects_unknown_and_empty() {
    let verifier = BearerMapVerifier::new();
    verifier.register("tok", "user", false);

    assert_eq!(verifier.verify("other").unwrap_err(), AuthError::InvalidToken);
    assert_eq!(verifier.verify("").unwrap_err(), AuthError::MissingToken);
}

#[test]
fn register_admin_sets_the_flag() {
    let verifier = BearerMapVerifier::new();
    let root = verifier.register("tok-root", "root", true);
    assert!(root.admin);
}

#[test]
fn allow_all_grants_everything() {
    let checker = AllowAllAccess;
    let principal = Principal::new(PrincipalId::generate(), "user");
    let resource = Resource::Session(SessionId::from_string("ses-a"));

    assert!(checker.can_read(&principal, &resource));
    assert!(checker.can_write(&principal, &resource));
}
