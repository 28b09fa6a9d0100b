// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authentication and authorization seams.
//!
//! The JWT/RBAC stack is an external collaborator; the broker and REST
//! layer only ever see these two traits. The bearer-map verifier covers
//! static-token deployments and every test; a JWT verifier is another
//! implementation of the same trait.

use aicli_core::{Principal, PrincipalId, ProjectId, SessionId, TaskId, WorkspaceId};
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("no token provided")]
    MissingToken,

    #[error("invalid token")]
    InvalidToken,
}

/// Validates bearer tokens into principals.
pub trait TokenVerifier: Send + Sync + 'static {
    fn verify(&self, token: &str) -> Result<Principal, AuthError>;
}

/// Entity targets for access checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Workspace(WorkspaceId),
    Project(ProjectId),
    Session(SessionId),
    Task(TaskId),
}

/// Answers "may principal P touch entity E?".
pub trait AccessChecker: Send + Sync + 'static {
    fn can_read(&self, principal: &Principal, resource: &Resource) -> bool;
    fn can_write(&self, principal: &Principal, resource: &Resource) -> bool;
}

/// Static token → principal map, populated from configuration.
#[derive(Default)]
pub struct BearerMapVerifier {
    tokens: RwLock<HashMap<String, Principal>>,
}

impl BearerMapVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, token: impl Into<String>, principal: Principal) {
        self.tokens.write().insert(token.into(), principal);
    }

    /// Convenience for tests and config bootstrap: registers a token and
    /// returns the principal it maps to.
    pub fn register(&self, token: impl Into<String>, name: &str, admin: bool) -> Principal {
        let principal = if admin {
            Principal::admin(PrincipalId::generate(), name)
        } else {
            Principal::new(PrincipalId::generate(), name)
        };
        self.insert(token, principal.clone());
        principal
    }
}

impl TokenVerifier for BearerMapVerifier {
    fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        self.tokens.read().get(token).cloned().ok_or(AuthError::InvalidToken)
    }
}

/// Grants every authenticated principal access to everything. Admin-only
/// surfaces still check `Principal::admin` separately.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllAccess;

impl AccessChecker for AllowAllAccess {
    fn can_read(&self, _principal: &Principal, _resource: &Resource) -> bool {
        true
    }

    fn can_write(&self, _principal: &Principal, _resource: &Resource) -> bool {
        true
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
