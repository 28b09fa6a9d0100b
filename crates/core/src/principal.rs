// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated caller identity.

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for an authenticated principal.
    pub struct PrincipalId("usr-");
}

/// An authenticated caller, as produced by the `TokenVerifier` collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub name: String,
    /// Admins may subscribe to the `system` channel and read any entity.
    pub admin: bool,
}

impl Principal {
    pub fn new(id: PrincipalId, name: impl Into<String>) -> Self {
        Self { id, name: name.into(), admin: false }
    }

    pub fn admin(id: PrincipalId, name: impl Into<String>) -> Self {
        Self { id, name: name.into(), admin: true }
    }
}
