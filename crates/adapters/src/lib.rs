// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! aicli-adapters: seams to external collaborators.
//!
//! The [`ContainerRuntime`] trait isolates agent subprocesses from the
//! session manager; [`TokenVerifier`] and [`AccessChecker`] isolate the
//! auth primitives from the broker and REST layer. Production adapters and
//! fakes implement the same traits so every subsystem test runs without
//! real processes or real tokens.

pub mod auth;
mod local;
mod runtime;

pub use auth::{
    AccessChecker, AllowAllAccess, AuthError, BearerMapVerifier, Resource, TokenVerifier,
};
pub use local::LocalProcessRuntime;
pub use runtime::{
    ContainerRuntime, ExitStatus, OutputChunk, OutputStream, RuntimeError, RuntimeEvent, Signal,
    SpawnSpec, EOT_MARKER,
};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeRuntime, RuntimeCall};
