// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layered daemon configuration: defaults ← TOML file ← environment.
//!
//! Duration fields accept `ms/s/m/h/d` suffixes in both the file and the
//! environment. The environment names (`SERVER_PORT`, `SESSIONS_MAX`, ...)
//! are the deployment contract.

use crate::env;
use aicli_core::limits;
use serde::Deserialize;
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerEnv {
    Development,
    Production,
}

/// One static bearer token mapped to a principal.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenEntry {
    pub token: String,
    pub name: String,
    #[serde(default)]
    pub admin: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub sessions: SessionsConfig,
    pub tasks: TasksConfig,
    pub ws: WsConfig,
    pub cache: CacheSection,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub port: u16,
    pub env: ServerEnv,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Required in production; verifier collaborators consume it.
    pub jwt_secret: Option<String>,
    /// Static tokens for dev deployments and tests.
    pub tokens: Vec<TokenEntry>,
    #[serde(with = "duration_str")]
    pub access_token_ttl: Duration,
    #[serde(with = "duration_str")]
    pub refresh_token_ttl: Duration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionsConfig {
    pub max_sessions: usize,
    #[serde(with = "duration_str")]
    pub idle_timeout: Duration,
    #[serde(with = "duration_str")]
    pub lifetime: Duration,
    #[serde(with = "duration_str")]
    pub cleanup_interval: Duration,
    #[serde(with = "duration_str")]
    pub kill_grace: Duration,
    /// Per-session output chunk buffer (chunks).
    pub output_buffer: usize,
    /// Shell command that launches the agent CLI.
    pub agent_command: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TasksConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    #[serde(with = "duration_str")]
    pub task_timeout: Duration,
    /// Captured output cap per task (bytes).
    pub output_cap: usize,
    /// Allowed command prefixes; empty permits everything.
    pub allowed_commands: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WsConfig {
    pub max_clients: usize,
    #[serde(with = "duration_str")]
    pub ping_interval: Duration,
    #[serde(with = "duration_str")]
    pub read_timeout: Duration,
    pub max_message: usize,
    pub send_buffer: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSection {
    pub l1_max_bytes: u64,
    pub l1_max_entries: usize,
    pub l2_dir: PathBuf,
    pub l2_max_bytes: u64,
    pub l2_max_entries: usize,
    /// lru | lfu | fifo | ttl | adaptive
    pub eviction: String,
    pub l1_to_l2_promotion: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Requests per minute, keyed by IP.
    pub anon_per_minute: u32,
    /// Requests per minute, keyed by principal.
    pub auth_per_minute: u32,
    pub whitelist: HashSet<IpAddr>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            sessions: SessionsConfig::default(),
            tasks: TasksConfig::default(),
            ws: WsConfig::default(),
            cache: CacheSection::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080, env: ServerEnv::Development }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            tokens: Vec::new(),
            access_token_ttl: Duration::from_secs(15 * 60),
            refresh_token_ttl: Duration::from_secs(168 * 60 * 60),
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_sessions: limits::DEFAULT_MAX_SESSIONS,
            idle_timeout: limits::DEFAULT_IDLE_TIMEOUT,
            lifetime: limits::DEFAULT_SESSION_LIFETIME,
            cleanup_interval: limits::DEFAULT_CLEANUP_INTERVAL,
            kill_grace: limits::DEFAULT_KILL_GRACE,
            output_buffer: limits::DEFAULT_SESSION_OUTPUT_BUFFER,
            agent_command: "claude --interactive".to_string(),
        }
    }
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            workers: limits::DEFAULT_WORKERS,
            queue_capacity: limits::DEFAULT_QUEUE_CAPACITY,
            task_timeout: limits::DEFAULT_TASK_TIMEOUT,
            output_cap: limits::DEFAULT_TASK_OUTPUT_CAP,
            allowed_commands: Vec::new(),
        }
    }
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            max_clients: limits::DEFAULT_MAX_CONNECTIONS,
            ping_interval: limits::DEFAULT_PING_INTERVAL,
            read_timeout: limits::DEFAULT_READ_TIMEOUT,
            max_message: limits::DEFAULT_WS_MAX_MESSAGE,
            send_buffer: limits::DEFAULT_WS_SEND_BUFFER,
        }
    }
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            l1_max_bytes: limits::DEFAULT_L1_MAX_BYTES,
            l1_max_entries: 10_000,
            l2_dir: PathBuf::from("/tmp/aicli-cache"),
            l2_max_bytes: limits::DEFAULT_L2_MAX_BYTES,
            l2_max_entries: 100_000,
            eviction: "lru".to_string(),
            l1_to_l2_promotion: true,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            anon_per_minute: limits::DEFAULT_RATE_LIMIT_ANON,
            auth_per_minute: limits::DEFAULT_RATE_LIMIT_AUTH,
            whitelist: HashSet::new(),
        }
    }
}

impl DaemonConfig {
    /// Defaults ← optional file ← environment, then validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| ConfigError::Read { path: path.to_path_buf(), source: e })?;
                toml::from_str(&text)
                    .map_err(|e| ConfigError::Parse { path: path.to_path_buf(), source: e })?
            }
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply the deployment-contract environment overrides.
    pub fn apply_env(&mut self) {
        if let Some(port) = env::parse("SERVER_PORT") {
            self.server.port = port;
        }
        if let Some(value) = env::string("SERVER_ENV") {
            match value.as_str() {
                "production" => self.server.env = ServerEnv::Production,
                "development" => self.server.env = ServerEnv::Development,
                other => tracing::warn!(value = other, "unknown SERVER_ENV, keeping configured"),
            }
        }
        if let Some(secret) = env::string("JWT_SECRET") {
            self.auth.jwt_secret = Some(secret);
        }
        if let Some(ttl) = env::duration("ACCESS_TOKEN_TTL") {
            self.auth.access_token_ttl = ttl;
        }
        if let Some(ttl) = env::duration("REFRESH_TOKEN_TTL") {
            self.auth.refresh_token_ttl = ttl;
        }
        if let Some(max) = env::parse("SESSIONS_MAX") {
            self.sessions.max_sessions = max;
        }
        if let Some(timeout) = env::duration("SESSION_IDLE_TIMEOUT") {
            self.sessions.idle_timeout = timeout;
        }
        if let Some(lifetime) = env::duration("SESSION_LIFETIME") {
            self.sessions.lifetime = lifetime;
        }
        if let Some(interval) = env::duration("SESSION_CLEANUP_INTERVAL") {
            self.sessions.cleanup_interval = interval;
        }
        if let Some(workers) = env::parse("WORKERS") {
            self.tasks.workers = workers;
        }
        if let Some(capacity) = env::parse("TASK_QUEUE_CAPACITY") {
            self.tasks.queue_capacity = capacity;
        }
        if let Some(timeout) = env::duration("TASK_TIMEOUT") {
            self.tasks.task_timeout = timeout;
        }
        if let Some(allowed) = env::string("TASK_ALLOWED_COMMANDS") {
            self.tasks.allowed_commands =
                allowed.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        if let Some(max) = env::parse("WS_MAX_CLIENTS") {
            self.ws.max_clients = max;
        }
        if let Some(interval) = env::duration("WS_PING_INTERVAL") {
            self.ws.ping_interval = interval;
        }
        if let Some(timeout) = env::duration("WS_READ_TIMEOUT") {
            self.ws.read_timeout = timeout;
        }
        if let Some(size) = env::parse("WS_MAX_MESSAGE") {
            self.ws.max_message = size;
        }
        if let Some(bytes) = env::bytes("CACHE_L1_MAX_BYTES") {
            self.cache.l1_max_bytes = bytes;
        }
        if let Some(dir) = env::string("CACHE_L2_DIR") {
            self.cache.l2_dir = PathBuf::from(dir);
        }
        if let Some(bytes) = env::bytes("CACHE_L2_MAX_BYTES") {
            self.cache.l2_max_bytes = bytes;
        }
        if let Some(policy) = env::string("CACHE_EVICTION") {
            self.cache.eviction = policy;
        }
        if let Some(limit) = env::parse("RATE_LIMIT_ANON") {
            self.rate_limit.anon_per_minute = limit;
        }
        if let Some(limit) = env::parse("RATE_LIMIT_AUTH") {
            self.rate_limit.auth_per_minute = limit;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.env == ServerEnv::Production && self.auth.jwt_secret.is_none() {
            return Err(ConfigError::Invalid("JWT_SECRET is required in production".to_string()));
        }
        if self.tasks.workers == 0 {
            return Err(ConfigError::Invalid("WORKERS must be at least 1".to_string()));
        }
        if self.sessions.max_sessions == 0 {
            return Err(ConfigError::Invalid("SESSIONS_MAX must be at least 1".to_string()));
        }
        aicli_cache::EvictionPolicy::parse(&self.cache.eviction)
            .map_err(ConfigError::Invalid)?;
        Ok(())
    }

    pub fn eviction_policy(&self) -> aicli_cache::EvictionPolicy {
        aicli_cache::EvictionPolicy::parse(&self.cache.eviction)
            .unwrap_or(aicli_cache::EvictionPolicy::Lru)
    }
}

/// Serde adapter for duration strings ("30m", "45s", "250ms").
mod duration_str {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        aicli_core::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
