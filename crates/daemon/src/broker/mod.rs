// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket broker: exclusive owner of connection descriptors.
//!
//! The hub keeps three indices: connections by ID, connection IDs by
//! channel, and connection IDs by principal. Broadcast paths take read
//! locks; register/unregister take write locks briefly. Every connection
//! has a bounded send buffer owned by its write pump; a full buffer closes
//! that connection rather than blocking the broadcaster.

mod connection;

pub(crate) use connection::serve;

use crate::publish::FramePublisher;
use aicli_adapters::{AccessChecker, Resource, TokenVerifier};
use aicli_core::{Clock, ConnectionId, Event, Principal, PrincipalId};
use aicli_wire::{close_code, Channel, MessageType, SubscribeAck, WsMessage};
use parking_lot::RwLock;
use smol_str::SmolStr;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Broker tunables, extracted from the daemon configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub max_connections: usize,
    pub send_buffer: usize,
    pub ping_interval: Duration,
    pub read_timeout: Duration,
    pub max_message: usize,
}

impl From<&crate::config::WsConfig> for BrokerConfig {
    fn from(c: &crate::config::WsConfig) -> Self {
        Self {
            max_connections: c.max_clients,
            send_buffer: c.send_buffer,
            ping_interval: c.ping_interval,
            read_timeout: c.read_timeout,
            max_message: c.max_message,
        }
    }
}

#[derive(Debug, Error)]
pub enum HubError {
    #[error("connection limit reached ({0})")]
    MaxClients(usize),

    #[error("connection not found: {0}")]
    NotFound(ConnectionId),
}

/// Handed to a connection's pumps at registration.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub principal: Principal,
    pub rx: mpsc::Receiver<String>,
    /// Hub-initiated teardown; the close code is in `close_reason`.
    pub kill: CancellationToken,
    pub close_reason: Arc<OnceLock<u16>>,
}

struct ConnectionEntry {
    principal: Principal,
    tx: mpsc::Sender<String>,
    kill: CancellationToken,
    close_reason: Arc<OnceLock<u16>>,
    subscriptions: HashSet<SmolStr>,
    meta: Arc<ConnMeta>,
}

#[derive(Default)]
struct ConnMeta {
    connected_at: AtomicU64,
    last_rx_at: AtomicU64,
    last_tx_at: AtomicU64,
}

/// Broker-local view of one connection, for introspection and tests.
#[derive(Debug, Clone)]
pub struct ConnectionDescriptor {
    pub id: ConnectionId,
    pub principal_id: PrincipalId,
    pub subscribed_channels: Vec<SmolStr>,
    pub authenticated: bool,
    pub last_rx_at: u64,
    pub last_tx_at: u64,
    pub send_queue_depth: usize,
}

/// Targets of one broadcast request.
#[derive(Debug, Clone, Default)]
pub struct BroadcastRequest {
    pub target_channels: Vec<SmolStr>,
    pub target_users: Vec<PrincipalId>,
    pub exclude: Vec<ConnectionId>,
}

pub struct Hub<C: Clock> {
    config: BrokerConfig,
    clock: C,
    verifier: Arc<dyn TokenVerifier>,
    access: Arc<dyn AccessChecker>,
    connections: RwLock<HashMap<ConnectionId, ConnectionEntry>>,
    channels: RwLock<HashMap<SmolStr, HashSet<ConnectionId>>>,
    users: RwLock<HashMap<PrincipalId, HashSet<ConnectionId>>>,
}

impl<C: Clock> Hub<C> {
    pub fn new(
        config: BrokerConfig,
        clock: C,
        verifier: Arc<dyn TokenVerifier>,
        access: Arc<dyn AccessChecker>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            clock,
            verifier,
            access,
            connections: RwLock::new(HashMap::new()),
            channels: RwLock::new(HashMap::new()),
            users: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub(crate) fn verifier(&self) -> &Arc<dyn TokenVerifier> {
        &self.verifier
    }

    pub(crate) fn now_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Register an authenticated connection, enforcing the cap and
    /// auto-subscribing the principal's own channel.
    pub fn register(&self, principal: Principal) -> Result<ConnectionHandle, HubError> {
        let id = ConnectionId::generate();
        let (tx, rx) = mpsc::channel(self.config.send_buffer);
        let kill = CancellationToken::new();
        let close_reason = Arc::new(OnceLock::new());
        let now = self.clock.epoch_ms();
        let user_channel = SmolStr::new(format!("user:{}", principal.id));

        {
            let mut connections = self.connections.write();
            if connections.len() >= self.config.max_connections {
                return Err(HubError::MaxClients(self.config.max_connections));
            }
            let meta = Arc::new(ConnMeta::default());
            meta.connected_at.store(now, Ordering::Relaxed);
            meta.last_rx_at.store(now, Ordering::Relaxed);
            meta.last_tx_at.store(now, Ordering::Relaxed);
            connections.insert(
                id,
                ConnectionEntry {
                    principal: principal.clone(),
                    tx,
                    kill: kill.clone(),
                    close_reason: Arc::clone(&close_reason),
                    subscriptions: HashSet::from([user_channel.clone()]),
                    meta,
                },
            );
        }
        self.channels.write().entry(user_channel).or_default().insert(id);
        self.users.write().entry(principal.id).or_default().insert(id);

        info!(connection_id = %id, principal = %principal.id, "connection registered");
        Ok(ConnectionHandle { id, principal, rx, kill, close_reason })
    }

    /// Drop a connection from every index.
    pub fn unregister(&self, id: &ConnectionId) {
        let entry = self.connections.write().remove(id);
        let Some(entry) = entry else { return };

        {
            let mut channels = self.channels.write();
            for channel in &entry.subscriptions {
                if let Some(members) = channels.get_mut(channel) {
                    members.remove(id);
                    if members.is_empty() {
                        channels.remove(channel);
                    }
                }
            }
        }
        {
            let mut users = self.users.write();
            if let Some(members) = users.get_mut(&entry.principal.id) {
                members.remove(id);
                if members.is_empty() {
                    users.remove(&entry.principal.id);
                }
            }
        }
        entry.kill.cancel();
        debug!(connection_id = %id, "connection unregistered");
    }

    /// Subscribe to a list of channels. Acks are independent per channel.
    pub fn subscribe(&self, id: &ConnectionId, requested: &[String]) -> Vec<SubscribeAck> {
        let principal = match self.connections.read().get(id) {
            Some(entry) => entry.principal.clone(),
            None => return Vec::new(),
        };

        let mut acks = Vec::with_capacity(requested.len());
        for name in requested {
            match Channel::parse(name) {
                Err(e) => {
                    acks.push(SubscribeAck { channel: name.clone(), ok: false, error: Some(e.to_string()) });
                }
                Ok(channel) => match self.check_access(&principal, &channel) {
                    Err(reason) => {
                        acks.push(SubscribeAck {
                            channel: name.clone(),
                            ok: false,
                            error: Some(reason.to_string()),
                        });
                    }
                    Ok(()) => {
                        let key = channel.name();
                        self.channels.write().entry(key.clone()).or_default().insert(*id);
                        if let Some(entry) = self.connections.write().get_mut(id) {
                            entry.subscriptions.insert(key);
                        }
                        acks.push(SubscribeAck { channel: name.clone(), ok: true, error: None });
                    }
                },
            }
        }
        acks
    }

    pub fn unsubscribe(&self, id: &ConnectionId, requested: &[String]) -> Vec<SubscribeAck> {
        let mut acks = Vec::with_capacity(requested.len());
        for name in requested {
            let key = SmolStr::new(name);
            let removed = {
                let mut channels = self.channels.write();
                match channels.get_mut(&key) {
                    Some(members) => {
                        let removed = members.remove(id);
                        if members.is_empty() {
                            channels.remove(&key);
                        }
                        removed
                    }
                    None => false,
                }
            };
            if let Some(entry) = self.connections.write().get_mut(id) {
                entry.subscriptions.remove(&key);
            }
            acks.push(SubscribeAck {
                channel: name.clone(),
                ok: removed,
                error: (!removed).then(|| "not subscribed".to_string()),
            });
        }
        acks
    }

    /// Channel access rules (§ broker): `user:{id}` only the principal,
    /// entity channels via the access checker, `system` admin-only,
    /// `broadcast` any authenticated principal.
    fn check_access(&self, principal: &Principal, channel: &Channel) -> Result<(), &'static str> {
        match channel {
            Channel::User(id) => {
                if *id == principal.id {
                    Ok(())
                } else {
                    Err("access denied to another user's channel")
                }
            }
            Channel::System => {
                if principal.admin {
                    Ok(())
                } else {
                    Err("admin only")
                }
            }
            Channel::Broadcast => Ok(()),
            Channel::Workspace(id) => self.check_entity(principal, Resource::Workspace(*id)),
            Channel::Session(id) => self.check_entity(principal, Resource::Session(*id)),
            Channel::Task(id) => self.check_entity(principal, Resource::Task(*id)),
        }
    }

    fn check_entity(&self, principal: &Principal, resource: Resource) -> Result<(), &'static str> {
        if principal.admin || self.access.can_read(principal, &resource) {
            Ok(())
        } else {
            Err("access denied")
        }
    }

    /// Direct reply to one connection.
    pub fn send_to(&self, id: &ConnectionId, frame: &WsMessage) -> bool {
        let connections = self.connections.read();
        let Some(entry) = connections.get(id) else { return false };
        self.enqueue(id, entry, frame.encode())
    }

    /// Fan a frame out to every subscriber of `channel`.
    pub fn publish_frame(&self, channel: &SmolStr, frame: &WsMessage) -> usize {
        let members: Vec<ConnectionId> = match self.channels.read().get(channel) {
            Some(members) => members.iter().copied().collect(),
            None => return 0,
        };
        let encoded = frame.encode();
        let mut delivered = 0;
        let connections = self.connections.read();
        for id in members {
            if let Some(entry) = connections.get(&id) {
                if self.enqueue(&id, entry, encoded.clone()) {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Broadcast to the union of channel and user targets, minus excludes,
    /// deduplicated by connection.
    pub fn broadcast(&self, request: &BroadcastRequest, frame: &WsMessage) -> usize {
        let mut recipients: HashSet<ConnectionId> = HashSet::new();
        {
            let channels = self.channels.read();
            for channel in &request.target_channels {
                if let Some(members) = channels.get(channel) {
                    recipients.extend(members.iter().copied());
                }
            }
        }
        {
            let users = self.users.read();
            for user in &request.target_users {
                if let Some(members) = users.get(user) {
                    recipients.extend(members.iter().copied());
                }
            }
        }
        for excluded in &request.exclude {
            recipients.remove(excluded);
        }

        let encoded = frame.encode();
        let mut delivered = 0;
        let connections = self.connections.read();
        for id in recipients {
            if let Some(entry) = connections.get(&id) {
                if self.enqueue(&id, entry, encoded.clone()) {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Bounded enqueue: overflow tears the connection down instead of
    /// blocking the broadcaster.
    fn enqueue(&self, id: &ConnectionId, entry: &ConnectionEntry, encoded: String) -> bool {
        match entry.tx.try_send(encoded) {
            Ok(()) => {
                entry.meta.last_tx_at.store(self.clock.epoch_ms(), Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(connection_id = %id, "send buffer full, closing slow consumer");
                self.kill(entry, close_code::SEND_BUFFER_FULL);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.kill(entry, 1000);
                false
            }
        }
    }

    fn kill(&self, entry: &ConnectionEntry, code: u16) {
        let _ = entry.close_reason.set(code);
        entry.kill.cancel();
    }

    /// Tear down one connection with an explicit close code.
    pub(crate) fn kill_with_code(&self, id: &ConnectionId, code: u16) -> bool {
        let connections = self.connections.read();
        match connections.get(id) {
            Some(entry) => {
                self.kill(entry, code);
                true
            }
            None => false,
        }
    }

    pub(crate) fn note_rx(&self, id: &ConnectionId) {
        if let Some(entry) = self.connections.read().get(id) {
            entry.meta.last_rx_at.store(self.clock.epoch_ms(), Ordering::Relaxed);
        }
    }

    pub fn descriptor(&self, id: &ConnectionId) -> Option<ConnectionDescriptor> {
        let connections = self.connections.read();
        let entry = connections.get(id)?;
        Some(ConnectionDescriptor {
            id: *id,
            principal_id: entry.principal.id,
            subscribed_channels: entry.subscriptions.iter().cloned().collect(),
            authenticated: true,
            last_rx_at: entry.meta.last_rx_at.load(Ordering::Relaxed),
            last_tx_at: entry.meta.last_tx_at.load(Ordering::Relaxed),
            send_queue_depth: self.config.send_buffer - entry.tx.capacity(),
        })
    }

    /// Disconnect everything (shutdown).
    pub fn close_all(&self) {
        let connections = self.connections.read();
        for entry in connections.values() {
            self.kill(entry, 1001);
        }
    }
}

impl<C: Clock> FramePublisher for Hub<C> {
    fn publish(&self, channel: &SmolStr, frame: &WsMessage) {
        self.publish_frame(channel, frame);
    }
}

/// Forward lifecycle events from the session manager and task queue onto
/// their channels as typed frames.
pub fn spawn_event_forwarder<C: Clock>(
    hub: Arc<Hub<C>>,
    mut events: mpsc::Receiver<Event>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let kind = match &event {
                Event::SessionCreated { .. }
                | Event::SessionStatusChanged { .. }
                | Event::SessionEnded { .. } => MessageType::Session,
                Event::TaskStarted { .. } | Event::TaskFinished { .. } => MessageType::Task,
            };
            let mut data = serde_json::to_value(&event).unwrap_or_default();
            if let Some(object) = data.as_object_mut() {
                object.insert("name".to_string(), serde_json::Value::String(event.name().to_string()));
            }
            let timestamp = hub.now_ms();
            for channel in event.channels() {
                let frame = WsMessage::new(kind, data.clone(), timestamp).on_channel(channel.clone());
                hub.publish_frame(&channel, &frame);
            }
        }
        debug!("event forwarder stopping");
    })
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
