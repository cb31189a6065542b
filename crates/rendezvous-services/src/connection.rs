//! Connection manager: per-session message dispatch and teardown.
//!
//! Transport-agnostic: a session feeds inbound text frames to
//! [`Connection::handle_frame`] and drains the receiver returned by
//! [`ConnectionManager::open`] into its socket. Protocol errors are answered
//! on the same connection and never end the session.

use std::net::SocketAddr;
use std::time::Instant;

use tokio::sync::mpsc::UnboundedReceiver;

use rendezvous_core::time::now_millis;
use rendezvous_core::{ClientMessage, RendezvousError, ServerMessage, SignalEnvelope};

use crate::discovery::DiscoveryEngine;
use crate::link::{new_connection_table, ConnectionId, ConnectionInfo, ConnectionTable, PeerLink};
use crate::registry::PeerRegistry;
use crate::relay::SignalRelay;

/// Shared entry point for new transport sessions. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionManager {
    registry: PeerRegistry,
    discovery: DiscoveryEngine,
    relay: SignalRelay,
    connections: ConnectionTable,
}

impl ConnectionManager {
    pub fn new(registry: PeerRegistry) -> Self {
        Self {
            discovery: DiscoveryEngine::new(registry.clone()),
            relay: SignalRelay::new(registry.clone()),
            connections: new_connection_table(),
            registry,
        }
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    /// Start a session. The receiver yields every frame owed to the peer.
    pub fn open(&self, remote_addr: Option<SocketAddr>) -> (Connection, UnboundedReceiver<ServerMessage>) {
        let (link, rx) = PeerLink::open();
        self.connections.insert(
            link.id(),
            ConnectionInfo {
                remote_addr,
                opened_at: Instant::now(),
                device_id: None,
            },
        );
        tracing::debug!(connection = %link.id(), ?remote_addr, "connection opened");

        let connection = Connection {
            manager: self.clone(),
            link,
            device_id: None,
        };
        (connection, rx)
    }
}

/// One open transport session and the identity it declared, if any.
pub struct Connection {
    manager: ConnectionManager,
    link: PeerLink,
    device_id: Option<String>,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.link.id()
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Decode and dispatch one inbound frame.
    ///
    /// Failures are sent back as an `error` frame; the session stays usable.
    pub async fn handle_frame(&mut self, frame: &str) {
        if let Err(e) = self.dispatch(frame).await {
            tracing::debug!(connection = %self.id(), error = %e, "rejected inbound frame");
            self.reply(ServerMessage::error(&e));
        }
    }

    /// Report a frame the transport could not turn into text.
    pub fn reject(&self, err: RendezvousError) {
        tracing::debug!(connection = %self.id(), error = %err, "rejected inbound frame");
        self.reply(ServerMessage::error(&err));
    }

    /// Tear the session down, demoting its identity if it still owns one.
    pub async fn close(self) {
        self.manager.connections.remove(&self.id());
        if let Some(device_id) = &self.device_id {
            self.manager.registry.release(self.id(), device_id).await;
        }
        tracing::debug!(connection = %self.id(), "connection closed");
    }

    async fn dispatch(&mut self, frame: &str) -> Result<(), RendezvousError> {
        let message = ClientMessage::decode(frame)?;
        tracing::trace!(connection = %self.id(), kind = message.kind(), "inbound message");
        if let Some(device_id) = &self.device_id {
            self.manager.registry.mark_seen(self.id(), device_id).await;
        }

        match message {
            ClientMessage::Register {
                device_id,
                peer_info,
            } => {
                let peer_count = self
                    .manager
                    .registry
                    .register(&self.link, &device_id, peer_info)
                    .await;
                self.claim_in_table(&device_id);
                self.device_id = Some(device_id.clone());
                self.reply(ServerMessage::Registered {
                    device_id,
                    peer_count,
                    timestamp: now_millis(),
                });
            }
            ClientMessage::Discover { filters } => {
                let requester = self.bound_id()?;
                let peers = self
                    .manager
                    .discovery
                    .find(self.id(), requester, &filters.unwrap_or_default())
                    .await?;
                self.reply(ServerMessage::DiscoveryResult {
                    count: peers.len(),
                    peers,
                    timestamp: now_millis(),
                });
            }
            ClientMessage::Signal {
                target_device_id,
                signaling_data,
            } => {
                let envelope = SignalEnvelope {
                    from_device_id: self.bound_id()?.to_string(),
                    to_device_id: target_device_id,
                    payload: signaling_data,
                };
                self.manager.relay.relay(self.id(), envelope).await?;
            }
            ClientMessage::AnnounceCapability {
                capabilities,
                specializations,
                resources,
            } => {
                let device_id = self.bound_id()?;
                self.manager
                    .registry
                    .update_capabilities(
                        self.id(),
                        device_id,
                        capabilities,
                        specializations,
                        resources,
                    )
                    .await?;
            }
            ClientMessage::Heartbeat {
                available_resources,
            } => {
                let device_id = self.bound_id()?;
                let online_peers = self
                    .manager
                    .registry
                    .touch(&self.link, device_id, available_resources)
                    .await?;
                self.reply(ServerMessage::HeartbeatAck {
                    timestamp: now_millis(),
                    online_peers,
                });
            }
        }
        Ok(())
    }

    /// Attribute `device_id` to this session only. A session it was taken
    /// over from no longer lists it.
    fn claim_in_table(&self, device_id: &str) {
        let id = self.id();
        for mut entry in self.manager.connections.iter_mut() {
            if *entry.key() == id {
                entry.device_id = Some(device_id.to_string());
            } else if entry.device_id.as_deref() == Some(device_id) {
                entry.device_id = None;
            }
        }
    }

    fn bound_id(&self) -> Result<&str, RendezvousError> {
        self.device_id
            .as_deref()
            .ok_or(RendezvousError::NotRegistered)
    }

    fn reply(&self, message: ServerMessage) {
        // A closed link means the session is already tearing down.
        if self.link.send(message).is_err() {
            tracing::debug!(connection = %self.id(), "reply dropped, link closed");
        }
    }
}
