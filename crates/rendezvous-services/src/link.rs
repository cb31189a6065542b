//! Per-connection outbound links and the live connection table.
//!
//! A [`PeerLink`] is the only handle other components hold on a transport
//! session. Pushing onto it never blocks; the transport's writer task drains
//! the queue. Once the writer has gone away every push fails with
//! [`LinkClosed`], which callers treat as proof the peer is dead.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::mpsc;

use rendezvous_core::ServerMessage;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of one transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The receiving end of a link has been dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("connection link closed")]
pub struct LinkClosed;

/// Outbound handle to one connection.
#[derive(Debug, Clone)]
pub struct PeerLink {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl PeerLink {
    /// Create a link with a fresh id and the queue its writer drains.
    pub fn open() -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: ConnectionId::next(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a message for delivery.
    pub fn send(&self, message: ServerMessage) -> Result<(), LinkClosed> {
        self.tx.send(message).map_err(|_| LinkClosed)
    }
}

/// What the status surface knows about an open transport session.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub remote_addr: Option<SocketAddr>,
    pub opened_at: Instant,
    /// Identity declared on this connection, if any.
    pub device_id: Option<String>,
}

/// All open transport sessions, bound or not.
pub type ConnectionTable = Arc<DashMap<ConnectionId, ConnectionInfo>>;

/// Create a new empty connection table.
pub fn new_connection_table() -> ConnectionTable {
    Arc::new(DashMap::new())
}
