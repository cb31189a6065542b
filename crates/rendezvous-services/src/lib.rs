//! rendezvous-services: peer registry and the operations built on it.
//!
//! The registry is the single shared mutable resource. Discovery, relay,
//! heartbeat sweeps, and connection lifecycle all go through it.

pub mod broadcast;
pub mod connection;
pub mod discovery;
pub mod heartbeat;
pub mod link;
pub mod registry;
pub mod relay;

pub use broadcast::FanOutReport;
pub use connection::{Connection, ConnectionManager};
pub use discovery::DiscoveryEngine;
pub use heartbeat::HeartbeatMonitor;
pub use link::{new_connection_table, ConnectionId, ConnectionInfo, ConnectionTable, LinkClosed, PeerLink};
pub use registry::{PeerRecord, PeerRegistry, RegistryState};
pub use relay::SignalRelay;
