//! rendezvous-core: wire protocol, error taxonomy, and configuration.
//! All other rendezvous crates depend on this one.

pub mod config;
pub mod error;
pub mod protocol;
pub mod time;

pub use error::{ErrorCode, RendezvousError};
pub use protocol::{
    ClientMessage, DiscoveryFilter, LeaveReason, PeerInfo, PeerStatus, PeerSummary, Resources,
    ServerMessage, SignalEnvelope,
};
