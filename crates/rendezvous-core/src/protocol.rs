//! Rendezvous wire protocol: one JSON object per text frame.
//!
//! Every frame carries a `type` string that selects the message kind.
//! Inbound kinds are decoded into [`ClientMessage`], outbound kinds are
//! produced as [`ServerMessage`]. Signaling payloads are carried as raw
//! JSON values and never inspected.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorCode, RendezvousError};

/// Port used when none is supplied externally.
pub const DEFAULT_PORT: u16 = 8080;

/// Frames larger than this are rejected as malformed.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// How often the heartbeat monitor sweeps the registry.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum `last_seen` age before an online peer is presumed gone.
/// Twice the sweep interval, so one missed heartbeat is tolerated.
pub const STALE_AFTER: Duration = Duration::from_secs(60);

/// Inbound message kinds, as they appear in the `type` field.
pub const INBOUND_KINDS: [&str; 5] = [
    "register",
    "discover",
    "signal",
    "announce_capability",
    "heartbeat",
];

/// Opaque resource description supplied by a peer.
pub type Resources = serde_json::Map<String, Value>;

// ── Peer data ────────────────────────────────────────────────────────────────

/// What a peer declares about itself at registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerInfo {
    pub capabilities: BTreeSet<String>,
    #[serde(alias = "cluster_specializations")]
    pub specializations: BTreeSet<String>,
    pub resources: Resources,
    /// Reported back in discovery results. Never used for matching.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reputation_score: Option<f64>,
    /// Any other declared fields (address, port, public key), kept verbatim
    /// so peers can reach each other after discovery.
    #[serde(flatten)]
    pub extra: Resources,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerStatus {
    Online,
    Offline,
}

/// Public view of a peer record. Never carries the connection binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerSummary {
    pub device_id: String,
    pub capabilities: BTreeSet<String>,
    pub specializations: BTreeSet<String>,
    /// Same set as `specializations`, under the name older clients read.
    #[serde(default)]
    pub cluster_specializations: BTreeSet<String>,
    pub resources: Resources,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reputation_score: Option<f64>,
    pub registered_at: u64,
    pub last_seen: u64,
    pub status: PeerStatus,
    /// Extra fields from the peer's declaration.
    #[serde(flatten)]
    pub extra: Resources,
}

impl PeerSummary {
    /// Keys owned by the summary itself. Declared extras never override them.
    pub const FIELDS: [&'static str; 9] = [
        "device_id",
        "capabilities",
        "specializations",
        "cluster_specializations",
        "resources",
        "reputation_score",
        "registered_at",
        "last_seen",
        "status",
    ];

    /// Declared extras minus any key the summary already owns.
    pub fn public_extra(declared: &Resources) -> Resources {
        declared
            .iter()
            .filter(|(key, _)| !Self::FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// Requester-supplied discovery constraints.
///
/// `required_capabilities` uses AND semantics, `specializations` uses OR
/// semantics. `min_reputation` is accepted and ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryFilter {
    pub required_capabilities: Option<Vec<String>>,
    pub specializations: Option<Vec<String>>,
    pub min_reputation: Option<f64>,
}

/// An addressed handshake payload, alive for the duration of one relay.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEnvelope {
    pub from_device_id: String,
    pub to_device_id: String,
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveReason {
    /// The peer's transport closed.
    Disconnect,
    /// The heartbeat monitor found the peer stale.
    Timeout,
    /// A delivery to the peer failed at the transport level.
    Unreachable,
}

// ── Inbound ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Register {
        device_id: String,
        peer_info: PeerInfo,
    },
    Discover {
        #[serde(default)]
        filters: Option<DiscoveryFilter>,
    },
    Signal {
        target_device_id: String,
        signaling_data: Value,
    },
    AnnounceCapability {
        #[serde(default)]
        capabilities: BTreeSet<String>,
        #[serde(default, alias = "cluster_specializations")]
        specializations: BTreeSet<String>,
        #[serde(default)]
        resources: Resources,
    },
    Heartbeat {
        #[serde(default)]
        available_resources: Option<Resources>,
    },
}

impl ClientMessage {
    /// Decode one text frame.
    ///
    /// Anything that is not a JSON object with a string `type` is malformed.
    /// A recognised object with an unrecognised `type` is an unknown kind.
    pub fn decode(frame: &str) -> Result<Self, RendezvousError> {
        if frame.len() > MAX_FRAME_BYTES {
            return Err(RendezvousError::malformed(format!(
                "frame of {} bytes exceeds limit of {} bytes",
                frame.len(),
                MAX_FRAME_BYTES
            )));
        }

        let value: Value = serde_json::from_str(frame).map_err(RendezvousError::malformed)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| RendezvousError::malformed("expected an object with a string `type`"))?
            .to_string();

        if !INBOUND_KINDS.contains(&kind.as_str()) {
            return Err(RendezvousError::UnknownMessageKind(kind));
        }

        let message: ClientMessage =
            serde_json::from_value(value).map_err(RendezvousError::malformed)?;
        message.validate()?;
        Ok(message)
    }

    /// The `type` tag of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Discover { .. } => "discover",
            Self::Signal { .. } => "signal",
            Self::AnnounceCapability { .. } => "announce_capability",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }

    fn validate(&self) -> Result<(), RendezvousError> {
        match self {
            Self::Register { device_id, .. } if device_id.is_empty() => {
                Err(RendezvousError::malformed("device_id must be non-empty"))
            }
            Self::Signal {
                target_device_id, ..
            } if target_device_id.is_empty() => Err(RendezvousError::malformed(
                "target_device_id must be non-empty",
            )),
            _ => Ok(()),
        }
    }
}

// ── Outbound ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Registered {
        device_id: String,
        peer_count: usize,
        timestamp: u64,
    },
    DiscoveryResult {
        peers: Vec<PeerSummary>,
        count: usize,
        timestamp: u64,
    },
    WebrtcSignal {
        from_device_id: String,
        signaling_data: Value,
    },
    PeerJoined {
        peer: PeerSummary,
        online_peers: usize,
    },
    PeerLeft {
        device_id: String,
        online_peers: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<LeaveReason>,
    },
    PeerUpdated {
        peer: PeerSummary,
    },
    HeartbeatAck {
        timestamp: u64,
        online_peers: usize,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
}

impl ServerMessage {
    pub fn error(err: &RendezvousError) -> Self {
        Self::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
