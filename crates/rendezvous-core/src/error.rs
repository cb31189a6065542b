//! Protocol error taxonomy.
//!
//! Every variant is reported back to the originating connection as an
//! `error` frame and none of them close the connection.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RendezvousError {
    /// The frame could not be parsed as a protocol message.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Well-formed object with a `type` this service does not handle.
    #[error("unknown message kind: {0}")]
    UnknownMessageKind(String),

    /// The action requires a prior successful `register` on this connection.
    #[error("connection is not registered; send `register` first")]
    NotRegistered,

    /// Relay target has no record or its record is offline.
    #[error("target device {0} is not reachable")]
    TargetUnreachable(String),
}

/// Stable wire code for each error variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MalformedMessage,
    UnknownMessageKind,
    NotRegistered,
    TargetUnreachable,
}

impl RendezvousError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MalformedMessage(_) => ErrorCode::MalformedMessage,
            Self::UnknownMessageKind(_) => ErrorCode::UnknownMessageKind,
            Self::NotRegistered => ErrorCode::NotRegistered,
            Self::TargetUnreachable(_) => ErrorCode::TargetUnreachable,
        }
    }

    pub fn malformed(reason: impl std::fmt::Display) -> Self {
        Self::MalformedMessage(reason.to_string())
    }
}
