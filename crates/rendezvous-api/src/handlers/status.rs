//! /status, /peers, /health handlers.

use std::collections::BTreeSet;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use rendezvous_core::PeerSummary;
use rendezvous_services::ConnectionId;

use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub total_peers: usize,
    pub online_peers: usize,
    /// Open transport sessions, registered or not.
    pub connections: usize,
    pub uptime_secs: u64,
    pub peers: Vec<OnlinePeer>,
    pub sessions: Vec<SessionInfo>,
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub connection: String,
    pub remote_addr: Option<String>,
    /// Identity this session currently holds, if any.
    pub device_id: Option<String>,
    pub connected_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct OnlinePeer {
    pub device_id: String,
    pub capabilities: BTreeSet<String>,
    pub specializations: BTreeSet<String>,
    pub last_seen: u64,
}

impl From<PeerSummary> for OnlinePeer {
    fn from(p: PeerSummary) -> Self {
        Self {
            device_id: p.device_id,
            capabilities: p.capabilities,
            specializations: p.specializations,
            last_seen: p.last_seen,
        }
    }
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let registry = state.manager.registry();
    let (total_peers, _) = registry.counts().await;
    let peers: Vec<OnlinePeer> = registry
        .online_peers()
        .await
        .into_iter()
        .map(OnlinePeer::from)
        .collect();

    let mut sessions: Vec<(ConnectionId, SessionInfo)> = state
        .manager
        .connections()
        .iter()
        .map(|e| {
            let info = e.value();
            let session = SessionInfo {
                connection: e.key().to_string(),
                remote_addr: info.remote_addr.map(|a| a.to_string()),
                device_id: info.device_id.clone(),
                connected_secs: info.opened_at.elapsed().as_secs(),
            };
            (*e.key(), session)
        })
        .collect();
    sessions.sort_by_key(|(id, _)| *id);

    Json(StatusResponse {
        total_peers,
        online_peers: peers.len(),
        connections: sessions.len(),
        uptime_secs: state.uptime_secs(),
        peers,
        sessions: sessions.into_iter().map(|(_, s)| s).collect(),
    })
}

// ── /peers ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct PeersResponse {
    pub count: usize,
    pub peers: Vec<PeerSummary>,
}

/// Every known record, Online and Offline.
pub async fn handle_peers(State(state): State<ApiState>) -> Json<PeersResponse> {
    let peers = state.manager.registry().snapshot().await;
    Json(PeersResponse {
        count: peers.len(),
        peers,
    })
}

// ── /health ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
}

pub async fn handle_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.uptime_secs(),
    })
}
