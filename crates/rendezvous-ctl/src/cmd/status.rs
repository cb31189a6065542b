//! Status, peers, and health commands.

use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StatusResponse {
    total_peers: usize,
    online_peers: usize,
    connections: usize,
    uptime_secs: u64,
    peers: Vec<OnlinePeer>,
    sessions: Vec<SessionInfo>,
}

#[derive(Deserialize)]
struct SessionInfo {
    connection: String,
    remote_addr: Option<String>,
    device_id: Option<String>,
    connected_secs: u64,
}

#[derive(Deserialize)]
struct OnlinePeer {
    device_id: String,
    capabilities: BTreeSet<String>,
    specializations: BTreeSet<String>,
    last_seen: u64,
}

#[derive(Deserialize)]
struct PeersResponse {
    peers: Vec<PeerSummary>,
}

#[derive(Deserialize)]
struct PeerSummary {
    device_id: String,
    capabilities: BTreeSet<String>,
    specializations: BTreeSet<String>,
    #[serde(default)]
    reputation_score: Option<f64>,
    registered_at: u64,
    last_seen: u64,
    status: String,
}

#[derive(Deserialize)]
struct HealthResponse {
    status: String,
    uptime_secs: u64,
}

// ── Formatting ────────────────────────────────────────────────────────────────

/// Seconds elapsed since a Unix-millis timestamp.
fn age_secs(timestamp_ms: u64) -> u64 {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    now_ms.saturating_sub(timestamp_ms) / 1000
}

fn join(items: &BTreeSet<String>) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Rendezvous Status");
    println!("═══════════════════════════════════════");
    println!("  Uptime        : {}s", resp.uptime_secs);
    println!("  Known peers   : {}", resp.total_peers);
    println!("  Online peers  : {}", resp.online_peers);
    println!("  Connections   : {}", resp.connections);

    if resp.peers.is_empty() {
        println!("\n  No peers online.");
    } else {
        println!("\n  Online:");
        for p in &resp.peers {
            println!("  ┌─ {}", p.device_id);
            println!("  │  capabilities    : {}", join(&p.capabilities));
            println!("  │  specializations : {}", join(&p.specializations));
            println!("  └─ last seen       : {}s ago", age_secs(p.last_seen));
        }
    }

    if !resp.sessions.is_empty() {
        println!("\n  Sessions:");
        for s in &resp.sessions {
            println!("  ┌─ {}", s.connection);
            println!("  │  remote    : {}", s.remote_addr.as_deref().unwrap_or("-"));
            println!("  │  device id : {}", s.device_id.as_deref().unwrap_or("(unregistered)"));
            println!("  └─ uptime    : {}s", s.connected_secs);
        }
    }

    Ok(())
}

pub async fn cmd_peers(port: u16) -> Result<()> {
    let resp: PeersResponse = get_json(&format!("{}/peers", base_url(port))).await?;

    if resp.peers.is_empty() {
        println!("No peers registered yet.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Known Peers ({})", resp.peers.len());
    println!("═══════════════════════════════════════");

    for p in &resp.peers {
        let icon = if p.status == "online" { "●" } else { "○" };
        println!("  ┌─ {} {} ({})", icon, p.device_id, p.status);
        println!("  │  capabilities    : {}", join(&p.capabilities));
        println!("  │  specializations : {}", join(&p.specializations));
        if let Some(score) = p.reputation_score {
            println!("  │  reputation      : {:.2}", score);
        }
        println!("  │  registered      : {}s ago", age_secs(p.registered_at));
        println!("  └─ last seen       : {}s ago", age_secs(p.last_seen));
    }

    Ok(())
}

pub async fn cmd_health(port: u16) -> Result<()> {
    let resp: HealthResponse = get_json(&format!("{}/health", base_url(port))).await?;
    println!("{} (up {}s)", resp.status, resp.uptime_secs);
    Ok(())
}
