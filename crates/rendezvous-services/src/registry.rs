//! Peer registry: the single source of truth for who is reachable.
//!
//! Records are keyed by the caller-declared `device_id` and are never
//! removed: a disconnect or timeout flips the record Offline and a later
//! `register` brings it back. The Online state carries the connection link,
//! so an Online record always has exactly one binding and an Offline record
//! has none.
//!
//! All state sits behind one async mutex. Each operation, including the
//! notifications it fans out, completes inside a single critical section,
//! which keeps every transition linearizable per `device_id`.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use rendezvous_core::time::now_millis;
use rendezvous_core::{
    LeaveReason, PeerInfo, PeerStatus, PeerSummary, RendezvousError, Resources, ServerMessage,
};

use crate::broadcast::fan_out;
use crate::link::{ConnectionId, PeerLink};

// ── Record ────────────────────────────────────────────────────────────────────

/// Two-state presence machine.
///
/// Online → Offline on disconnect or timeout, Offline → Online on register.
/// Online → Online only replaces the binding on re-registration. Offline
/// remembers which connection held the record last.
#[derive(Debug, Clone)]
enum Presence {
    Online(PeerLink),
    Offline(Option<ConnectionId>),
}

#[derive(Debug, Clone)]
pub struct PeerRecord {
    device_id: String,
    info: PeerInfo,
    registered_at: u64,
    last_seen: u64,
    presence: Presence,
}

impl PeerRecord {
    fn new(device_id: &str, now: u64) -> Self {
        Self {
            device_id: device_id.to_string(),
            info: PeerInfo::default(),
            registered_at: now,
            last_seen: now,
            presence: Presence::Offline(None),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn info(&self) -> &PeerInfo {
        &self.info
    }

    pub fn registered_at(&self) -> u64 {
        self.registered_at
    }

    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }

    pub fn status(&self) -> PeerStatus {
        match self.presence {
            Presence::Online(_) => PeerStatus::Online,
            Presence::Offline(_) => PeerStatus::Offline,
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self.presence, Presence::Online(_))
    }

    /// The bound connection, present only while Online.
    pub fn link(&self) -> Option<&PeerLink> {
        match &self.presence {
            Presence::Online(link) => Some(link),
            Presence::Offline(_) => None,
        }
    }

    pub fn is_bound_to(&self, conn: ConnectionId) -> bool {
        self.link().is_some_and(|link| link.id() == conn)
    }

    /// Whether `conn` holds the binding now, or held it when the record
    /// went Offline.
    pub fn is_owned_by(&self, conn: ConnectionId) -> bool {
        match &self.presence {
            Presence::Online(link) => link.id() == conn,
            Presence::Offline(last) => *last == Some(conn),
        }
    }

    /// Public fields only.
    pub fn summary(&self) -> PeerSummary {
        PeerSummary {
            device_id: self.device_id.clone(),
            capabilities: self.info.capabilities.clone(),
            specializations: self.info.specializations.clone(),
            cluster_specializations: self.info.specializations.clone(),
            resources: self.info.resources.clone(),
            reputation_score: self.info.reputation_score,
            registered_at: self.registered_at,
            last_seen: self.last_seen,
            status: self.status(),
            extra: PeerSummary::public_extra(&self.info.extra),
        }
    }

    /// Bind to `link`, returning the binding it replaced.
    fn bring_online(&mut self, link: PeerLink) -> Option<PeerLink> {
        match std::mem::replace(&mut self.presence, Presence::Online(link)) {
            Presence::Online(previous) => Some(previous),
            Presence::Offline(_) => None,
        }
    }

    /// Drop the binding. Returns false if already Offline.
    fn take_offline(&mut self) -> bool {
        match &self.presence {
            Presence::Online(link) => {
                let last = link.id();
                self.presence = Presence::Offline(Some(last));
                true
            }
            Presence::Offline(_) => false,
        }
    }
}

// ── State ─────────────────────────────────────────────────────────────────────

/// Registry contents. Only reachable through a held [`PeerRegistry`] lock.
#[derive(Debug, Default)]
pub struct RegistryState {
    records: BTreeMap<String, PeerRecord>,
}

impl RegistryState {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, device_id: &str) -> Option<&PeerRecord> {
        self.records.get(device_id)
    }

    pub fn records(&self) -> impl Iterator<Item = &PeerRecord> {
        self.records.values()
    }

    pub fn online(&self) -> impl Iterator<Item = &PeerRecord> {
        self.records.values().filter(|r| r.is_online())
    }

    pub fn online_count(&self) -> usize {
        self.online().count()
    }

    /// The record for `device_id`, if it is live and bound to `conn`.
    pub fn bound(&self, device_id: &str, conn: ConnectionId) -> Option<&PeerRecord> {
        self.records
            .get(device_id)
            .filter(|r| r.is_bound_to(conn))
    }

    /// Flip a record Offline. Idempotent; returns whether a transition happened.
    pub(crate) fn demote(&mut self, device_id: &str) -> bool {
        self.records
            .get_mut(device_id)
            .is_some_and(PeerRecord::take_offline)
    }

    /// Demote and tell every remaining Online peer.
    pub(crate) fn retire(&mut self, device_id: &str, reason: LeaveReason) -> bool {
        if !self.demote(device_id) {
            return false;
        }
        let event = ServerMessage::PeerLeft {
            device_id: device_id.to_string(),
            online_peers: self.online_count(),
            reason: Some(reason),
        };
        let report = fan_out(self, None, event);
        tracing::info!(device_id, ?reason, notified = report.delivered, "peer offline");
        true
    }

    fn bound_mut(&mut self, device_id: &str, conn: ConnectionId) -> Option<&mut PeerRecord> {
        self.records
            .get_mut(device_id)
            .filter(|r| r.is_bound_to(conn))
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Shared handle to the registry. Cheap to clone.
#[derive(Clone, Default)]
pub struct PeerRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the registry's serialization domain.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().await
    }

    /// Create or reactivate `device_id`, bind it to `link`, and announce it.
    ///
    /// A connection carries at most one identity: if `link` was bound to a
    /// different record, that record goes Offline first. Returns the total
    /// number of records known.
    pub async fn register(&self, link: &PeerLink, device_id: &str, info: PeerInfo) -> usize {
        let now = now_millis();
        let mut state = self.lock().await;

        let previous: Vec<String> = state
            .online()
            .filter(|r| r.is_bound_to(link.id()) && r.device_id() != device_id)
            .map(|r| r.device_id().to_string())
            .collect();
        for old in previous {
            state.retire(&old, LeaveReason::Disconnect);
        }

        let record = state
            .records
            .entry(device_id.to_string())
            .or_insert_with(|| PeerRecord::new(device_id, now));
        record.info = info;
        record.last_seen = now;
        if let Some(replaced) = record.bring_online(link.clone()) {
            if replaced.id() != link.id() {
                tracing::info!(
                    device_id,
                    from = %replaced.id(),
                    to = %link.id(),
                    "rebinding peer to new connection"
                );
            }
        }
        let peer = record.summary();

        let total = state.len();
        let online_peers = state.online_count();
        let report = fan_out(
            &mut state,
            Some(link.id()),
            ServerMessage::PeerJoined { peer, online_peers },
        );
        tracing::info!(
            device_id,
            connection = %link.id(),
            total,
            online_peers,
            notified = report.delivered,
            "peer registered"
        );
        total
    }

    /// Overwrite the declared capability fields of the caller's record.
    pub async fn update_capabilities(
        &self,
        conn: ConnectionId,
        device_id: &str,
        capabilities: BTreeSet<String>,
        specializations: BTreeSet<String>,
        resources: Resources,
    ) -> Result<PeerSummary, RendezvousError> {
        let now = now_millis();
        let mut state = self.lock().await;
        let record = state
            .bound_mut(device_id, conn)
            .ok_or(RendezvousError::NotRegistered)?;

        record.info.capabilities = capabilities;
        record.info.specializations = specializations;
        record.info.resources = resources;
        record.last_seen = now;
        let peer = record.summary();

        let report = fan_out(
            &mut state,
            Some(conn),
            ServerMessage::PeerUpdated { peer: peer.clone() },
        );
        tracing::debug!(device_id, notified = report.delivered, "peer capabilities updated");
        Ok(peer)
    }

    /// Refresh `last_seen` and make sure the record is Online.
    ///
    /// An Offline record whose last binding was `link` (a timeout demotion)
    /// is rebound and re-announced. A record held, now or last, by some other
    /// connection, or no record at all, is `NotRegistered`. Returns the
    /// Online count.
    pub async fn touch(
        &self,
        link: &PeerLink,
        device_id: &str,
        resources: Option<Resources>,
    ) -> Result<usize, RendezvousError> {
        let now = now_millis();
        let mut state = self.lock().await;
        let record = state
            .records
            .get_mut(device_id)
            .ok_or(RendezvousError::NotRegistered)?;

        let rejoined = match record.status() {
            PeerStatus::Online if record.is_bound_to(link.id()) => false,
            PeerStatus::Offline if record.is_owned_by(link.id()) => {
                record.bring_online(link.clone());
                true
            }
            _ => return Err(RendezvousError::NotRegistered),
        };
        record.last_seen = now;
        if let Some(resources) = resources {
            record.info.resources = resources;
        }

        if rejoined {
            let peer = record.summary();
            let online_peers = state.online_count();
            let report = fan_out(
                &mut state,
                Some(link.id()),
                ServerMessage::PeerJoined { peer, online_peers },
            );
            tracing::info!(
                device_id,
                connection = %link.id(),
                notified = report.delivered,
                "peer back online after heartbeat"
            );
        }
        Ok(state.online_count())
    }

    /// Refresh `last_seen` for any inbound traffic from a bound connection.
    pub async fn mark_seen(&self, conn: ConnectionId, device_id: &str) -> bool {
        let now = now_millis();
        let mut state = self.lock().await;
        match state.bound_mut(device_id, conn) {
            Some(record) => {
                record.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Flip `device_id` Offline and announce its departure. Idempotent.
    pub async fn deregister(&self, device_id: &str, reason: LeaveReason) -> bool {
        self.lock().await.retire(device_id, reason)
    }

    /// Disconnect path: demote `device_id` only if `conn` still owns it.
    ///
    /// A record that was re-registered from a newer connection is untouched.
    pub async fn release(&self, conn: ConnectionId, device_id: &str) -> bool {
        let mut state = self.lock().await;
        if state.bound(device_id, conn).is_none() {
            return false;
        }
        state.retire(device_id, LeaveReason::Disconnect)
    }

    /// Demote every Online record whose `last_seen` is more than
    /// `stale_after_ms` older than `now`, then announce each departure.
    pub async fn expire_stale(&self, now: u64, stale_after_ms: u64) -> Vec<String> {
        let mut state = self.lock().await;
        let stale: Vec<String> = state
            .online()
            .filter(|r| now.saturating_sub(r.last_seen) > stale_after_ms)
            .map(|r| r.device_id().to_string())
            .collect();

        for device_id in &stale {
            state.demote(device_id);
        }
        for device_id in &stale {
            // Earlier passes may have demoted unreachable recipients.
            let online_peers = state.online_count();
            let report = fan_out(
                &mut state,
                None,
                ServerMessage::PeerLeft {
                    device_id: device_id.clone(),
                    online_peers,
                    reason: Some(LeaveReason::Timeout),
                },
            );
            tracing::info!(device_id = %device_id, notified = report.delivered, "peer timed out");
        }
        stale
    }

    // ── Read-only views ──────────────────────────────────────────────────────

    pub async fn get(&self, device_id: &str) -> Option<PeerSummary> {
        self.lock().await.get(device_id).map(PeerRecord::summary)
    }

    /// Every record, Online and Offline.
    pub async fn snapshot(&self) -> Vec<PeerSummary> {
        self.lock().await.records().map(PeerRecord::summary).collect()
    }

    pub async fn online_peers(&self) -> Vec<PeerSummary> {
        self.lock().await.online().map(PeerRecord::summary).collect()
    }

    /// (total records, online records)
    pub async fn counts(&self) -> (usize, usize) {
        let state = self.lock().await;
        (state.len(), state.online_count())
    }
}
