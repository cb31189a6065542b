//! Discovery engine: filter-based lookup over Online peers.

use rendezvous_core::{DiscoveryFilter, PeerInfo, PeerSummary, RendezvousError};

use crate::link::ConnectionId;
use crate::registry::{PeerRecord, PeerRegistry};

/// Read-only view of the registry for discovery requests.
#[derive(Clone)]
pub struct DiscoveryEngine {
    registry: PeerRegistry,
}

impl DiscoveryEngine {
    pub fn new(registry: PeerRegistry) -> Self {
        Self { registry }
    }

    /// Online peers other than the requester that satisfy `filter`.
    ///
    /// The requester must be registered on `conn`. Results come back in
    /// registry order; `min_reputation` is not enforced.
    pub async fn find(
        &self,
        conn: ConnectionId,
        requester_id: &str,
        filter: &DiscoveryFilter,
    ) -> Result<Vec<PeerSummary>, RendezvousError> {
        let state = self.registry.lock().await;
        if state.bound(requester_id, conn).is_none() {
            return Err(RendezvousError::NotRegistered);
        }

        Ok(state
            .online()
            .filter(|r| r.device_id() != requester_id)
            .filter(|r| matches(filter, r.info()))
            .map(PeerRecord::summary)
            .collect())
    }
}

/// AND over required capabilities, OR over specializations.
/// An absent or empty list places no constraint.
pub fn matches(filter: &DiscoveryFilter, info: &PeerInfo) -> bool {
    let has_capabilities = filter
        .required_capabilities
        .as_deref()
        .unwrap_or_default()
        .iter()
        .all(|cap| info.capabilities.contains(cap));

    let specializations = filter.specializations.as_deref().unwrap_or_default();
    let has_specialization = specializations.is_empty()
        || specializations
            .iter()
            .any(|s| info.specializations.contains(s));

    has_capabilities && has_specialization
}
