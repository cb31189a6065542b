//! Event broadcaster: fans notifications out to every Online peer.
//!
//! Runs inside the registry's critical section. Each pass is two-phase:
//! snapshot the recipients, deliver to each independently, then demote the
//! recipients whose links turned out to be dead. Every demotion queues a
//! follow-up `peer_left` pass; a peer already demoted is Offline and so is
//! never a recipient again, which bounds the work.

use std::collections::VecDeque;

use rendezvous_core::{LeaveReason, ServerMessage};

use crate::link::{ConnectionId, PeerLink};
use crate::registry::RegistryState;

/// Outcome of one fan-out including any follow-up passes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanOutReport {
    pub delivered: usize,
    /// Peers demoted because a delivery to them failed.
    pub demoted: Vec<String>,
}

/// Deliver `event` to every Online peer except the one bound to `excluded`.
pub(crate) fn fan_out(
    state: &mut RegistryState,
    excluded: Option<ConnectionId>,
    event: ServerMessage,
) -> FanOutReport {
    let mut report = FanOutReport::default();
    let mut pending = VecDeque::from([(excluded, event)]);

    while let Some((excluded, event)) = pending.pop_front() {
        let recipients: Vec<(String, PeerLink)> = state
            .online()
            .filter_map(|r| r.link().map(|link| (r.device_id().to_string(), link.clone())))
            .filter(|(_, link)| Some(link.id()) != excluded)
            .collect();

        let mut unreachable = Vec::new();
        for (device_id, link) in recipients {
            match link.send(event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(_) => unreachable.push(device_id),
            }
        }

        unreachable.retain(|device_id| state.demote(device_id));
        if unreachable.is_empty() {
            continue;
        }

        let online_peers = state.online_count();
        for device_id in unreachable {
            tracing::warn!(device_id = %device_id, "delivery failed, peer demoted");
            report.demoted.push(device_id.clone());
            pending.push_back((
                None,
                ServerMessage::PeerLeft {
                    device_id,
                    online_peers,
                    reason: Some(LeaveReason::Unreachable),
                },
            ));
        }
    }

    report
}

/// Deliver `event` to one Online peer, demoting it if its link is dead.
///
/// Returns false when the target had no live binding or the push failed.
pub(crate) fn send_to(state: &mut RegistryState, device_id: &str, event: ServerMessage) -> bool {
    let Some(link) = state.get(device_id).and_then(|r| r.link()).cloned() else {
        return false;
    };
    if link.send(event).is_ok() {
        return true;
    }
    tracing::warn!(device_id, connection = %link.id(), "direct delivery failed, peer demoted");
    state.retire(device_id, LeaveReason::Unreachable);
    false
}
