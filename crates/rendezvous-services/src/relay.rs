//! Signal relay: single-hop forwarding of handshake envelopes.
//!
//! The payload is passed through untouched. Success means the envelope was
//! queued on the target's live connection at call time; a transport failure
//! afterwards demotes the target but is not reported to the sender.

use rendezvous_core::{RendezvousError, ServerMessage, SignalEnvelope};

use crate::broadcast::send_to;
use crate::link::ConnectionId;
use crate::registry::PeerRegistry;

#[derive(Clone)]
pub struct SignalRelay {
    registry: PeerRegistry,
}

impl SignalRelay {
    pub fn new(registry: PeerRegistry) -> Self {
        Self { registry }
    }

    pub async fn relay(
        &self,
        conn: ConnectionId,
        envelope: SignalEnvelope,
    ) -> Result<(), RendezvousError> {
        let mut state = self.registry.lock().await;
        if state.bound(&envelope.from_device_id, conn).is_none() {
            return Err(RendezvousError::NotRegistered);
        }

        let target_online = state
            .get(&envelope.to_device_id)
            .is_some_and(|r| r.is_online());
        if !target_online {
            return Err(RendezvousError::TargetUnreachable(envelope.to_device_id));
        }

        let SignalEnvelope {
            from_device_id,
            to_device_id,
            payload,
        } = envelope;
        tracing::debug!(from = %from_device_id, to = %to_device_id, "relaying signal");

        let delivered = send_to(
            &mut state,
            &to_device_id,
            ServerMessage::WebrtcSignal {
                from_device_id,
                signaling_data: payload,
            },
        );
        if !delivered {
            tracing::debug!(to = %to_device_id, "relay target dropped after lookup");
        }
        Ok(())
    }
}
