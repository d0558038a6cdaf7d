use serde::de::DeserializeOwned;
use serde_json::Value;
use signal_proto::{Envelope, KIND_ICE, KIND_SDP};
use tracing::debug;

use crate::manager::{PeerConnectionManager, PeerError, PeerEvent};
use crate::types::{IceCandidate, SessionDescription};

impl PeerEvent {
    /// The envelope to relay for this event, if it is meant for the remote peer.
    pub fn to_envelope(&self) -> Option<Envelope> {
        match self {
            PeerEvent::LocalDescription(description) => serde_json::to_value(description)
                .ok()
                .map(Envelope::session_description),
            PeerEvent::LocalCandidate(candidate) => serde_json::to_value(candidate)
                .ok()
                .map(Envelope::ice_candidate),
            _ => None,
        }
    }
}

impl PeerConnectionManager {
    /// Applies an inbound `sdp` or `ice` envelope. Returns false for kinds
    /// the connection does not consume.
    pub async fn handle_envelope(&self, envelope: &Envelope) -> Result<bool, PeerError> {
        if envelope.is(KIND_SDP) {
            let description: SessionDescription = decode(envelope)?;
            self.set_remote_description(description).await;
            Ok(true)
        } else if envelope.is(KIND_ICE) {
            let candidate: IceCandidate = decode(envelope)?;
            self.add_ice_candidate(candidate).await?;
            Ok(true)
        } else {
            debug!(kind = %envelope.kind, "envelope not handled by peer connection");
            Ok(false)
        }
    }
}

fn decode<T: DeserializeOwned>(envelope: &Envelope) -> Result<T, PeerError> {
    let content = envelope.content.clone().unwrap_or(Value::Null);
    serde_json::from_value(content)
        .map_err(|err| PeerError::InvalidPayload(format!("{} envelope: {err}", envelope.kind)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test_timeout::timeout]
    fn local_description_becomes_sdp_envelope() {
        let event = PeerEvent::LocalDescription(SessionDescription::offer("v=0"));
        assert_eq!(
            event.to_envelope(),
            Some(Envelope::new(KIND_SDP, json!({"type": "offer", "sdp": "v=0"})))
        );
    }

    #[test_timeout::timeout]
    fn local_candidate_becomes_ice_envelope() {
        let mut candidate = IceCandidate::new("candidate:1");
        candidate.sdp_mid = Some("0".into());
        let envelope = PeerEvent::LocalCandidate(candidate).to_envelope().unwrap();
        assert!(envelope.is(KIND_ICE));
        assert_eq!(
            envelope.content,
            Some(json!({"candidate": "candidate:1", "sdpMid": "0"}))
        );
    }

    #[test_timeout::timeout]
    fn lifecycle_events_are_not_relayed() {
        assert_eq!(PeerEvent::Connected.to_envelope(), None);
        assert_eq!(PeerEvent::Disposed.to_envelope(), None);
    }
}
