use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::stats::StatsReport;
use crate::types::{
    ConnectionState, IceCandidate, IceGatheringState, RtpSender, SessionDescription,
    SharedChannel, SharedTrack,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport rejected operation: {0}")]
    Rejected(String),
    #[error("transport is closed")]
    Closed,
}

/// Notifications raised by the transport, delivered in the order raised.
pub enum TransportEvent {
    NegotiationNeeded,
    /// A gathered local candidate; `None` marks the end of gathering.
    IceCandidate(Option<IceCandidate>),
    IceCandidateError {
        url: String,
        error_code: u16,
        error_text: String,
    },
    Track(SharedTrack),
    /// The remote source muted the track with this id.
    TrackMuted(String),
    ConnectionStateChange(ConnectionState),
    IceGatheringStateChange(IceGatheringState),
}

impl std::fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportEvent::NegotiationNeeded => f.write_str("NegotiationNeeded"),
            TransportEvent::IceCandidate(c) => f.debug_tuple("IceCandidate").field(c).finish(),
            TransportEvent::IceCandidateError {
                url,
                error_code,
                error_text,
            } => f
                .debug_struct("IceCandidateError")
                .field("url", url)
                .field("error_code", error_code)
                .field("error_text", error_text)
                .finish(),
            TransportEvent::Track(track) => f.debug_tuple("Track").field(&track.id()).finish(),
            TransportEvent::TrackMuted(id) => f.debug_tuple("TrackMuted").field(id).finish(),
            TransportEvent::ConnectionStateChange(state) => {
                f.debug_tuple("ConnectionStateChange").field(state).finish()
            }
            TransportEvent::IceGatheringStateChange(state) => {
                f.debug_tuple("IceGatheringStateChange").field(state).finish()
            }
        }
    }
}

/// Capabilities the connection manager needs from a native peer connection.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, TransportError>;
    async fn create_answer(&self) -> Result<SessionDescription, TransportError>;
    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), TransportError>;
    /// The description currently applied locally, after ICE details were filled in.
    fn local_description(&self) -> Option<SessionDescription>;
    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), TransportError>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError>;
    async fn get_stats(&self) -> Result<StatsReport, TransportError>;

    fn add_track(&self, track: SharedTrack) -> Result<RtpSender, TransportError>;
    fn remove_track(&self, sender: &RtpSender) -> Result<(), TransportError>;
    fn senders(&self) -> Vec<RtpSender>;
    fn receiver_tracks(&self) -> Vec<SharedTrack>;
    fn create_data_channel(&self, label: &str) -> Result<SharedChannel, TransportError>;
    fn connection_state(&self) -> ConnectionState;

    /// Hands out the event receiver. Returns `None` after the first call.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>>;
    /// Stops raising events; the receiver then ends.
    fn detach_events(&self);
    async fn close(&self) -> Result<(), TransportError>;
}
