//! Peer connection lifecycle on top of a pluggable transport.
//!
//! [`PeerConnectionManager`] owns one [`PeerTransport`], turns its events
//! into [`PeerEvent`]s and exchanges descriptions and candidates as
//! signaling envelopes.

pub mod envelope;
pub mod manager;
pub mod stats;
pub mod transport;
pub mod types;

pub use manager::{Lifecycle, PeerConnectionManager, PeerError, PeerEvent, DATA_CHANNEL_LABEL};
pub use stats::{
    CandidateStats, CandidateSummary, ConnectionSummary, StatsKind, StatsRecord, StatsReport,
};
pub use transport::{PeerTransport, TransportError, TransportEvent};
pub use types::{
    ConnectionState, DataChannel, IceCandidate, IceGatheringState, MediaTrack, RtpSender, SdpType,
    SessionDescription, SharedChannel, SharedTrack, TrackKind,
};
