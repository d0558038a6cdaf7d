use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::stats::ConnectionSummary;
use crate::transport::{PeerTransport, TransportError, TransportEvent};
use crate::types::{
    stop_track, ConnectionState, IceCandidate, SessionDescription, SharedChannel, SharedTrack,
};

pub const DATA_CHANNEL_LABEL: &str = "dataChannel";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PeerError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("peer connection already disposed")]
    Disposed,
    #[error("transport events were already taken")]
    EventsTaken,
    #[error("invalid signaling payload: {0}")]
    InvalidPayload(String),
}

/// Notifications for the side that owns the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// Offer or answer to forward to the remote peer.
    LocalDescription(SessionDescription),
    LocalCandidate(IceCandidate),
    Error(PeerError),
    Connected,
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    New,
    Negotiating,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl Lifecycle {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Lifecycle::Disconnected | Lifecycle::Failed | Lifecycle::Closed
        )
    }
}

impl From<ConnectionState> for Lifecycle {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::New => Lifecycle::New,
            ConnectionState::Connecting => Lifecycle::Negotiating,
            ConnectionState::Connected => Lifecycle::Connected,
            ConnectionState::Disconnected => Lifecycle::Disconnected,
            ConnectionState::Failed => Lifecycle::Failed,
            ConnectionState::Closed => Lifecycle::Closed,
        }
    }
}

struct ManagerState {
    lifecycle: Lifecycle,
    connected_announced: bool,
    data_channel: Option<SharedChannel>,
    disposed: bool,
}

struct Shared {
    transport: Arc<dyn PeerTransport>,
    events: mpsc::UnboundedSender<PeerEvent>,
    state: Mutex<ManagerState>,
    tracks: watch::Sender<Vec<SharedTrack>>,
}

/// Drives one peer connection through negotiation, media and teardown.
///
/// Transport events are handled on a single pump task in the order the
/// transport raised them. Offer and answer creation run on their own tasks;
/// their results are dropped if the manager is disposed meanwhile. Dropping
/// the last clone without [`dispose`](Self::dispose) still stops every track
/// and closes the transport in the background.
#[derive(Clone)]
pub struct PeerConnectionManager {
    shared: Arc<Shared>,
}

impl PeerConnectionManager {
    /// Takes over `transport` and returns the manager with its event receiver.
    /// Must be called inside a tokio runtime.
    pub fn new(
        transport: Arc<dyn PeerTransport>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<PeerEvent>), PeerError> {
        let transport_events = transport.take_events().ok_or(PeerError::EventsTaken)?;
        let (events, rx) = mpsc::unbounded_channel();
        let (tracks, _) = watch::channel(Vec::new());
        let shared = Arc::new(Shared {
            transport,
            events,
            state: Mutex::new(ManagerState {
                lifecycle: Lifecycle::New,
                connected_announced: false,
                data_channel: None,
                disposed: false,
            }),
            tracks,
        });
        tokio::spawn(pump(Arc::downgrade(&shared), transport_events));
        Ok((Self { shared }, rx))
    }

    pub fn state(&self) -> Lifecycle {
        self.shared.state.lock().lifecycle
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    pub fn is_connected(&self) -> bool {
        !self.is_disposed()
            && self.shared.transport.connection_state() == ConnectionState::Connected
    }

    /// Remote tracks currently received and not muted.
    pub fn remote_tracks(&self) -> Vec<SharedTrack> {
        self.shared.tracks.borrow().clone()
    }

    pub fn subscribe_tracks(&self) -> watch::Receiver<Vec<SharedTrack>> {
        self.shared.tracks.subscribe()
    }

    /// Applies the remote peer's description and answers it if it was an offer.
    /// Failures are reported as [`PeerEvent::Error`] and tear the connection down.
    pub async fn set_remote_description(&self, description: SessionDescription) {
        if self.is_disposed() {
            debug!(kind = ?description.kind, "ignoring remote description after dispose");
            return;
        }
        self.shared.begin_negotiation();
        let is_offer = description.is_offer();
        let result = async {
            self.shared.transport.set_remote_description(description).await?;
            if !is_offer {
                return Ok(None);
            }
            let answer = self.shared.transport.create_answer().await?;
            self.shared
                .transport
                .set_local_description(answer.clone())
                .await?;
            Ok::<_, TransportError>(Some(answer))
        }
        .await;

        match result {
            Ok(Some(answer)) => {
                self.shared.emit_live(PeerEvent::LocalDescription(answer));
            }
            Ok(None) => debug!("remote answer applied"),
            Err(err) => self.shared.fail("apply remote description", err).await,
        }
    }

    pub async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError> {
        if self.is_disposed() {
            return Err(PeerError::Disposed);
        }
        self.shared.transport.add_ice_candidate(candidate).await?;
        Ok(())
    }

    /// Replaces every sent track with `tracks`. Each replaced track is stopped
    /// once, whether or not its sender could be detached. A transport failure
    /// is reported as [`PeerEvent::Error`], tears the connection down and is
    /// returned as well.
    pub async fn update_stream(&self, tracks: Vec<SharedTrack>) -> Result<(), PeerError> {
        if self.is_disposed() {
            return Err(PeerError::Disposed);
        }
        let transport = &self.shared.transport;
        let mut failure = None;
        for sender in transport.senders() {
            if let Err(err) = transport.remove_track(&sender) {
                warn!(sender = %sender.id, error = %err, "failed to remove sender");
                failure.get_or_insert(err);
            }
            if let Some(track) = &sender.track {
                stop_track(track);
            }
        }
        if failure.is_none() {
            for track in tracks {
                match transport.add_track(track) {
                    Ok(sender) => debug!(sender = %sender.id, "track added"),
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                }
            }
        }
        match failure {
            None => Ok(()),
            Some(err) => {
                self.shared.fail("update stream", err.clone()).await;
                Err(err.into())
            }
        }
    }

    /// The connection's data channel, created on first use.
    pub fn data_channel(&self) -> Result<SharedChannel, PeerError> {
        let mut state = self.shared.state.lock();
        if state.disposed {
            return Err(PeerError::Disposed);
        }
        if let Some(channel) = &state.data_channel {
            return Ok(channel.clone());
        }
        let channel = self
            .shared
            .transport
            .create_data_channel(DATA_CHANNEL_LABEL)?;
        state.data_channel = Some(channel.clone());
        Ok(channel)
    }

    /// Byte counters and selected candidates. Failures are reported as
    /// [`PeerEvent::Error`] and yield the zero summary, as does a disposed
    /// manager.
    pub async fn get_statistics(&self) -> ConnectionSummary {
        if self.is_disposed() {
            return ConnectionSummary::default();
        }
        match self.shared.transport.get_stats().await {
            Ok(report) if !self.is_disposed() => ConnectionSummary::from_report(&report),
            Ok(_) => ConnectionSummary::default(),
            Err(err) => {
                if !self.shared.emit_live(PeerEvent::Error(err.clone().into())) {
                    debug!(error = %err, "stats failure after dispose suppressed");
                }
                ConnectionSummary::default()
            }
        }
    }

    /// Tears the connection down. Safe to call any number of times; only the
    /// first call emits [`PeerEvent::Disposed`].
    pub async fn dispose(&self) {
        self.shared.teardown(Lifecycle::Closed).await;
    }
}

impl Shared {
    fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    /// Sends `event` unless disposed. The check and the send happen under the
    /// state lock so nothing but `Disposed` follows teardown.
    fn emit_live(&self, event: PeerEvent) -> bool {
        let state = self.state.lock();
        if state.disposed {
            return false;
        }
        let _ = self.events.send(event);
        true
    }

    fn begin_negotiation(&self) {
        let mut state = self.state.lock();
        if state.disposed {
            return;
        }
        state.connected_announced = false;
        if state.lifecycle == Lifecycle::New {
            state.lifecycle = Lifecycle::Negotiating;
        }
    }

    async fn negotiate(self: Arc<Self>) {
        let result = async {
            let offer = self.transport.create_offer().await?;
            self.transport.set_local_description(offer).await?;
            Ok::<_, TransportError>(self.transport.local_description())
        }
        .await;

        match result {
            Ok(Some(description)) => {
                if !self.emit_live(PeerEvent::LocalDescription(description)) {
                    debug!("offer discarded after dispose");
                }
            }
            Ok(None) => warn!("offer applied but transport has no local description"),
            Err(err) => self.fail("negotiate offer", err).await,
        }
    }

    async fn fail(&self, stage: &'static str, err: TransportError) {
        if self.is_disposed() {
            debug!(stage, error = %err, "failure after dispose suppressed");
            return;
        }
        warn!(stage, error = %err, "peer connection failed");
        self.emit_live(PeerEvent::Error(err.into()));
        self.teardown(Lifecycle::Failed).await;
    }

    async fn on_transport_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::NegotiationNeeded => {
                if self.is_disposed() {
                    return;
                }
                self.begin_negotiation();
                tokio::spawn(self.clone().negotiate());
            }
            TransportEvent::IceCandidate(Some(candidate)) => {
                self.emit_live(PeerEvent::LocalCandidate(candidate));
            }
            TransportEvent::IceCandidate(None) => debug!("local candidate gathering finished"),
            TransportEvent::IceCandidateError {
                url,
                error_code,
                error_text,
            } => {
                warn!(url = %url, error_code, error_text = %error_text, "ice candidate error");
                self.emit_live(PeerEvent::Error(PeerError::Transport(
                    TransportError::Rejected(format!("{error_code} {error_text} ({url})")),
                )));
            }
            TransportEvent::Track(track) => {
                if self.is_disposed() {
                    stop_track(&track);
                    return;
                }
                debug!(track = track.id(), kind = %track.kind(), "remote track received");
                self.tracks.send_modify(|tracks| tracks.push(track));
            }
            TransportEvent::TrackMuted(id) => {
                let mut muted = Vec::new();
                self.tracks.send_if_modified(|tracks| {
                    let before = tracks.len();
                    tracks.retain(|track| {
                        if track.id() == id {
                            muted.push(track.clone());
                            false
                        } else {
                            true
                        }
                    });
                    tracks.len() != before
                });
                for track in &muted {
                    stop_track(track);
                }
                debug!(track = %id, removed = muted.len(), "remote track muted");
            }
            TransportEvent::ConnectionStateChange(state) => self.on_connection_state(state).await,
            TransportEvent::IceGatheringStateChange(state) => {
                debug!(state = ?state, "ice gathering state changed");
            }
        }
    }

    async fn on_connection_state(&self, connection: ConnectionState) {
        debug!(state = ?connection, "connection state changed");
        if connection.is_terminal() {
            self.teardown(connection.into()).await;
            return;
        }
        let announce = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            if connection != ConnectionState::New {
                state.lifecycle = connection.into();
            }
            let announce = connection == ConnectionState::Connected && !state.connected_announced;
            if announce {
                state.connected_announced = true;
            }
            announce
        };
        if announce {
            info!("peer connected");
            self.emit_live(PeerEvent::Connected);
        }
    }

    async fn teardown(&self, terminal: Lifecycle) {
        let data_channel = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.lifecycle = terminal;
            state.data_channel.take()
        };

        let stopped = self.release(data_channel);
        if let Err(err) = self.transport.close().await {
            warn!(error = %err, "failed to close transport");
        }

        info!(state = ?terminal, stopped, "peer connection disposed");
        let _ = self.events.send(PeerEvent::Disposed);
    }

    /// Stops every track, closes the data channel and detaches transport
    /// events. Returns how many tracks were stopped here.
    fn release(&self, data_channel: Option<SharedChannel>) -> usize {
        let mut stopped = 0usize;
        for sender in self.transport.senders() {
            if let Some(track) = &sender.track {
                stopped += usize::from(stop_track(track));
            }
        }
        for track in self.transport.receiver_tracks() {
            stopped += usize::from(stop_track(&track));
        }
        for track in self.tracks.send_replace(Vec::new()) {
            stopped += usize::from(stop_track(&track));
        }
        if let Some(channel) = data_channel {
            if let Err(err) = channel.close() {
                warn!(label = channel.label(), error = %err, "failed to close data channel");
            }
        }
        self.transport.detach_events();
        stopped
    }
}

impl Drop for Shared {
    /// Last handle gone without `dispose`: release everything and close the
    /// transport on the current runtime.
    fn drop(&mut self) {
        let data_channel = {
            let state = self.state.get_mut();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.lifecycle = Lifecycle::Closed;
            state.data_channel.take()
        };

        let stopped = self.release(data_channel);
        let transport = self.transport.clone();
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = transport.close().await {
                        warn!(error = %err, "failed to close transport");
                    }
                });
            }
            Err(_) => warn!("peer connection dropped outside a runtime; transport left open"),
        }

        info!(stopped, "peer connection dropped without dispose");
        let _ = self.events.send(PeerEvent::Disposed);
    }
}

async fn pump(shared: Weak<Shared>, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
    while let Some(event) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.on_transport_event(event).await;
    }
    debug!("transport event pump finished");
}
