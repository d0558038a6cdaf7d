#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use peer_session::{
    ConnectionState, DataChannel, IceCandidate, MediaTrack, PeerEvent, PeerTransport, RtpSender,
    SessionDescription, SharedChannel, SharedTrack, StatsReport, TrackKind, TransportError,
    TransportEvent,
};
use tokio::sync::{mpsc, Notify};

pub struct FakeTrack {
    id: String,
    kind: TrackKind,
    stops: AtomicUsize,
}

impl FakeTrack {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            kind: TrackKind::Video,
            stops: AtomicUsize::new(0),
        })
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl MediaTrack for FakeTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stops() > 0
    }
}

pub struct FakeChannel {
    label: String,
    closes: AtomicUsize,
}

impl FakeChannel {
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl DataChannel for FakeChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn close(&self) -> Result<(), TransportError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct SimState {
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    candidates: Vec<IceCandidate>,
    senders: Vec<RtpSender>,
    receivers: Vec<SharedTrack>,
    channels: Vec<Arc<FakeChannel>>,
    next_sender: usize,
    connection: Option<ConnectionState>,
    closes: usize,
    stats: StatsReport,
    fail_remote: bool,
    fail_stats: bool,
    fail_remove: Option<String>,
}

/// In-memory transport whose events are raised by the test.
pub struct SimTransport {
    events_tx: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
    state: Mutex<SimState>,
    offer_gate: Mutex<Option<Arc<Notify>>>,
    pub offer_started: Notify,
}

impl SimTransport {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            events_tx: Mutex::new(Some(tx)),
            events_rx: Mutex::new(Some(rx)),
            state: Mutex::new(SimState::default()),
            offer_gate: Mutex::new(None),
            offer_started: Notify::new(),
        })
    }

    /// Holds every offer until the returned gate is notified.
    pub fn gate_offers(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.offer_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn raise(&self, event: TransportEvent) -> bool {
        match self.events_tx.lock().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn set_connection(&self, state: ConnectionState) {
        self.state.lock().connection = Some(state);
        self.raise(TransportEvent::ConnectionStateChange(state));
    }

    pub fn add_receiver(&self, track: SharedTrack) {
        self.state.lock().receivers.push(track.clone());
        self.raise(TransportEvent::Track(track));
    }

    pub fn fail_remote_descriptions(&self) {
        self.state.lock().fail_remote = true;
    }

    pub fn fail_stats(&self) {
        self.state.lock().fail_stats = true;
    }

    /// Makes removing the sender of track `track_id` fail, leaving it attached.
    pub fn fail_remove_of(&self, track_id: &str) {
        self.state.lock().fail_remove = Some(track_id.to_string());
    }

    pub fn set_stats(&self, report: StatsReport) {
        self.state.lock().stats = report;
    }

    pub fn closes(&self) -> usize {
        self.state.lock().closes
    }

    pub fn is_detached(&self) -> bool {
        self.events_tx.lock().is_none()
    }

    pub fn remote(&self) -> Option<SessionDescription> {
        self.state.lock().remote.clone()
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.state.lock().candidates.clone()
    }

    pub fn channels(&self) -> Vec<Arc<FakeChannel>> {
        self.state.lock().channels.clone()
    }

    pub fn sent_track_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .senders
            .iter()
            .filter_map(|sender| sender.track.as_ref().map(|t| t.id().to_string()))
            .collect()
    }

    fn check_open(&self) -> Result<(), TransportError> {
        if self.state.lock().closes > 0 {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PeerTransport for SimTransport {
    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        self.offer_started.notify_one();
        let gate = self.offer_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.check_open()?;
        Ok(SessionDescription::offer("v=0 sim-offer"))
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        self.check_open()?;
        Ok(SessionDescription::answer("v=0 sim-answer"))
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), TransportError> {
        self.check_open()?;
        self.state.lock().local = Some(description);
        Ok(())
    }

    fn local_description(&self) -> Option<SessionDescription> {
        self.state.lock().local.clone()
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), TransportError> {
        self.check_open()?;
        let mut state = self.state.lock();
        if state.fail_remote {
            return Err(TransportError::Rejected("malformed remote sdp".into()));
        }
        state.remote = Some(description);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        self.check_open()?;
        if candidate.candidate.is_empty() {
            return Err(TransportError::Rejected("empty candidate".into()));
        }
        self.state.lock().candidates.push(candidate);
        Ok(())
    }

    async fn get_stats(&self) -> Result<StatsReport, TransportError> {
        let state = self.state.lock();
        if state.fail_stats {
            return Err(TransportError::Rejected("stats unavailable".into()));
        }
        Ok(state.stats.clone())
    }

    fn add_track(&self, track: SharedTrack) -> Result<RtpSender, TransportError> {
        self.check_open()?;
        let mut state = self.state.lock();
        state.next_sender += 1;
        let sender = RtpSender {
            id: format!("sender-{}", state.next_sender),
            track: Some(track),
        };
        state.senders.push(sender.clone());
        Ok(sender)
    }

    fn remove_track(&self, sender: &RtpSender) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        let track_id = sender.track.as_ref().map(|t| t.id().to_string());
        if track_id.is_some() && state.fail_remove == track_id {
            return Err(TransportError::Rejected("sender busy".into()));
        }
        state.senders.retain(|s| s.id != sender.id);
        Ok(())
    }

    fn senders(&self) -> Vec<RtpSender> {
        self.state.lock().senders.clone()
    }

    fn receiver_tracks(&self) -> Vec<SharedTrack> {
        self.state.lock().receivers.clone()
    }

    fn create_data_channel(&self, label: &str) -> Result<SharedChannel, TransportError> {
        self.check_open()?;
        let channel = Arc::new(FakeChannel {
            label: label.to_string(),
            closes: AtomicUsize::new(0),
        });
        self.state.lock().channels.push(channel.clone());
        Ok(channel)
    }

    fn connection_state(&self) -> ConnectionState {
        self.state
            .lock()
            .connection
            .unwrap_or(ConnectionState::New)
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.events_rx.lock().take()
    }

    fn detach_events(&self) {
        self.events_tx.lock().take();
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.closes += 1;
        state.connection = Some(ConnectionState::Closed);
        Ok(())
    }
}

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<PeerEvent>) -> PeerEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for peer event")
        .expect("peer event channel closed")
}

/// Lets spawned tasks run, then returns whatever was emitted meanwhile.
pub async fn drain(rx: &mut mpsc::UnboundedReceiver<PeerEvent>) -> Vec<PeerEvent> {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn shared(track: &Arc<FakeTrack>) -> SharedTrack {
    track.clone()
}
