use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::info;

use crate::config::RelayConfig;
use crate::relay::SignalingRelay;

#[derive(Clone)]
pub struct AppState {
    start: Instant,
    relay: Arc<SignalingRelay>,
}

impl AppState {
    pub fn new(relay: SignalingRelay) -> Self {
        Self {
            start: Instant::now(),
            relay: Arc::new(relay),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(SignalingRelay::new(config.registry, config.monitor_id_len))
    }

    pub fn relay(&self) -> &Arc<SignalingRelay> {
        &self.relay
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start.elapsed().as_secs()
    }
}

/// Owns the relay state and its background sweeper for one server instance.
pub struct RelayService {
    state: AppState,
    sweeper: JoinHandle<()>,
}

impl RelayService {
    pub fn start(config: &RelayConfig) -> Self {
        Self::with_state(AppState::from_config(config), config.sweep_interval)
    }

    pub fn with_state(state: AppState, sweep_interval: Duration) -> Self {
        let sweeper = state.relay().registry().spawn_sweeper(sweep_interval);
        Self { state, sweeper }
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Stops sweeping and closes every open stream.
    pub fn shutdown(self) {
        self.sweeper.abort();
        let open = self.state.relay().live_streams();
        self.state.relay().registry().clear();
        info!(open, uptime_secs = self.state.uptime_secs(), "relay shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::Role;
    use signal_proto::Envelope;

    #[test_timeout::tokio_timeout_test(5)]
    async fn shutdown_closes_open_streams() {
        let service = RelayService::start(&RelayConfig::default());
        let state = service.state();
        let mut camera = state
            .relay()
            .open_stream(Role::Camera, Some("cam1"))
            .unwrap();

        service.shutdown();
        assert_eq!(camera.receiver.recv().await, Some(Envelope::heartbeat()));
        assert_eq!(camera.receiver.recv().await, None);
        assert_eq!(state.relay().live_streams(), 0);
    }
}
