use std::fmt;
use std::sync::Arc;

use rand::{distributions::Alphanumeric, Rng};
use serde_json::Value;
use signal_proto::Envelope;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::metrics;
use crate::registry::{
    DisposalError, EvictionHook, EvictionReason, ExpiringRegistry, RegistryConfig,
};
use crate::stream::EventStream;

pub type StreamRegistry = ExpiringRegistry<EventStream>;
pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Camera,
    Monitor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Camera => "camera",
            Role::Monitor => "monitor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stream registered under `id`, plus the receiver that feeds its response.
pub struct OpenedStream {
    pub id: String,
    pub stream: EventStream,
    pub receiver: mpsc::UnboundedReceiver<Envelope>,
}

/// Random alphanumeric id; uniqueness is only checked against live entries.
pub fn generate_monitor_id(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .map(char::from)
        .take(len)
        .collect()
}

/// Registry of open streams plus the four relay operations.
pub struct SignalingRelay {
    registry: Arc<StreamRegistry>,
    next_id: IdGenerator,
}

impl SignalingRelay {
    pub fn new(config: RegistryConfig, monitor_id_len: usize) -> Self {
        Self::with_id_generator(
            config,
            Arc::new(move || generate_monitor_id(monitor_id_len)),
        )
    }

    pub fn with_id_generator(config: RegistryConfig, next_id: IdGenerator) -> Self {
        let on_evict: EvictionHook<EventStream> = Arc::new(close_evicted);
        Self {
            registry: Arc::new(ExpiringRegistry::new(config, on_evict)),
            next_id,
        }
    }

    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    /// Registers a fresh stream under `id`, closing any stream it replaces,
    /// and queues the opening heartbeat.
    pub fn open_stream(&self, role: Role, id: Option<&str>) -> Result<OpenedStream, RelayError> {
        let id = required(id, role_field(role))?;
        let (stream, receiver) = EventStream::channel();
        self.registry.put(id, stream.clone());
        self.announce(role, id, &stream)?;
        Ok(OpenedStream {
            id: id.to_string(),
            stream,
            receiver,
        })
    }

    /// Mints a monitor id for `camera_id`, opens its stream and tells the
    /// camera about it.
    pub fn request_monitor_link(
        &self,
        camera_id: Option<&str>,
    ) -> Result<OpenedStream, RelayError> {
        let camera_id = required(camera_id, "connectId")?;
        let camera = self.registry.get(camera_id)?;

        let monitor_id = (self.next_id)();
        let (stream, receiver) = EventStream::channel();
        if let Err(err) = self.registry.put_if_absent(&monitor_id, stream.clone()) {
            warn!(camera_id, monitor_id = %monitor_id, "minted monitor id already in use");
            return Err(err.into());
        }
        self.announce(Role::Monitor, &monitor_id, &stream)?;

        if camera.push(Envelope::monitor_id(&monitor_id)).is_err() {
            self.registry
                .remove_if(&monitor_id, |current| current.serial() == stream.serial());
            self.registry
                .remove_if(camera_id, |current| current.serial() == camera.serial());
            return Err(RelayError::NotFound(camera_id.to_string()));
        }
        metrics::ENVELOPES_FORWARDED
            .with_label_values(&[metrics::kind_label(signal_proto::KIND_MONITOR_ID)])
            .inc();
        info!(camera_id, monitor_id = %monitor_id, "monitor linked to camera");

        Ok(OpenedStream {
            id: monitor_id,
            stream,
            receiver,
        })
    }

    /// Forwards `{type: kind, content}` to the stream registered under `target`.
    pub fn send_event(
        &self,
        target: Option<&str>,
        kind: Option<&str>,
        content: Option<Value>,
    ) -> Result<(), RelayError> {
        let target = required(target, "id")?;
        let kind = required(kind, "type")?;
        let content = match content {
            None | Some(Value::Null) => return Err(RelayError::missing("content")),
            Some(Value::String(s)) if s.is_empty() => return Err(RelayError::missing("content")),
            Some(content) => content,
        };

        let stream = self.registry.get(target)?;
        if stream.push(Envelope::new(kind, content)).is_err() {
            self.registry
                .remove_if(target, |current| current.serial() == stream.serial());
            return Err(RelayError::NotFound(target.to_string()));
        }
        metrics::ENVELOPES_FORWARDED
            .with_label_values(&[metrics::kind_label(kind)])
            .inc();
        debug!(target_id = target, kind, "envelope forwarded");
        Ok(())
    }

    /// Drops the entry for `id` if it still holds the stream with `serial`.
    pub fn disconnect(&self, id: &str, serial: u64) -> bool {
        let removed = self
            .registry
            .remove_if(id, |current| current.serial() == serial);
        if removed {
            debug!(id, serial, "client disconnected");
        }
        removed
    }

    pub fn live_streams(&self) -> usize {
        self.registry.len()
    }

    fn announce(&self, role: Role, id: &str, stream: &EventStream) -> Result<(), RelayError> {
        metrics::STREAMS_OPENED.with_label_values(&[role.as_str()]).inc();
        metrics::LIVE_STREAMS.inc();
        info!(role = %role, id, serial = stream.serial(), "stream opened");
        stream
            .push(Envelope::heartbeat())
            .map_err(|_| RelayError::NotFound(id.to_string()))
    }
}

fn close_evicted(
    id: &str,
    stream: &EventStream,
    reason: EvictionReason,
) -> Result<(), DisposalError> {
    // Every way out of the registry passes through here.
    metrics::EVICTIONS.with_label_values(&[reason.as_str()]).inc();
    metrics::LIVE_STREAMS.dec();
    if stream.close() {
        info!(id, serial = stream.serial(), reason = %reason, "stream disposed");
    } else {
        debug!(id, serial = stream.serial(), reason = %reason, "stream already closed");
    }
    Ok(())
}

fn role_field(role: Role) -> &'static str {
    match role {
        Role::Camera => "cameraId",
        Role::Monitor => "monitorId",
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, RelayError> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(RelayError::missing(field)),
    }
}
