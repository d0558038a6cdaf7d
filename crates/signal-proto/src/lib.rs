//! Wire vocabulary shared by the signaling relay and its clients.
//! The relay only dispatches on `Envelope::kind`; `content` stays opaque.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod sse;

pub use sse::EventLineDecoder;

/// Keep-alive pushed as the first envelope of every stream.
pub const KIND_HEARTBEAT: &str = "heartbeat";
/// Sent to a camera stream carrying a freshly minted monitor id.
pub const KIND_MONITOR_ID: &str = "monitorId";
/// Session description (offer or answer).
pub const KIND_SDP: &str = "sdp";
/// Trickled ICE candidate.
pub const KIND_ICE: &str = "ice";

/// One pushed signaling message: `{"type": ..., "content": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, content: Value) -> Self {
        Self {
            kind: kind.into(),
            content: Some(content),
        }
    }

    pub fn heartbeat() -> Self {
        Self {
            kind: KIND_HEARTBEAT.to_string(),
            content: None,
        }
    }

    pub fn monitor_id(id: &str) -> Self {
        Self::new(KIND_MONITOR_ID, Value::String(id.to_string()))
    }

    pub fn session_description(description: Value) -> Self {
        Self::new(KIND_SDP, description)
    }

    pub fn ice_candidate(candidate: Value) -> Self {
        Self::new(KIND_ICE, candidate)
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Content as a string, used for `monitorId` envelopes.
    pub fn content_str(&self) -> Option<&str> {
        self.content.as_ref().and_then(Value::as_str)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".into())
    }
}

/// Body of `POST /api/camera`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenCameraRequest {
    #[serde(default)]
    pub camera_id: Option<String>,
}

/// Body of `POST /api/monitor`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenMonitorRequest {
    #[serde(default)]
    pub monitor_id: Option<String>,
}

/// Body of `POST /api/connect`; `connect_id` names the camera.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorLinkRequest {
    #[serde(default)]
    pub connect_id: Option<String>,
}

/// Body of `POST /api/sendEvent`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendEventRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub content: Option<Value>,
}

/// Acknowledgment body returned by `POST /api/sendEvent`.
pub const SEND_EVENT_ACK: &str = "success";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test_timeout::timeout]
    fn heartbeat_omits_content() {
        assert_eq!(Envelope::heartbeat().to_json(), r#"{"type":"heartbeat"}"#);
    }

    #[test_timeout::timeout]
    fn monitor_id_envelope_matches_wire_shape() {
        let envelope = Envelope::monitor_id("abc123");
        let value: Value = serde_json::from_str(&envelope.to_json()).unwrap();
        assert_eq!(value, json!({"type": "monitorId", "content": "abc123"}));
        assert_eq!(envelope.content_str(), Some("abc123"));
    }

    #[test_timeout::timeout]
    fn send_event_request_tolerates_missing_fields() {
        let request: SendEventRequest = serde_json::from_str(r#"{"id":"m1"}"#).unwrap();
        assert_eq!(request.id.as_deref(), Some("m1"));
        assert!(request.kind.is_none());
        assert!(request.content.is_none());
    }

    #[test_timeout::timeout]
    fn request_bodies_use_camel_case() {
        let body = serde_json::to_value(MonitorLinkRequest {
            connect_id: Some("cam1".into()),
        })
        .unwrap();
        assert_eq!(body, json!({"connectId": "cam1"}));
        let camera: OpenCameraRequest = serde_json::from_str(r#"{"cameraId":"cam1"}"#).unwrap();
        assert_eq!(camera.camera_id.as_deref(), Some("cam1"));
    }
}
