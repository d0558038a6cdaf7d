//! Async client for the webcamera signaling relay.
//!
//! Stream-opening calls hand back an [`EnvelopeStream`]; signaling payloads
//! go out through [`SignalClient::send_event`].

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use reqwest::{header, Client, Response};
use serde_json::Value;
use signal_proto::{
    Envelope, EventLineDecoder, MonitorLinkRequest, OpenCameraRequest, OpenMonitorRequest,
    SendEventRequest, SEND_EVENT_ACK,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use url::Url;

const EVENT_STREAM: &str = "text/event-stream";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {status} body={body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("expected an event stream, got content type {0:?}")]
    UnexpectedContentType(String),
    #[error("unexpected acknowledgment {0:?}")]
    UnexpectedAck(String),
    #[error("invalid relay url: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Clone, Debug)]
pub struct SignalClient {
    http: Client,
    base_url: Url,
}

impl SignalClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_http(Client::new(), base_url)
    }

    pub fn with_http(http: Client, base_url: &str) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Publishes a camera stream under `camera_id`, replacing any previous one.
    pub async fn open_camera(&self, camera_id: &str) -> Result<EnvelopeStream, ClientError> {
        let body = OpenCameraRequest {
            camera_id: Some(camera_id.to_string()),
        };
        self.open("api/camera", &body).await
    }

    pub async fn open_monitor(&self, monitor_id: &str) -> Result<EnvelopeStream, ClientError> {
        let body = OpenMonitorRequest {
            monitor_id: Some(monitor_id.to_string()),
        };
        self.open("api/monitor", &body).await
    }

    /// Asks the relay to mint a monitor stream linked to `camera_id`. The
    /// new monitor id reaches the camera as a `monitorId` envelope.
    pub async fn request_monitor_link(
        &self,
        camera_id: &str,
    ) -> Result<EnvelopeStream, ClientError> {
        let body = MonitorLinkRequest {
            connect_id: Some(camera_id.to_string()),
        };
        self.open("api/connect", &body).await
    }

    pub async fn send_event(
        &self,
        target: &str,
        kind: &str,
        content: Value,
    ) -> Result<(), ClientError> {
        let body = SendEventRequest {
            id: Some(target.to_string()),
            kind: Some(kind.to_string()),
            content: Some(content),
        };
        let url = self.base_url.join("api/sendEvent")?;
        let res = self.http.post(url).json(&body).send().await?;
        let res = check_status(res).await?;
        let ack = res.text().await?;
        if ack.trim() != SEND_EVENT_ACK {
            return Err(ClientError::UnexpectedAck(ack));
        }
        trace!(target_id = target, kind, "event sent");
        Ok(())
    }

    async fn open<B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<EnvelopeStream, ClientError> {
        let url = self.base_url.join(path)?;
        let res = self
            .http
            .post(url.clone())
            .header(header::ACCEPT, EVENT_STREAM)
            .json(body)
            .send()
            .await?;
        let res = check_status(res).await?;
        let content_type = res
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with(EVENT_STREAM) {
            return Err(ClientError::UnexpectedContentType(content_type));
        }
        debug!(url = %url, "event stream opened");
        Ok(EnvelopeStream::spawn(res))
    }
}

async fn check_status(res: Response) -> Result<Response, ClientError> {
    if res.status().is_success() {
        Ok(res)
    } else {
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        Err(ClientError::Status { status, body })
    }
}

/// Envelopes pushed by the relay on one open stream.
///
/// A background task owns the HTTP response; dropping the stream aborts it,
/// which closes the connection and lets the relay drop the registration.
pub struct EnvelopeStream {
    rx: mpsc::UnboundedReceiver<Result<Envelope, ClientError>>,
    reader: JoinHandle<()>,
}

impl EnvelopeStream {
    fn spawn(res: Response) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_envelopes(res, tx));
        Self { rx, reader }
    }

    /// Next envelope, or `None` once the relay ends the stream.
    pub async fn next_envelope(&mut self) -> Option<Result<Envelope, ClientError>> {
        self.rx.recv().await
    }
}

impl Stream for EnvelopeStream {
    type Item = Result<Envelope, ClientError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for EnvelopeStream {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_envelopes(
    res: Response,
    tx: mpsc::UnboundedSender<Result<Envelope, ClientError>>,
) {
    let mut decoder = EventLineDecoder::new();
    let mut body = res.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                let _ = tx.send(Err(ClientError::Http(err)));
                return;
            }
        };
        for line in decoder.push(&chunk) {
            match serde_json::from_str::<Envelope>(&line) {
                Ok(envelope) => {
                    if tx.send(Ok(envelope)).is_err() {
                        return;
                    }
                }
                Err(err) => warn!(error = %err, line = %line, "skipping malformed envelope"),
            }
        }
    }
    debug!(pending = decoder.pending(), "event stream ended");
}
