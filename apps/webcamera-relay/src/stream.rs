use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use signal_proto::Envelope;
use thiserror::Error;
use tokio::sync::mpsc;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("event stream {0} is closed")]
pub struct StreamClosed(pub u64);

struct StreamInner {
    serial: u64,
    sender: Mutex<Option<mpsc::UnboundedSender<Envelope>>>,
}

/// Sending half of one client's server-push stream.
///
/// Clones share the same channel. Pushes hold the per-stream lock while
/// enqueueing, so envelopes for one target keep the order in which pushes
/// completed.
#[derive(Clone)]
pub struct EventStream {
    inner: Arc<StreamInner>,
}

impl EventStream {
    /// Creates a stream and the receiver that feeds the HTTP response body.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stream = Self {
            inner: Arc::new(StreamInner {
                serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
                sender: Mutex::new(Some(tx)),
            }),
        };
        (stream, rx)
    }

    pub fn serial(&self) -> u64 {
        self.inner.serial
    }

    pub fn push(&self, envelope: Envelope) -> Result<(), StreamClosed> {
        let guard = self.inner.sender.lock();
        match guard.as_ref() {
            Some(tx) => tx
                .send(envelope)
                .map_err(|_| StreamClosed(self.inner.serial)),
            None => Err(StreamClosed(self.inner.serial)),
        }
    }

    /// Ends the stream. Returns false when it was already closed.
    pub fn close(&self) -> bool {
        self.inner.sender.lock().take().is_some()
    }

    /// True once closed locally or once the receiving side has gone away.
    pub fn is_closed(&self) -> bool {
        match self.inner.sender.lock().as_ref() {
            Some(tx) => tx.is_closed(),
            None => true,
        }
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("serial", &self.inner.serial)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::tokio_timeout_test(5)]
    async fn pushes_arrive_in_order() {
        let (stream, mut rx) = EventStream::channel();
        let clone = stream.clone();
        stream.push(Envelope::heartbeat()).unwrap();
        clone.push(Envelope::monitor_id("m1")).unwrap();
        assert_eq!(rx.recv().await, Some(Envelope::heartbeat()));
        assert_eq!(rx.recv().await, Some(Envelope::monitor_id("m1")));
    }

    #[test_timeout::tokio_timeout_test(5)]
    async fn close_is_idempotent_and_ends_receiver() {
        let (stream, mut rx) = EventStream::channel();
        assert!(stream.close());
        assert!(!stream.close());
        assert!(stream.is_closed());
        assert_eq!(rx.recv().await, None);
        assert_eq!(
            stream.push(Envelope::heartbeat()),
            Err(StreamClosed(stream.serial()))
        );
    }

    #[test_timeout::tokio_timeout_test(5)]
    async fn dropped_receiver_marks_stream_closed() {
        let (stream, rx) = EventStream::channel();
        drop(rx);
        assert!(stream.is_closed());
        assert!(stream.push(Envelope::heartbeat()).is_err());
    }

    #[test_timeout::timeout]
    fn serials_are_unique() {
        let (a, _rx_a) = EventStream::channel();
        let (b, _rx_b) = EventStream::channel();
        assert_ne!(a.serial(), b.serial());
    }
}
