//! Observability events.
//!
//! Distinct from log lines: a [`ServerEvent`] is a structured record an
//! embedder can subscribe to (metrics, alerting, ...), delivered best-effort
//! on an optional channel passed explicitly into [`crate::server::serve`]
//! rather than threaded through any ambient/thread-local state, which has no
//! safe equivalent once work is spread across `tokio` tasks that may run on
//! different worker threads.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::BoxedError;

/// An event of interest published by the server.
#[derive(Debug)]
pub enum ServerEvent {
    /// A connection was closed due to an error.
    ConnectionError {
        /// The peer's address.
        peer: SocketAddr,
        /// The error that ended the connection.
        error: BoxedError,
    },
    /// A stream was closed due to an error.
    StreamError {
        /// The peer's address.
        peer: SocketAddr,
        /// The id of the affected stream.
        stream_id: u64,
        /// The error that ended the stream.
        error: BoxedError,
    },
}

/// Best-effort publisher for [`ServerEvent`]s.
///
/// If the receiving end is closed, the sender detaches silently. A full
/// channel is logged once, the event dropped, and the sender detached too,
/// rather than blocking the connection or stream task that is trying to
/// publish it or logging unboundedly on every subsequent event.
#[derive(Clone)]
pub struct EventPublisher {
    inner: Arc<Mutex<Option<mpsc::Sender<ServerEvent>>>>,
}

impl EventPublisher {
    /// Creates a publisher around an optional sender. `None` means events are
    /// dropped unconditionally, with no locking overhead.
    pub fn new(sender: Option<mpsc::Sender<ServerEvent>>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(sender)),
        }
    }

    /// Publishes an event, dropping it silently if there is no live receiver.
    pub fn publish(&self, event: ServerEvent) {
        let sender = {
            let guard = self.inner.lock();
            guard.clone()
        };
        let Some(sender) = sender else {
            return;
        };

        match sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => {
                *self.inner.lock() = None;
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("server event channel is full, dropping event and detaching");
                *self.inner.lock() = None;
            }
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(None)
    }
}
