//! The request side of the application contract: headers, the body chunk
//! queue, and the trailers queue.

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::channel::{self, NotifyingReceiver, NotifyingSender};

/// How many `DataChunk`s may be buffered ahead of the application. HTTP/2
/// flow control (the peer's receive window) is what actually bounds how much
/// data can arrive, so this only needs to be large enough that the one chunk
/// in flight doesn't stall the body-pump task, keeping backpressure
/// effectively at one chunk in flight.
const BODY_CHANNEL_CAPACITY: usize = 1;

/// A single HTTP header or pseudo-header, as an opaque `(name, value)` byte
/// pair. Pseudo-headers (`:method`, `:path`, `:authority`, `:scheme`,
/// `:status`) are ordinary entries, not special-cased — `http::HeaderName`
/// cannot represent them (it rejects the leading colon), so request/response
/// header lists in this crate use this type instead of `http::HeaderMap`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// The header name, including the leading colon for pseudo-headers.
    pub name: Bytes,
    /// The header value.
    pub value: Bytes,
}

impl Header {
    /// Builds a header from anything convertible to `Bytes`.
    pub fn new(name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Fired exactly once per [`DataChunk`], by the application (after it has
/// consumed the chunk) or by the stream handler (if the body channel is
/// closed while chunks remain buffered). Firing it credits the chunk's bytes
/// back to the peer's flow-control window via a `WINDOW_UPDATE`.
pub struct AckSignal {
    tx: Option<oneshot::Sender<()>>,
}

impl AckSignal {
    pub(crate) fn new() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Signals that this chunk's bytes may now be credited back to the peer.
    /// Idempotent: firing an already-fired signal is a no-op.
    pub fn ack(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// A chunk of request body data paired with its acknowledgement signal.
pub struct DataChunk {
    /// The raw bytes received.
    pub data: Bytes,
    /// Must be acknowledged exactly once; see [`AckSignal`].
    pub ack: AckSignal,
}

/// Wraps a [`NotifyingReceiver<DataChunk>`] so that any chunks still
/// buffered when the application is done with the body are acknowledged
/// automatically, returning their flow-control credit to the peer. Losing
/// these acks would wedge the peer's send window permanently.
pub struct BodyReceiver {
    inner: NotifyingReceiver<DataChunk>,
}

impl BodyReceiver {
    pub(crate) fn new(inner: NotifyingReceiver<DataChunk>) -> Self {
        Self { inner }
    }

    /// Receives the next chunk, or `None` once the body has been fully
    /// received and drained.
    pub async fn recv(&mut self) -> Option<DataChunk> {
        self.inner.recv().await
    }

    /// Discards the rest of the body, acknowledging every chunk still
    /// buffered so the peer's flow-control window is not left wedged.
    pub fn close(&mut self) {
        self.inner.close();
        while let Some(chunk) = self.inner.try_recv() {
            chunk.ack.ack();
        }
    }
}

impl Drop for BodyReceiver {
    fn drop(&mut self) {
        self.close();
    }
}

pub(crate) fn body_channel() -> (NotifyingSender<DataChunk>, BodyReceiver) {
    let (tx, rx) = channel::notifying_channel(BODY_CHANNEL_CAPACITY);
    (tx, BodyReceiver::new(rx))
}

/// A finite, ordered sequence of trailer [`Header`]s, readable only after the
/// body has been fully consumed or closed.
pub struct TrailersReceiver {
    rx: tokio::sync::mpsc::UnboundedReceiver<Header>,
}

impl TrailersReceiver {
    /// Receives the next trailer, or `None` once all trailers (zero or more)
    /// have been delivered.
    pub async fn recv(&mut self) -> Option<Header> {
        self.rx.recv().await
    }
}

pub(crate) fn trailers_channel() -> (tokio::sync::mpsc::UnboundedSender<Header>, TrailersReceiver) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    (tx, TrailersReceiver { rx })
}

/// An HTTP/2 request, as presented to the application.
pub struct Request {
    /// All request headers, including pseudo-headers, in wire order.
    pub headers: Vec<Header>,
    /// The request body, as a finite asynchronous sequence of acknowledged chunks.
    pub body: BodyReceiver,
    /// Request trailers. Must not be read until the body has been fully read
    /// or closed.
    pub trailers: TrailersReceiver,
}
