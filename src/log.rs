//! Contextual logging.
//!
//! A [`tracing::Span`] carries the peer address and stream id into every log
//! line emitted underneath it for the lifetime of the guard, with no
//! explicit thread-local bookkeeping needed.

use std::net::SocketAddr;

/// Returns a span scoped to one connection. Enter it for the lifetime of the
/// connection's tasks so that every log line carries the peer address.
pub fn connection_span(peer: SocketAddr) -> tracing::Span {
    tracing::info_span!("h2_connection", %peer)
}

/// Returns a span scoped to one stream, nested under the connection's span.
pub fn stream_span(stream_id: u64) -> tracing::Span {
    tracing::info_span!("h2_stream", stream = stream_id)
}
