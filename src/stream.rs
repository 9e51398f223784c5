//! Drives one accepted HTTP/2 stream: pumps request body data and trailers
//! into the channels the application reads from, runs the application
//! handler, and makes sure the stream is left in a terminal state no matter
//! how the handler returns.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::engine::{self, Accepted};
use crate::error::Result;
use crate::events::{EventPublisher, ServerEvent};
use crate::request::{self, AckSignal, DataChunk, Request};
use crate::response::ResponseWriter;

/// Implemented by embedders to answer one request. Handed an owned
/// [`Request`] and an exclusive [`ResponseWriter`] for the matching
/// response. Each stream already runs on its own task (spawned by the
/// connection handler), so a panic here is caught there via `JoinHandle`
/// rather than taking the connection down with it.
#[async_trait::async_trait]
pub trait AppHandler: Send + Sync + 'static {
    /// Answers one request. Returning `Err` is logged, published as a
    /// [`ServerEvent::StreamError`], and confined to this stream: the caller
    /// resets it with `INTERNAL_ERROR` rather than trying to close it
    /// gracefully.
    async fn handle(&self, request: Request, response: &mut ResponseWriter) -> Result<()>;
}

/// How long a response write may wait for the peer's flow-control window to
/// grow before the stream is abandoned.
pub(crate) const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Runs one stream end to end: request plumbing, the application handler,
/// and response teardown. `peer` and `events` are used only for logging and
/// observability; the handler itself never sees them.
pub(crate) async fn run<H: AppHandler>(
    accepted: Accepted,
    handler: std::sync::Arc<H>,
    events: EventPublisher,
    peer: std::net::SocketAddr,
    connection_cancel: CancellationToken,
) {
    let (incoming, respond) = accepted;
    let stream_id = u32::from(respond.stream_id()) as u64;
    let span = crate::log::stream_span(stream_id);
    let _entered = span.enter();

    let stream_cancel = connection_cancel.child_token();
    let headers = engine::headers_from_request(&incoming);
    let recv_body = incoming.into_body();

    let (body_tx, body_rx) = request::body_channel();
    let (trailers_tx, trailers_rx) = request::trailers_channel();

    let pump = tokio::spawn(pump_body(recv_body, body_tx, trailers_tx, stream_cancel.clone()));

    let request = Request {
        headers,
        body: body_rx,
        trailers: trailers_rx,
    };
    let mut response = ResponseWriter::spawn(respond, DEFAULT_SEND_TIMEOUT, stream_cancel.clone());

    let outcome = tokio::select! {
        biased;
        _ = stream_cancel.cancelled() => HandlerOutcome::Cancelled,
        result = handler.handle(request, &mut response) => HandlerOutcome::Finished(result),
    };

    pump.abort();

    match outcome {
        HandlerOutcome::Finished(Ok(())) => {
            if let Err(e) = response.end().await {
                tracing::debug!(error = %e, "failed to close response stream, resetting it instead");
                if let Err(e) = response.reset(h2::Reason::INTERNAL_ERROR).await {
                    tracing::debug!(error = %e, "failed to reset stream after a failed close");
                }
            }
        }
        HandlerOutcome::Finished(Err(e)) => {
            tracing::warn!(error = %e, "application handler returned an error");
            events.publish(ServerEvent::StreamError {
                peer,
                stream_id,
                error: Box::new(e),
            });
            if let Err(e) = response.reset(h2::Reason::INTERNAL_ERROR).await {
                tracing::debug!(error = %e, "failed to reset stream after handler error");
            }
        }
        HandlerOutcome::Cancelled => {
            tracing::debug!("stream cancelled");
        }
    }
}

enum HandlerOutcome {
    Finished(Result<()>),
    Cancelled,
}

/// Reads `DATA` frames off `recv_body`, handing each one to the application
/// via `body_tx` and deferring flow-control credit until the application (or
/// the stream handler, on early close) acknowledges it. Once the body is
/// exhausted, reads and forwards any trailers, then drops both senders so
/// the application's receivers observe end-of-stream.
async fn pump_body(
    mut recv_body: h2::RecvStream,
    body_tx: crate::channel::NotifyingSender<DataChunk>,
    trailers_tx: tokio::sync::mpsc::UnboundedSender<crate::request::Header>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = recv_body.data() => next,
        };
        let chunk = match next {
            None => break,
            Some(Err(e)) => {
                tracing::debug!(error = %e, "error reading request body");
                break;
            }
            Some(Ok(bytes)) => bytes,
        };

        let len = chunk.len();
        let (ack, ack_rx) = AckSignal::new();
        if body_tx
            .send(DataChunk { data: chunk, ack }, None)
            .await
            .is_err()
        {
            // Nobody is reading the body anymore; credit this chunk back
            // immediately and stop pumping.
            let _ = recv_body.flow_control().release_capacity(len);
            break;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = recv_body.flow_control().release_capacity(len);
                break;
            }
            result = ack_rx => {
                if result.is_ok() {
                    let _ = recv_body.flow_control().release_capacity(len);
                }
            }
        }
    }

    if let Ok(Some(trailers)) = recv_body.trailers().await {
        for (name, value) in trailers.iter() {
            let header = crate::request::Header::new(name.as_str().to_owned(), value.as_bytes().to_vec());
            if trailers_tx.send(header).is_err() {
                break;
            }
        }
    }
}
