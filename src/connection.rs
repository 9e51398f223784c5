//! Owns one accepted TCP connection end to end: the TLS handshake and
//! ALPN/version validation, the HTTP/2 preface, the accept loop that hands
//! each new stream off to its own task, and graceful or abrupt teardown.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::events::{EventPublisher, ServerEvent};
use crate::log;
use crate::settings::Http2Settings;
use crate::stream::{self, AppHandler};
use crate::tls::{self, ServerTlsConfig};

/// Drives one TCP connection. Cheap to clone: everything it owns is shared
/// (`Arc`) or `Clone` (the TLS acceptor, the settings, the event publisher).
pub(crate) struct ConnectionHandler<H> {
    handler: Arc<H>,
    tls: ServerTlsConfig,
    settings: Http2Settings,
    events: EventPublisher,
}

impl<H: AppHandler> ConnectionHandler<H> {
    pub(crate) fn new(
        handler: Arc<H>,
        tls: ServerTlsConfig,
        settings: Http2Settings,
        events: EventPublisher,
    ) -> Self {
        Self {
            handler,
            tls,
            settings,
            events,
        }
    }

    /// Runs the connection to completion. Never propagates an error to the
    /// caller: failures are logged and, if an event sink is configured,
    /// published as a [`ServerEvent::ConnectionError`].
    pub(crate) async fn run(&self, socket: TcpStream, peer: SocketAddr, cancel: CancellationToken) {
        let span = log::connection_span(peer);
        let _entered = span.enter();

        if let Err(error) = self.run_inner(socket, peer, cancel).await {
            tracing::warn!(%error, "connection closed with an error");
            self.events.publish(ServerEvent::ConnectionError {
                peer,
                error: Box::new(error),
            });
        }
    }

    async fn run_inner(&self, socket: TcpStream, peer: SocketAddr, cancel: CancellationToken) -> Result<()> {
        let _ = socket.set_nodelay(true);

        let tls_stream = self
            .tls
            .acceptor()
            .accept(socket)
            .await
            .map_err(Error::Tls)?;
        tls::validate_negotiated(&tls_stream)?;

        let mut engine = Engine::handshake(tls_stream, &self.settings).await?;
        let mut streams = JoinSet::new();

        let result = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("connection cancelled, shutting down gracefully");
                    engine.graceful_shutdown();
                    // Keep accepting until the peer winds its streams down
                    // and the connection naturally ends; fall through to
                    // the normal accept loop rather than breaking here.
                    break drain(&mut engine, &mut streams).await;
                }
                accepted = engine.accept() => {
                    match accepted {
                        None => break Ok(()),
                        Some(Err(e)) => break Err(Error::Protocol(e)),
                        Some(Ok(accepted)) => {
                            let handler = self.handler.clone();
                            let events = self.events.clone();
                            let stream_cancel = cancel.child_token();
                            streams.spawn(stream::run(accepted, handler, events, peer, stream_cancel));
                        }
                    }
                }
                Some(joined) = streams.join_next(), if !streams.is_empty() => {
                    log_join_result(joined);
                }
            }
        };

        while let Some(joined) = streams.join_next().await {
            log_join_result(joined);
        }

        result
    }
}

/// After `graceful_shutdown()`, the peer may still have streams in flight;
/// keep accepting (no *new* streams will arrive, but `h2` still needs to be
/// polled to drive already-open ones and observe the final `GOAWAY`) until
/// the engine reports the connection is done.
async fn drain<T>(engine: &mut Engine<T>, streams: &mut JoinSet<()>) -> Result<()>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + 'static,
{
    loop {
        tokio::select! {
            accepted = engine.accept() => {
                match accepted {
                    None => return Ok(()),
                    Some(Err(e)) => return Err(Error::Protocol(e)),
                    // A well-behaved peer opens no new streams after GOAWAY;
                    // if it does anyway, `h2` itself is the authority on
                    // whether that's permitted, so just let it through.
                    Some(Ok(_)) => {}
                }
            }
            Some(joined) = streams.join_next(), if !streams.is_empty() => {
                log_join_result(joined);
            }
        }
    }
}

fn log_join_result(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!(error = %e, "stream task panicked");
        }
    }
}
