//! Binds a listening socket and runs the accept loop: one [`ConnectionHandler`]
//! per accepted TCP connection, until [`Server::stop`] is called.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::connection::ConnectionHandler;
use crate::error::{Error, Result};
use crate::events::{EventPublisher, ServerEvent};
use crate::settings::Http2Settings;
use crate::stream::AppHandler;
use crate::tls::ServerTlsConfig;

/// A running server. Dropping this does not stop the server — call
/// [`Server::stop`] (and optionally [`Server::wait`]) explicitly.
pub struct Server {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    accept_loop: tokio::task::JoinHandle<()>,
}

impl Server {
    /// The address the listening socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The bound port, if the server is listening on a loopback address.
    pub fn localhost_port(&self) -> Result<u16> {
        if self.local_addr.ip().is_loopback() {
            Ok(self.local_addr.port())
        } else {
            Err(Error::InvalidTlsSetup(format!(
                "server is not bound to localhost (bound to {})",
                self.local_addr
            )))
        }
    }

    /// Stops accepting new connections and asks every open connection to
    /// wind down gracefully (via `h2` `GOAWAY`). Returns immediately;
    /// call [`Server::wait`] to await full shutdown.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Waits for the accept loop and every spawned connection to finish.
    /// Typically called after [`Server::stop`].
    pub async fn wait(self) {
        let _ = self.accept_loop.await;
    }
}

/// Starts serving HTTP/2 connections on `addr` with `handler` answering
/// every request. `events`, if given, receives best-effort
/// [`ServerEvent`]s for observability.
pub async fn serve<H: AppHandler>(
    handler: H,
    addr: impl ToSocketAddrs,
    tls: ServerTlsConfig,
    settings: Http2Settings,
    events: Option<tokio::sync::mpsc::Sender<ServerEvent>>,
) -> Result<Server> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;

    let connection_handler = Arc::new(ConnectionHandler::new(
        Arc::new(handler),
        tls,
        settings,
        EventPublisher::new(events),
    ));

    let cancel = CancellationToken::new();
    let accept_loop = tokio::spawn(accept_loop(listener, connection_handler, cancel.clone()));

    Ok(Server {
        local_addr,
        cancel,
        accept_loop,
    })
}

async fn accept_loop<H: AppHandler>(
    listener: TcpListener,
    handler: Arc<ConnectionHandler<H>>,
    cancel: CancellationToken,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer)) => {
                        let handler = handler.clone();
                        let conn_cancel = cancel.child_token();
                        connections.spawn(async move { handler.run(socket, peer, conn_cancel).await });
                    }
                    Err(error) => tracing::warn!(%error, "failed to accept a connection"),
                }
            }
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                log_panic(joined);
            }
        }
    }

    while let Some(joined) = connections.join_next().await {
        log_panic(joined);
    }
}

fn log_panic(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!(error = %e, "connection task panicked");
        }
    }
}
