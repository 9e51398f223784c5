//! A façade over the HTTP/2 protocol engine.
//!
//! A sans-IO engine would expose `receive_data`/`data_to_send` calls behind a
//! mutex/condvar guard serializing access to the protocol state. `h2`'s
//! actual public API is task-based rather than sans-IO: a single task drives
//! [`h2::server::Connection::accept`], which both reads frames off the wire
//! and opportunistically flushes queued writes, and each accepted stream
//! hands out an exclusively-owned `SendStream`/`RecvStream` pair that is
//! already safe to drive from its own task without extra locking.
//!
//! That means a separate mutex/condvar wrapper around the protocol state has
//! no work left to do once `h2` is doing the synchronizing — see
//! `DESIGN.md` ("Engine adaptation") for the full reasoning. `Engine` is kept
//! as a named type anyway: it is the one place that owns the `h2` connection,
//! performs the handshake, and hosts the header/trailer conversions shared by
//! [`crate::stream`] and [`crate::response`].

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Error, Result};
use crate::request::Header;
use crate::settings::Http2Settings;

/// A request as handed to us by the engine: headers plus an unconsumed body.
pub type IncomingRequest = http::Request<h2::RecvStream>;

/// One accepted stream: the incoming request and the handle used to answer it.
pub type Accepted = (IncomingRequest, h2::server::SendResponse<Bytes>);

/// Owns the `h2` server connection for one TLS transport.
pub struct Engine<T> {
    conn: h2::server::Connection<T, Bytes>,
}

impl<T> Engine<T>
where
    T: AsyncRead + AsyncWrite + Unpin + 'static,
{
    /// Performs the HTTP/2 connection preface and initial SETTINGS exchange,
    /// merging `settings` into the engine's defaults first.
    pub async fn handshake(io: T, settings: &Http2Settings) -> Result<Self> {
        let mut builder = h2::server::Builder::new();
        settings.apply(&mut builder);
        let conn = builder.handshake(io).await?;
        Ok(Self { conn })
    }

    /// Waits for the next stream the peer opens, or `None` once the peer has
    /// cleanly closed the connection. An `Err` is a protocol-level failure:
    /// the caller should log it, consider the connection dead, and stop
    /// calling `accept`.
    pub async fn accept(&mut self) -> Option<std::result::Result<Accepted, h2::Error>> {
        self.conn.accept().await
    }

    /// Stops accepting new streams and asks the peer to wind down existing
    /// ones; used for explicit `Server::stop` and normal teardown.
    pub fn graceful_shutdown(&mut self) {
        self.conn.graceful_shutdown();
    }
}

/// Reconstructs the ordered header list the application sees, synthesizing
/// the `:method`/`:path`/`:authority`/`:scheme` pseudo-headers that `h2`'s
/// typed `http::Request` splits out into dedicated fields.
pub fn headers_from_request(req: &IncomingRequest) -> Vec<Header> {
    let mut out = Vec::with_capacity(4 + req.headers().len());

    out.push(Header::new(":method", req.method().as_str().to_owned()));

    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| "/".to_owned());
    out.push(Header::new(":path", path));

    if let Some(authority) = req.uri().authority() {
        out.push(Header::new(":authority", authority.as_str().to_owned()));
    }

    out.push(Header::new(
        ":scheme",
        req.uri().scheme_str().unwrap_or("https").to_owned(),
    ));

    for (name, value) in req.headers() {
        out.push(Header::new(name.as_str().to_owned(), value.as_bytes().to_vec()));
    }

    out
}

/// Builds the `http::Response<()>` that `SendResponse::send_response` wants,
/// from a status code and a flat `(name, value)` header list. Any
/// `:status`-style pseudo-header in `headers` is ignored: the status code
/// argument is authoritative.
pub fn response_from_status(status: u16, headers: &[Header]) -> Result<http::Response<()>> {
    let status = http::StatusCode::from_u16(status)
        .map_err(|e| Error::Application(Box::new(e)))?;
    let mut builder = http::Response::builder().status(status);

    if let Some(map) = builder.headers_mut() {
        for header in headers {
            if header.name.starts_with(b":") {
                continue;
            }
            append_header(map, header)?;
        }
    }

    builder.body(()).map_err(|e| Error::Application(Box::new(e)))
}

/// Builds an `http::HeaderMap` from a flat header list, for use with
/// `SendStream::send_trailers`.
pub fn header_map(headers: &[Header]) -> Result<http::HeaderMap> {
    let mut map = http::HeaderMap::new();
    for header in headers {
        append_header(&mut map, header)?;
    }
    Ok(map)
}

fn append_header(map: &mut http::HeaderMap, header: &Header) -> Result<()> {
    let name = http::HeaderName::from_bytes(&header.name).map_err(|e| Error::Application(Box::new(e)))?;
    let value = http::HeaderValue::from_bytes(&header.value).map_err(|e| Error::Application(Box::new(e)))?;
    map.append(name, value);
    Ok(())
}
