//! Turnstile is an HTTP/2 server runtime: the connection and stream
//! concurrency fabric that sits between the wire protocol (handled by
//! [`h2`]) and your application.
//!
//! The crate's job is narrow on purpose. It drives one `h2` connection per
//! accepted TLS transport, gives each stream its own task with a
//! backpressured request body and a flow-control-aware response writer, and
//! isolates application failures to the stream that caused them. It does
//! not route requests, parse paths, or manage sessions; an [`AppHandler`]
//! implementation is expected to do that on top.
//!
//! # Feature flags
//!
//! | Feature | Description | Default? |
//! | --- | --- | :---: |
//! | `rustls` | TLS built on [`rustls`](https://crates.io/crates/rustls), via [`tokio_rustls`] | ✔️ |
//!
//! Without the `rustls` feature, [`tls::ServerTlsConfig`] is unavailable;
//! embedders can still drive [`Engine`] directly over any
//! `AsyncRead + AsyncWrite` transport that has already completed its own
//! TLS handshake and ALPN negotiation.

mod channel;
#[cfg(feature = "rustls")]
mod connection;
pub mod engine;
pub mod error;
mod events;
mod log;
pub mod request;
pub mod response;
#[cfg(feature = "rustls")]
pub mod server;
pub mod settings;
mod stream;
#[cfg(feature = "rustls")]
pub mod tls;

pub use crate::error::{BoxedError, Error, Result};
pub use crate::events::ServerEvent;
pub use crate::request::{AckSignal, BodyReceiver, DataChunk, Header, Request, TrailersReceiver};
pub use crate::response::ResponseWriter;
#[cfg(feature = "rustls")]
pub use crate::server::{serve, Server};
pub use crate::settings::Http2Settings;
pub use crate::stream::AppHandler;

/// Commonly used types, re-exported for a single `use turnstile::prelude::*`.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::request::{DataChunk, Header, Request};
    pub use crate::response::ResponseWriter;
    #[cfg(feature = "rustls")]
    pub use crate::server::{serve, Server};
    pub use crate::settings::Http2Settings;
    pub use crate::stream::AppHandler;
    #[cfg(feature = "rustls")]
    pub use crate::tls::ServerTlsConfig;
    pub use async_trait::async_trait;
}
