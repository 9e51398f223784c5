//! Error types shared across the connection, stream, and response layers.

use std::fmt::{self, Debug, Formatter};
use std::io::Error as IoError;

/// A boxed error type used for opaque failures, such as application handler
/// panics or panics caught while joining a task.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// The error type returned by fallible Turnstile operations.
#[derive(thiserror::Error)]
pub enum Error {
    /// The underlying transport (TCP socket) failed.
    #[error("transport I/O error: {0}")]
    Io(#[from] IoError),

    /// The TLS handshake failed, or failed to agree on a usable configuration.
    #[error("TLS handshake failed: {0}")]
    Tls(IoError),

    /// The negotiated ALPN protocol or TLS version is not acceptable for HTTP/2.
    #[error("{0}")]
    InvalidTlsSetup(String),

    /// The HTTP/2 engine (`h2`) reported a protocol-level error.
    #[error("HTTP/2 protocol error: {0}")]
    Protocol(#[from] h2::Error),

    /// The application handler returned an error or panicked.
    #[error("application handler failed: {0}")]
    Application(BoxedError),

    /// A send to the peer did not complete within the outgoing-send timeout.
    #[error("timed out writing to peer after {0:?}")]
    SendTimeout(std::time::Duration),

    /// The response writer (or an internal caller) invoked an operation out
    /// of the order a response must follow (for example, writing a body
    /// before headers). A sans-IO engine would reject this with a protocol
    /// error; since our calls into `h2` require already holding the relevant
    /// handle, misuse is caught here instead.
    #[error("response writer used out of order: {0}")]
    WriterMisuse(&'static str),

    /// The connection or stream was cancelled (shutdown requested, peer reset, ...).
    #[error("cancelled")]
    Cancelled,
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // thiserror's Display is informative enough; avoid deriving a second,
        // noisier representation.
        write!(f, "{self}")
    }
}

/// A convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
