//! An HTTP/2 server that echoes back the request body.
//!
//! Expects `localhost.pem` and `localhost-key.pem` (a certificate and
//! private key for `localhost`, PEM-encoded) in the current directory.
//!
//! After starting it up, try sending it data using:
//!
//!   curl --insecure https://localhost:<port> --http2-prior-knowledge -d "some data"
//!
//! The `--insecure` option is needed because the `localhost` certificate is
//! self-signed. The chosen `<port>` is printed on startup.

use turnstile::prelude::*;
use turnstile::{DataChunk, Header};

struct Echo;

#[async_trait::async_trait]
impl AppHandler for Echo {
    async fn handle(&self, mut request: Request, response: &mut ResponseWriter) -> Result<()> {
        // Trailers are not interesting to this app; discard them so the
        // request's internal plumbing doesn't block the stream handler
        // waiting on a read that will never come.
        drop(request.trailers);

        response.headers(200, Vec::<Header>::new(), false).await?;

        while let Some(DataChunk { data, ack }) = request.body.recv().await {
            response.body(data, false).await?;
            ack.ack();
        }

        response.end().await
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cert = std::fs::read("localhost.pem").expect("failed to read localhost.pem");
    let key = std::fs::read("localhost-key.pem").expect("failed to read localhost-key.pem");
    let tls = ServerTlsConfig::from_pem(&cert, &key).expect("invalid TLS certificate/key");

    let server = serve(
        Echo,
        ("localhost", 0),
        tls,
        Http2Settings::default(),
        None,
    )
    .await
    .expect("failed to bind");

    tracing::info!(port = server.localhost_port().unwrap(), "listening");

    tokio::signal::ctrl_c().await.ok();
    server.stop();
    server.wait().await;
}
