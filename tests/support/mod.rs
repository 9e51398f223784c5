//! Shared end-to-end test harness: a self-signed certificate and a running
//! `turnstile` server on an ephemeral loopback port, plus a TLS client
//! connector offering a chosen set of ALPN protocols.
//!
//! Grounded on `examples/salvo-rs-salvo`'s `crates/quinn/src/tests/mod.rs`
//! `Pair` fixture, which generates a self-signed certificate with `rcgen`
//! and trusts it directly in the client's root store rather than disabling
//! certificate verification.

use std::sync::Arc;
use std::sync::Once;

use rcgen::{generate_simple_self_signed, CertifiedKey};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName};
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use turnstile::prelude::*;

static INIT_CRYPTO: Once = Once::new();

fn ensure_crypto_provider() {
    INIT_CRYPTO.call_once(|| {
        let _ = tokio_rustls::rustls::crypto::ring::default_provider().install_default();
    });
}

/// A self-signed certificate for `localhost`, in both PEM (for the server)
/// and parsed DER (for the client's trust store) form.
pub struct TestCert {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
    pub cert_der: CertificateDer<'static>,
}

pub fn generate_cert() -> TestCert {
    ensure_crypto_provider();
    let CertifiedKey { cert, key_pair } = generate_simple_self_signed(vec!["localhost".to_string()])
        .expect("self-signed certificate generation");
    TestCert {
        cert_pem: cert.pem().into_bytes(),
        key_pem: key_pair.serialize_pem().into_bytes(),
        cert_der: cert.der().clone(),
    }
}

/// Starts a server bound to an ephemeral loopback port with `handler`
/// answering every request, returning it alongside the bound port.
pub async fn spawn_server<H: AppHandler>(handler: H, settings: Http2Settings, cert: &TestCert) -> (Server, u16) {
    let tls = ServerTlsConfig::from_pem(&cert.cert_pem, &cert.key_pem).expect("valid test certificate");
    let server = serve(handler, ("127.0.0.1", 0), tls, settings, None)
        .await
        .expect("server failed to bind");
    let port = server.localhost_port().expect("bound to loopback");
    (server, port)
}

/// Connects to `127.0.0.1:port` over TLS, trusting `cert` and offering
/// `alpn` as the client's ALPN protocol list (an empty slice offers none).
pub async fn tls_connect(port: u16, cert: &TestCert, alpn: &[&[u8]]) -> TlsStream<TcpStream> {
    ensure_crypto_provider();

    let mut roots = RootCertStore::empty();
    roots.add(cert.cert_der.clone()).expect("add root certificate");

    let mut config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();

    let connector = TlsConnector::from(Arc::new(config));
    let tcp = TcpStream::connect(("127.0.0.1", port)).await.expect("tcp connect");
    let name = ServerName::try_from("localhost").expect("valid server name");
    connector.connect(name, tcp).await.expect("tls handshake")
}
