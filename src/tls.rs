//! TLS configuration and the ALPN/version checks that gate HTTP/2 use.
//!
//! Deliberately narrow: no SNI-keyed certificate resolver, no client-cert
//! verification, and only the `h2` ALPN token is ever offered.

use std::sync::Arc;

use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::server::ServerConfig;
use tokio_rustls::rustls::ProtocolVersion;
use tokio_rustls::TlsAcceptor;

use crate::error::{Error, Result};

/// The only protocol this server ever offers during ALPN negotiation.
const ALPN_H2: &[u8] = b"h2";

/// A PEM-encoded certificate chain and private key, and the resulting TLS
/// acceptor.
#[derive(Clone)]
pub struct ServerTlsConfig {
    acceptor: TlsAcceptor,
}

/// Installs `ring` as the process-wide default `rustls` crypto provider, if
/// one hasn't been installed already. `rustls` 0.23 requires this before any
/// `ClientConfig`/`ServerConfig` can be built, and panics otherwise; an
/// embedder that installs its own provider first (or links `aws-lc-rs`) wins,
/// so a failed install here is treated as success rather than propagated.
fn ensure_crypto_provider() {
    let _ = tokio_rustls::rustls::crypto::ring::default_provider().install_default();
}

impl ServerTlsConfig {
    /// Builds a TLS acceptor from a PEM certificate chain and a PEM private
    /// key, offering only `h2` via ALPN.
    pub fn from_pem(cert_chain: &[u8], private_key: &[u8]) -> Result<Self> {
        ensure_crypto_provider();
        let certs = parse_cert_chain(cert_chain)?;
        let key = parse_private_key(private_key)?;

        let mut config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| Error::InvalidTlsSetup(format!("invalid certificate/key: {e}")))?;
        config.alpn_protocols = vec![ALPN_H2.to_vec()];

        Ok(Self {
            acceptor: TlsAcceptor::from(Arc::new(config)),
        })
    }

    /// Builds a `ServerTlsConfig` directly from an already-constructed
    /// `rustls::ServerConfig`, for embedders with more elaborate certificate
    /// resolution needs. The `h2` ALPN protocol is forced regardless of
    /// whatever `config.alpn_protocols` already contained.
    pub fn from_rustls_config(mut config: ServerConfig) -> Self {
        ensure_crypto_provider();
        config.alpn_protocols = vec![ALPN_H2.to_vec()];
        Self {
            acceptor: TlsAcceptor::from(Arc::new(config)),
        }
    }

    pub(crate) fn acceptor(&self) -> &TlsAcceptor {
        &self.acceptor
    }
}

fn parse_cert_chain(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    rustls_pemfile::certs(&mut &*pem)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::InvalidTlsSetup(format!("invalid certificate PEM: {e}")))
}

fn parse_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut &*pem)
        .map_err(|e| Error::InvalidTlsSetup(format!("invalid private key PEM: {e}")))?
        .ok_or_else(|| Error::InvalidTlsSetup("no private key found in PEM input".into()))
}

/// Validates the ALPN protocol and TLS version negotiated on an accepted
/// connection. Only ALPN `h2` and TLS 1.2 or 1.3 are acceptable; anything
/// else is a connection-level failure, logged and surfaced before the
/// connection is dropped.
pub(crate) fn validate_negotiated<T>(stream: &tokio_rustls::server::TlsStream<T>) -> Result<()> {
    let (_, connection) = stream.get_ref();

    match connection.alpn_protocol() {
        Some(proto) if proto == ALPN_H2 => {}
        Some(other) => {
            return Err(Error::InvalidTlsSetup(format!(
                "Invalid protocol selected: {}",
                String::from_utf8_lossy(other)
            )))
        }
        None => {
            return Err(Error::InvalidTlsSetup(
                "No ALPN protocol negotiated".to_string(),
            ))
        }
    }

    match connection.protocol_version() {
        Some(ProtocolVersion::TLSv1_2) | Some(ProtocolVersion::TLSv1_3) => Ok(()),
        Some(other) => Err(Error::InvalidTlsSetup(format!(
            "unsupported TLS version negotiated: {other:?}"
        ))),
        None => Err(Error::InvalidTlsSetup(
            "TLS version not yet negotiated".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_key_without_matching_pem_blocks() {
        let err = parse_private_key(b"not a pem file").unwrap_err();
        assert!(matches!(err, Error::InvalidTlsSetup(_)));
    }

    #[test]
    fn rejects_empty_certificate_chain_bytes() {
        let chain = parse_cert_chain(b"").unwrap();
        assert!(chain.is_empty());
    }
}
