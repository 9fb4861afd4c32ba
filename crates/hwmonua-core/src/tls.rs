//! TLS acceptor construction for the secured endpoint.
//!
//! Certificates and keys may be given as PEM or DER. Every certificate in
//! the trust list becomes a root for client-certificate verification.

use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use tokio_rustls::TlsAcceptor;

use crate::error::{Result, ServerError};

fn is_pem(bytes: &[u8]) -> bool {
    bytes.trim_ascii_start().starts_with(b"-----BEGIN")
}

fn parse_certificates(bytes: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    if !is_pem(bytes) {
        return Ok(vec![CertificateDer::from(bytes.to_vec())]);
    }

    let certs = rustls_pemfile::certs(&mut &bytes[..])
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Security(format!("unreadable PEM certificate: {}", e)))?;
    if certs.is_empty() {
        return Err(ServerError::Security("no certificate found in PEM data".to_string()));
    }
    Ok(certs)
}

fn parse_private_key(bytes: &[u8]) -> Result<PrivateKeyDer<'static>> {
    if !is_pem(bytes) {
        return Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(bytes.to_vec())));
    }

    rustls_pemfile::private_key(&mut &bytes[..])
        .map_err(|e| ServerError::Security(format!("unreadable PEM private key: {}", e)))?
        .ok_or_else(|| ServerError::Security("no private key found in PEM data".to_string()))
}

/// Build the acceptor for the secured endpoint.
pub(crate) fn build_acceptor(
    certificate: &[u8],
    private_key: &[u8],
    trust_list: &[Vec<u8>],
) -> Result<TlsAcceptor> {
    let certs = parse_certificates(certificate)?;
    let key = parse_private_key(private_key)?;

    let builder = rustls::ServerConfig::builder();
    let builder = if trust_list.is_empty() {
        builder.with_no_client_auth()
    } else {
        let mut roots = RootCertStore::empty();
        for entry in trust_list {
            for cert in parse_certificates(entry)? {
                roots
                    .add(cert)
                    .map_err(|e| ServerError::Security(format!("invalid trust list entry: {}", e)))?;
            }
        }
        tracing::info!("Client certificates verified against {} trusted roots", roots.len());

        let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| ServerError::Security(format!("client verifier: {}", e)))?;
        builder.with_client_cert_verifier(verifier)
    };

    let mut config = builder
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Security(format!("certificate/key mismatch: {}", e)))?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}
