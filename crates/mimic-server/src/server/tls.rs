//! TLS listener support for the mock server.

use rustls::pki_types::CertificateDer;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

/// Create a TLS acceptor from PEM certificate and key files.
pub fn create_tls_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, anyhow::Error> {
    let cert_file = std::fs::File::open(cert_path).map_err(|e| {
        anyhow::anyhow!(
            "failed to open certificate file '{}': {e}",
            cert_path.display()
        )
    })?;
    let mut cert_reader = std::io::BufReader::new(cert_file);
    let certs: Vec<CertificateDer> = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<_, _>>()
        .map_err(|e| anyhow::anyhow!("failed to parse certificate file: {e}"))?;

    if certs.is_empty() {
        anyhow::bail!(
            "no certificates found in certificate file: {}",
            cert_path.display()
        );
    }

    let key_file = std::fs::File::open(key_path).map_err(|e| {
        anyhow::anyhow!(
            "failed to open private key file '{}': {e}",
            key_path.display()
        )
    })?;
    let mut key_reader = std::io::BufReader::new(key_file);

    let key = rustls_pemfile::private_key(&mut key_reader)
        .map_err(|e| anyhow::anyhow!("failed to parse private key file: {e}"))?
        .ok_or_else(|| {
            anyhow::anyhow!("no private key found in key file: {}", key_path.display())
        })?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| anyhow::anyhow!("failed to build TLS configuration: {e}"))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}
