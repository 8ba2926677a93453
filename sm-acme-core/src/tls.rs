//! Builds the `rustls::ServerConfig` ("SSL_CTX" equivalent) handed out over
//! the `watch` channel, following the PEM-to-rustls conversion
//! `pingclair-tls::manager::TlsManager::convert_to_rustls` used.

use rustls::pki_types::CertificateDer;

use crate::error::{AcmeError, Result};

pub fn server_config_from_pair(key_pem: &str, cert_pem: &str) -> Result<rustls::ServerConfig> {
    let mut cert_reader = std::io::Cursor::new(cert_pem.as_bytes());
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_reader)
        .filter_map(|r| r.ok())
        .collect();
    if certs.is_empty() {
        return Err(AcmeError::Configuration("cert.pem has no certificates".into()));
    }

    let mut key_reader = std::io::Cursor::new(key_pem.as_bytes());
    let key = rustls_pemfile::private_key(&mut key_reader)
        .map_err(|e| AcmeError::Configuration(format!("invalid key.pem: {e}")))?
        .ok_or_else(|| AcmeError::Configuration("key.pem has no private key".into()))?;

    let signing_key = rustls::crypto::ring::sign::any_supported_type(&key)
        .map_err(|_| AcmeError::Configuration("unsupported private key type".into()))?;

    let resolver = rustls::sign::SingleCertAndKey::from(rustls::sign::CertifiedKey::new(certs, signing_key));

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_cert_resolver(std::sync::Arc::new(resolver));

    Ok(config)
}
