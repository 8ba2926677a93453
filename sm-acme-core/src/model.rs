//! On-disk record types.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{AcmeError, Result};
use crate::jwk::Jwk;

/// `installation.json`. Absence means "unconfigured".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Installation {
    pub email: String,
    pub secret: String,
    pub subdomain: String,
    /// The splintermail API token. Kept as a string: the wire format (a
    /// bare JSON integer in the original C test fixtures) is the concern of
    /// the splintermail API client, not this manager.
    pub token: String,
}

impl Installation {
    /// `<subdomain>.user.splintermail.com`.
    pub fn fulldomain(&self) -> String {
        format!("{}.user.splintermail.com", self.subdomain)
    }
}

/// `account.json`: the ACME account key (with its private scalar), the
/// account's `kid` URL, and its `orders` collection URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcmeAccountRecord {
    pub key: Jwk,
    pub kid: String,
    pub orders: String,
}

/// `jwk.json`: the public half of the account key, persisted separately so
/// startup can pass a thumbprint to `new_account` without first loading (and
/// potentially failing to parse) the full account record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwkRecord {
    #[serde(flatten)]
    pub jwk: Jwk,
}

/// Parsed metadata of an on-disk `(key.pem, cert.pem)` pair, used to decide
/// whether invariant 1 holds and when the certificate needs renewal.
#[derive(Debug, Clone)]
pub struct CertPairInfo {
    pub not_after: i64,
    pub common_name: String,
}

impl CertPairInfo {
    /// `min(notAfter - 15 days, notAfter)`. The `min`
    /// guards against a certificate whose validity window is itself shorter
    /// than 15 days.
    pub fn renewal_deadline(&self) -> i64 {
        const RENEW_BEFORE: i64 = 15 * 24 * 60 * 60;
        std::cmp::min(self.not_after - RENEW_BEFORE, self.not_after)
    }

    pub fn is_valid_for(&self, fulldomain: &str, now: i64) -> bool {
        self.not_after > now && self.common_name == fulldomain
    }
}

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

pub fn parse_cert_pair(key_pem: &str, cert_pem: &str) -> Result<CertPairInfo> {
    use x509_parser::prelude::*;

    // Confirm the key at least parses; the actual pubkey-match check
    // compares SubjectPublicKeyInfo bytes below.
    let key_pair = rcgen::KeyPair::from_pem(key_pem)
        .map_err(|e| AcmeError::Configuration(format!("invalid key.pem: {e}")))?;

    let pem_block = ::pem::parse(cert_pem.as_bytes())
        .map_err(|e| AcmeError::Configuration(format!("invalid cert.pem: {e}")))?;

    let (_, cert) = X509Certificate::from_der(pem_block.contents())
        .map_err(|e| AcmeError::Configuration(format!("invalid cert.pem: {e}")))?;

    let cert_spki = cert.public_key().raw.to_vec();
    let key_spki = key_pair.public_key_der();
    if cert_spki != key_spki.as_ref() {
        return Err(AcmeError::Configuration(
            "cert.pem public key does not match key.pem".into(),
        ));
    }

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(|s| s.to_string())
        .ok_or_else(|| AcmeError::Configuration("cert.pem has no CN".into()))?;

    Ok(CertPairInfo {
        not_after: cert.validity().not_after.timestamp(),
        common_name,
    })
}
