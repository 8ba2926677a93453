//! JSON Web Key representation and RFC 7638 thumbprinting.
//!
//! Only the EC P-256 key type is supported, matching the account keys this
//! manager generates for itself.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AcmeError, Result};

/// An EC P-256 JSON Web Key. `d` (the private scalar) is present only for
/// the account's own persisted key (`account.json`); it is stripped before
/// the key is written to `jwk.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    pub crv: String,
    pub kty: String,
    pub x: String,
    pub y: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
}

impl Jwk {
    pub fn public(&self) -> Jwk {
        Jwk {
            crv: self.crv.clone(),
            kty: self.kty.clone(),
            x: self.x.clone(),
            y: self.y.clone(),
            d: None,
        }
    }

    /// RFC 7638 thumbprint: base64url(SHA-256(canonical JSON of the public
    /// members)), canonical meaning lexicographically-ordered keys and no
    /// insignificant whitespace. `BTreeMap` gives us that ordering for free
    /// since `crv` < `kty` < `x` < `y` alphabetically.
    pub fn thumbprint(&self) -> Result<String> {
        let mut members: BTreeMap<&'static str, &str> = BTreeMap::new();
        members.insert("crv", &self.crv);
        members.insert("kty", &self.kty);
        members.insert("x", &self.x);
        members.insert("y", &self.y);

        let canonical = serde_json::to_string(&members)
            .map_err(|e| AcmeError::Protocol(format!("jwk canonicalization failed: {e}")))?;

        let digest = Sha256::digest(canonical.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(digest))
    }
}

/// Computes the DNS-01 key authorization / proof string:
/// `base64url(SHA256(token || "." || thumbprint))`.
///
/// This is the value published in the DNS-01 TXT record.
pub fn dns01_proof(token: &str, thumbprint: &str) -> String {
    let key_authorization = format!("{token}.{thumbprint}");
    let digest = Sha256::digest(key_authorization.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}
