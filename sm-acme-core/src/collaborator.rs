//! The `AcmeCollaborator` trait: one async method per external network or
//! filesystem operation this manager depends on.
//!
//! Callback-style `*_done` completions become plain
//! `async fn ... -> Result<T, AcmeError>` returns: awaiting a future already
//! is the suspension point a callback-based design would need an explicit
//! re-entrant dispatcher to express.

use std::path::Path;

use async_trait::async_trait;
use rcgen::KeyPair;

use crate::error::Result;
use crate::jwk::Jwk;

/// The outer status of an ACME order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Ready,
    Processing,
    Valid,
    Invalid,
    Revoked,
    Deactivated,
    Expired,
}

/// The status of a single challenge within an authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeStatus {
    Pending,
    Processing,
    Valid,
    Invalid,
}

/// The account handle returned by `new_account`: the caller-supplied key is
/// handed back only on success; on failure the caller keeps it.
#[derive(Debug, Clone)]
pub struct AcmeAccount {
    pub key: Jwk,
    pub kid: String,
    pub orders: String,
}

#[derive(Debug, Clone)]
pub struct NewOrderResult {
    pub order: String,
    pub expires: String,
    pub authz: String,
    pub finalize: String,
}

#[derive(Debug, Clone)]
pub struct GetOrderResult {
    pub status: OrderStatus,
    pub domain: String,
    pub expires: String,
    pub authz: String,
    pub finalize: String,
    /// Populated only when `status == Valid`.
    pub certurl: Option<String>,
    /// Populated only when `status == Processing`.
    pub retry_after: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct AuthzResult {
    /// The outer authorization status (distinct from the DNS-01 challenge's
    /// own status).
    pub outer_status: ChallengeStatus,
    pub challenge_status: ChallengeStatus,
    pub domain: String,
    pub expires: String,
    /// The DNS-01 challenge URL, used by `challenge`/`challenge_finish`.
    pub challenge: String,
    pub token: String,
    pub retry_after: Option<i64>,
}

/// A just-issued certificate, PEM-encoded.
#[derive(Debug, Clone)]
pub struct IssuedCert {
    pub cert_pem: String,
}

/// One async method per collaborator operation. `now()` stays
/// synchronous since it is non-blocking wall-clock access; everything else
/// models a round trip (network or off-thread CPU work).
#[async_trait]
pub trait AcmeCollaborator: Send + Sync {
    fn now(&self) -> i64;

    // -- splintermail provisioning API --

    /// Publishes the DNS-01 proof. Returns `Ok(())` on
    /// `{status:"success", contents:{result:"ok"}}`,
    /// `Err(AcmeError::PrepareTimeout)` on `{result:"timeout"}` (retried
    /// immediately, no backoff), and any other error for
    /// every other response (fatal-per-attempt, backoff + restart).
    async fn prepare(&self, token: &str, proof: &str) -> Result<()>;

    /// Tears down the previously-published DNS-01 record.
    async fn unprepare(&self, token: &str) -> Result<()>;

    // -- off-thread key generation --

    /// Generates a fresh keypair and writes it to `path` (always
    /// `<working_dir>/keynew.pem`), returning the in-memory keypair so the
    /// state machine can use it for `finalize` without re-reading the file.
    async fn keygen(&self, path: &Path) -> Result<KeyPair>;

    // -- ACME account & order lifecycle --

    /// `key_thumb` lets the server short-circuit when the account is likely
    /// already registered. On success the manager takes
    /// ownership of `key`; on error the manager keeps it for a later retry.
    async fn new_account(
        &self,
        key: &Jwk,
        email: &str,
        key_thumb: Option<&str>,
    ) -> Result<AcmeAccount>;

    async fn new_order(&self, acct: &AcmeAccount, domain: &str) -> Result<NewOrderResult>;

    async fn get_order(&self, acct: &AcmeAccount, order: &str) -> Result<GetOrderResult>;

    async fn list_orders(&self, acct: &AcmeAccount) -> Result<Vec<String>>;

    async fn get_authz(&self, acct: &AcmeAccount, authz: &str) -> Result<AuthzResult>;

    async fn challenge(&self, acct: &AcmeAccount, authz: &str, challenge: &str) -> Result<()>;

    async fn challenge_finish(
        &self,
        acct: &AcmeAccount,
        authz: &str,
        retry_after: i64,
    ) -> Result<()>;

    /// Submits the CSR built from `pkey`. On success the manager takes
    /// ownership of `pkey` (it becomes the new `key.pem`); on error the
    /// manager keeps it.
    async fn finalize(
        &self,
        acct: &AcmeAccount,
        order: &str,
        finalize: &str,
        domain: &str,
        pkey: &KeyPair,
    ) -> Result<IssuedCert>;

    async fn finalize_from_processing(
        &self,
        acct: &AcmeAccount,
        order: &str,
        retry_after: i64,
    ) -> Result<IssuedCert>;

    async fn finalize_from_valid(&self, acct: &AcmeAccount, certurl: &str) -> Result<IssuedCert>;
}
