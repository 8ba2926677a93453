//! Error taxonomy for the ACME certificate lifecycle manager.
//!
//! A small closed taxonomy instead of exposing raw collaborator error types:
//! callers (and the state machine itself) only ever need to know whether an
//! error is transient, fatal, or a cancellation.

use thiserror::Error;

/// Errors produced by the manager or its collaborators.
#[derive(Debug, Error)]
pub enum AcmeError {
    /// Produced by the manager itself while shutting down; never surfaced
    /// through `AcmeManager::run`'s result.
    #[error("operation canceled")]
    Canceled,

    /// Connection refused, timed out, or otherwise failed to reach the peer.
    #[error("connection error: {0}")]
    Conn(String),

    /// A socket-level failure distinct from a connection failure (e.g. a
    /// reset mid-request).
    #[error("socket error: {0}")]
    Sock(String),

    /// The peer responded, but the response was malformed or did not parse.
    #[error("malformed response: {0}")]
    Response(String),

    /// splintermail's `prepare` API reported `{result:"timeout"}` in-band.
    /// Retried immediately, without backoff.
    #[error("prepare timed out, retrying")]
    PrepareTimeout,

    /// Out of memory, disk full, or similar unrecoverable resource failure.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The ACME server returned a status or combination of fields the state
    /// machine has no valid transition for.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// `installation.json` is missing or malformed; treated as "unconfigured"
    /// and retried on a fixed poll, never surfaced as fatal.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AcmeError {
    /// Transient errors are caught locally by the state machine and
    /// converted into a backoff transition; everything else is fatal and
    /// propagates through the `Result` of `AcmeManager::run`.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AcmeError::Conn(_) | AcmeError::Sock(_) | AcmeError::Response(_)
        )
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, AcmeError::Canceled)
    }

    /// `installation.json` problems are never fatal: the configuration track
    /// simply keeps polling.
    pub fn is_configuration(&self) -> bool {
        matches!(self, AcmeError::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, AcmeError>;
