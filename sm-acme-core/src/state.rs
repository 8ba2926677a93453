//! State representation.
//!
//! `CertTrack` carries exactly the fields each state needs instead of one
//! flat struct with a dozen `Option<_>` fields that are only sometimes
//! meaningful — the same shape `pingclair-tls::auto_https` uses for its
//! cache/processing split, generalized here to the full order lifecycle.

use rcgen::KeyPair;

use crate::model::AcmeAccountRecord;

/// The primary track: acquiring an account, then driving one order to a
/// newly-installed certificate. A fresh `NewCert*` cycle begins whenever the
/// current certificate needs renewal (or none exists yet).
pub enum CertTrack {
    /// No `installation.json` on disk. Polled every
    /// [`crate::backoff::UNCONFIGURED_POLL_SECS`].
    IdleUnconfigured,

    /// An installation is configured but no account key/record exists yet.
    NeedAccount,

    /// Account exists, current cert (if any) is still valid. Waiting on the
    /// renewal deadline.
    HaveAccountIdle { account: AcmeAccountRecord },

    NewCertKeygen { account: AcmeAccountRecord },
    NewCertListOrders { account: AcmeAccountRecord, pkey: KeyPair },
    /// `remaining` holds the not-yet-tried order URLs from the same
    /// `list_orders` response; an order whose domain doesn't match or whose
    /// status is terminal is skipped in favor of the next one.
    NewCertGetOrder {
        account: AcmeAccountRecord,
        pkey: KeyPair,
        order: String,
        remaining: Vec<String>,
    },
    NewCertNewOrder { account: AcmeAccountRecord, pkey: KeyPair },

    NewCertGetAuthz {
        account: AcmeAccountRecord,
        pkey: KeyPair,
        order: String,
        finalize: String,
        authz: String,
    },
    NewCertPrepare {
        account: AcmeAccountRecord,
        pkey: KeyPair,
        order: String,
        finalize: String,
        authz: String,
        challenge: String,
        token: String,
    },
    NewCertChallenge {
        account: AcmeAccountRecord,
        pkey: KeyPair,
        order: String,
        finalize: String,
        authz: String,
        challenge: String,
        token: String,
    },
    NewCertChallengeFinish {
        account: AcmeAccountRecord,
        pkey: KeyPair,
        order: String,
        finalize: String,
        authz: String,
        token: String,
        retry_after: i64,
    },
    NewCertFinalize {
        account: AcmeAccountRecord,
        pkey: KeyPair,
        order: String,
        finalize: String,
        /// The DNS-01 token to unprepare once the cert installs. `None` when
        /// resuming an order whose challenge was already satisfied in a
        /// prior run (nothing left for this process to tear down).
        token: Option<String>,
    },
    NewCertFinalizePoll {
        account: AcmeAccountRecord,
        pkey: KeyPair,
        order: String,
        token: Option<String>,
        retry_after: i64,
    },
    NewCertDownload {
        account: AcmeAccountRecord,
        pkey: KeyPair,
        token: Option<String>,
        certurl: String,
    },
    NewCertInstall {
        account: AcmeAccountRecord,
        token: Option<String>,
        cert_pem: String,
    },
}

impl CertTrack {
    pub fn account(&self) -> Option<&AcmeAccountRecord> {
        match self {
            CertTrack::IdleUnconfigured | CertTrack::NeedAccount => None,
            CertTrack::HaveAccountIdle { account }
            | CertTrack::NewCertKeygen { account }
            | CertTrack::NewCertListOrders { account, .. }
            | CertTrack::NewCertGetOrder { account, .. }
            | CertTrack::NewCertNewOrder { account, .. }
            | CertTrack::NewCertGetAuthz { account, .. }
            | CertTrack::NewCertPrepare { account, .. }
            | CertTrack::NewCertChallenge { account, .. }
            | CertTrack::NewCertChallengeFinish { account, .. }
            | CertTrack::NewCertFinalize { account, .. }
            | CertTrack::NewCertFinalizePoll { account, .. }
            | CertTrack::NewCertDownload { account, .. }
            | CertTrack::NewCertInstall { account, .. } => Some(account),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CertTrack::IdleUnconfigured => "idle_unconfigured",
            CertTrack::NeedAccount => "need_account",
            CertTrack::HaveAccountIdle { .. } => "have_account_idle",
            CertTrack::NewCertKeygen { .. } => "new_cert_keygen",
            CertTrack::NewCertListOrders { .. } => "new_cert_list_orders",
            CertTrack::NewCertGetOrder { .. } => "new_cert_get_order",
            CertTrack::NewCertNewOrder { .. } => "new_cert_new_order",
            CertTrack::NewCertGetAuthz { .. } => "new_cert_get_authz",
            CertTrack::NewCertPrepare { .. } => "new_cert_prepare",
            CertTrack::NewCertChallenge { .. } => "new_cert_challenge",
            CertTrack::NewCertChallengeFinish { .. } => "new_cert_challenge_finish",
            CertTrack::NewCertFinalize { .. } => "new_cert_finalize",
            CertTrack::NewCertFinalizePoll { .. } => "new_cert_finalize_poll",
            CertTrack::NewCertDownload { .. } => "new_cert_download",
            CertTrack::NewCertInstall { .. } => "new_cert_install",
        }
    }
}

/// The secondary track: tearing down a DNS-01 record that `prepare`
/// published for a token no longer in use (superseded order, shutdown, or a
/// completed renewal). Independent of `CertTrack` so a slow unprepare never
/// blocks the next renewal cycle: at most one in-flight call per
/// collaborator category.
pub enum UnprepareTrack {
    Idle,
    Pending { token: String },
    Backoff { token: String },
}

impl UnprepareTrack {
    pub fn token(&self) -> Option<&str> {
        match self {
            UnprepareTrack::Idle => None,
            UnprepareTrack::Pending { token } | UnprepareTrack::Backoff { token } => Some(token),
        }
    }
}

/// The three independent deadlines the manager's select loop races against,
/// replacing the three `advance_state`-triggering timers of the original
/// design.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadlines {
    /// Fires the next `CertTrack` transition: renewal due, or the
    /// unconfigured poll interval elapsed.
    pub cert_deadline: Option<tokio::time::Instant>,
    /// Fires a retry after a transient `CertTrack` failure.
    pub backoff_deadline: Option<tokio::time::Instant>,
    /// Fires a retry of a pending `UnprepareTrack` call.
    pub unprepare_deadline: Option<tokio::time::Instant>,
}
