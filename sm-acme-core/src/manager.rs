//! The state machine and its async driver loop.
//!
//! The original design is a single-threaded callback machine: every
//! collaborator call completes by re-entering `advance_state` from whatever
//! context the completion happened on. Async/await collapses that: each
//! track's next unit of work is one `Future`, held in an `Option` slot, and
//! `tokio::select!` is the re-entrant dispatcher. A `close()` call drops
//! whatever futures are in flight, which cancels their underlying I/O the
//! same way the original design's explicit cancel callback did.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{watch, Notify};
use tokio::time::Instant;

use crate::backoff::{Backoff, UNCONFIGURED_POLL_SECS, UNPREPARE_BACKOFF_SECS};
use crate::collaborator::{AcmeAccount, AcmeCollaborator, ChallengeStatus, OrderStatus};
use crate::error::{AcmeError, Result};
use crate::jwk::dns01_proof;
use crate::model::{now_unix, AcmeAccountRecord, Installation, JwkRecord};
use crate::state::{CertTrack, Deadlines, UnprepareTrack};
use crate::store::WorkingDir;
use crate::tls::server_config_from_pair;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Outcome of driving one `CertTrack` step: either the track advanced, or it
/// failed and is handed back so the caller can decide whether to retry it.
enum CertStep {
    Advanced(CertTrack),
    Failed(CertTrack, AcmeError),
}

/// Fixed poll cadence while waiting for a DNS-01 challenge to be picked up
/// by the CA on the fresh-issuance path; resumed orders use the
/// `retry_after` the CA itself returned.
const CHALLENGE_POLL_SECS: i64 = 3;

pub struct AcmeManager {
    working_dir: WorkingDir,
    installation: Option<Installation>,
    collaborator: Arc<dyn AcmeCollaborator>,
    update_tx: watch::Sender<Option<Arc<rustls::ServerConfig>>>,

    cert_track: CertTrack,
    cert_fut: Option<BoxFuture<CertStep>>,
    cert_backoff: Backoff,

    unprepare_track: UnprepareTrack,
    unprepare_fut: Option<BoxFuture<Result<()>>>,

    deadlines: Deadlines,
    close: Arc<Notify>,
}

impl AcmeManager {
    /// Startup reconciliation: load whatever is on
    /// disk, discard anything invalid, and compute the initial
    /// `rustls::ServerConfig` (if a valid cert pair exists) before `run` is
    /// ever polled.
    pub async fn init(
        working_dir: impl Into<std::path::PathBuf>,
        collaborator: Arc<dyn AcmeCollaborator>,
    ) -> Result<(Self, watch::Receiver<Option<Arc<rustls::ServerConfig>>>)> {
        let working_dir = WorkingDir::new(working_dir);
        working_dir.cleanup_orphan_staging().await?;

        let installation = working_dir.load_installation().await?;

        // A crash between `install_new_cert` writing `certnew.pem` and its
        // final renames (or any other reason a staged pair outlives a
        // restart) leaves a newer, still-unpromoted pair sitting next to the
        // current one. Prefer it over regenerating from scratch.
        let current = working_dir
            .load_cert_pair(crate::store::KEY_PEM, crate::store::CERT_PEM)
            .await?;
        let staging = working_dir
            .load_cert_pair(crate::store::KEYNEW_PEM, crate::store::CERTNEW_PEM)
            .await?;

        let chosen = match (&installation, &staging) {
            (Some(inst), Some((_, _, staging_info))) => {
                let staging_is_newer = match &current {
                    Some((_, _, current_info)) => staging_info.not_after > current_info.not_after,
                    None => true,
                };
                if staging_is_newer && staging_info.is_valid_for(&inst.fulldomain(), now_unix()) {
                    tracing::info!("📦 promoting newer staged cert pair found at startup");
                    working_dir.promote_staging().await?;
                    staging
                } else {
                    current
                }
            }
            _ => current,
        };

        let mut initial_config = None;
        let mut cert_deadline = None;

        if let Some((key_pem, cert_pem, info)) = chosen {
            if let Some(inst) = &installation {
                if info.is_valid_for(&inst.fulldomain(), now_unix()) {
                    initial_config = Some(Arc::new(server_config_from_pair(&key_pem, &cert_pem)?));
                    cert_deadline = Some(deadline_at(info.renewal_deadline()));
                }
            }
        }

        let (update_tx, update_rx) = watch::channel(initial_config);

        let cert_track = match (&installation, working_dir.load_account().await?) {
            (None, _) => CertTrack::IdleUnconfigured,
            (Some(_), None) => CertTrack::NeedAccount,
            (Some(_), Some(account)) => CertTrack::HaveAccountIdle { account },
        };

        let deadlines = Deadlines {
            cert_deadline: Some(cert_deadline.unwrap_or_else(Instant::now)),
            backoff_deadline: None,
            unprepare_deadline: None,
        };

        let manager = Self {
            working_dir,
            installation,
            collaborator,
            update_tx,
            cert_track,
            cert_fut: None,
            cert_backoff: Backoff::new(),
            unprepare_track: UnprepareTrack::Idle,
            unprepare_fut: None,
            deadlines,
            close: Arc::new(Notify::new()),
        };

        Ok((manager, update_rx))
    }

    /// A handle that, when notified, cancels in-flight work and ends `run`.
    pub fn closer(&self) -> Arc<Notify> {
        self.close.clone()
    }

    pub fn close(&self) {
        self.close.notify_one();
    }

    /// Drives the state machine until `close()` is called or a fatal error
    /// occurs. Returns `Ok(())` exactly once, on a clean shutdown.
    pub async fn run(mut self) -> Result<()> {
        loop {
            if self.cert_fut.is_none() {
                self.advance_cert_track();
            }
            if self.unprepare_fut.is_none() {
                self.advance_unprepare_track();
            }

            tokio::select! {
                biased;

                _ = self.close.notified() => {
                    tracing::info!("🛑 shutdown requested, canceling in-flight work");
                    self.cert_fut = None;
                    self.unprepare_fut = None;
                    return Ok(());
                }

                step = poll_opt(&mut self.cert_fut), if self.cert_fut.is_some() => {
                    self.cert_fut = None;
                    self.handle_cert_step(step).await?;
                }

                res = poll_opt(&mut self.unprepare_fut), if self.unprepare_fut.is_some() => {
                    self.unprepare_fut = None;
                    self.handle_unprepare_result(res);
                }

                _ = sleep_until_opt(self.deadlines.cert_deadline) => {
                    self.deadlines.cert_deadline = None;
                }

                _ = sleep_until_opt(self.deadlines.backoff_deadline) => {
                    self.deadlines.backoff_deadline = None;
                }

                _ = sleep_until_opt(self.deadlines.unprepare_deadline) => {
                    self.deadlines.unprepare_deadline = None;
                }
            }
        }
    }

    // -- cert track --

    /// Spawns the next unit of async work for `cert_track`, or (for the
    /// states that just wait) arms `cert_deadline` instead.
    fn advance_cert_track(&mut self) {
        if self.deadlines.backoff_deadline.is_some() {
            return;
        }

        let track = std::mem::replace(&mut self.cert_track, CertTrack::IdleUnconfigured);
        let collaborator = self.collaborator.clone();
        let working_dir = self.working_dir.clone();
        let installation = self.installation.clone();

        match track {
            CertTrack::IdleUnconfigured => {
                self.cert_track = CertTrack::IdleUnconfigured;
                if self.deadlines.cert_deadline.is_none() {
                    self.deadlines.cert_deadline = Some(
                        Instant::now() + std::time::Duration::from_secs(UNCONFIGURED_POLL_SECS as u64),
                    );
                }
                self.cert_fut = Some(Box::pin(poll_installation(working_dir)));
            }
            CertTrack::NeedAccount => {
                let Some(inst) = installation else {
                    self.cert_track = CertTrack::IdleUnconfigured;
                    return;
                };
                self.cert_fut = Some(Box::pin(step_need_account(collaborator, working_dir, inst)));
            }
            CertTrack::HaveAccountIdle { account } => {
                self.cert_track = CertTrack::HaveAccountIdle { account };
                // Nothing to do until the renewal deadline fires.
                if self.deadlines.cert_deadline.is_none() {
                    self.deadlines.cert_deadline = Some(
                        Instant::now() + std::time::Duration::from_secs(UNCONFIGURED_POLL_SECS as u64),
                    );
                }
            }
            other => {
                let Some(inst) = installation else {
                    self.cert_track = CertTrack::IdleUnconfigured;
                    return;
                };
                self.cert_fut = Some(Box::pin(step_new_cert(collaborator, working_dir, inst, other)));
            }
        }
    }

    async fn handle_cert_step(&mut self, step: CertStep) -> Result<()> {
        match step {
            CertStep::Advanced(CertTrack::IdleUnconfigured) => {
                self.cert_track = CertTrack::IdleUnconfigured;
            }
            CertStep::Advanced(new_state @ CertTrack::NeedAccount) => {
                self.cert_track = new_state;
            }
            CertStep::Advanced(CertTrack::HaveAccountIdle { account }) => {
                self.cert_backoff.reset();
                if let Some(inst) = self.installation.clone() {
                    if let Some((_, _, info)) = self
                        .working_dir
                        .load_cert_pair(crate::store::KEY_PEM, crate::store::CERT_PEM)
                        .await?
                    {
                        if info.is_valid_for(&inst.fulldomain(), now_unix()) {
                            self.deadlines.cert_deadline = Some(deadline_at(info.renewal_deadline()));
                            self.cert_track = CertTrack::HaveAccountIdle { account };
                            return Ok(());
                        }
                    }
                }
                self.cert_track = CertTrack::NewCertKeygen { account };
            }
            CertStep::Advanced(CertTrack::NewCertInstall { account, token, cert_pem }) => {
                self.working_dir.install_new_cert(&cert_pem).await?;
                let key_pem =
                    tokio::fs::read_to_string(self.working_dir.path(crate::store::KEY_PEM)).await?;
                let config = server_config_from_pair(&key_pem, &cert_pem)?;
                let _ = self.update_tx.send(Some(Arc::new(config)));

                self.cert_backoff.reset();
                if let Some(token) = token {
                    self.unprepare_track = UnprepareTrack::Pending { token };
                }

                if let Some(inst) = self.installation.clone() {
                    let info = crate::model::parse_cert_pair(&key_pem, &cert_pem)?;
                    if info.is_valid_for(&inst.fulldomain(), now_unix()) {
                        self.deadlines.cert_deadline = Some(deadline_at(info.renewal_deadline()));
                    }
                }
                self.cert_track = CertTrack::HaveAccountIdle { account };
            }
            CertStep::Advanced(new_state) => {
                self.cert_backoff.reset();
                self.cert_track = new_state;
            }
            CertStep::Failed(state, err) => {
                self.handle_cert_error(state, err)?;
            }
        }
        Ok(())
    }

    fn handle_cert_error(&mut self, state: CertTrack, err: AcmeError) -> Result<()> {
        if err.is_configuration() {
            tracing::warn!(error = %err, "⚠️ configuration problem, reverting to unconfigured poll");
            self.installation = None;
            self.cert_track = CertTrack::IdleUnconfigured;
            return Ok(());
        }

        if matches!(err, AcmeError::PrepareTimeout) {
            tracing::debug!("⏱️ prepare timed out, retrying without backoff");
            self.cert_track = state;
            return Ok(());
        }

        if err.is_transient() {
            let delay = self.cert_backoff.next_delay_secs();
            tracing::warn!(error = %err, delay, "⚠️ transient error, backing off");
            self.deadlines.backoff_deadline =
                Some(Instant::now() + std::time::Duration::from_secs(delay as u64));
            self.cert_track = state;
            return Ok(());
        }

        tracing::error!(error = %err, "❌ fatal error in cert track");
        Err(err)
    }

    // -- unprepare track --

    fn advance_unprepare_track(&mut self) {
        if self.deadlines.unprepare_deadline.is_some() {
            return;
        }
        let token = match &self.unprepare_track {
            UnprepareTrack::Idle => return,
            UnprepareTrack::Pending { token } | UnprepareTrack::Backoff { token } => token.clone(),
        };
        let collaborator = self.collaborator.clone();
        self.unprepare_fut = Some(Box::pin(async move { collaborator.unprepare(&token).await }));
    }

    fn handle_unprepare_result(&mut self, res: Result<()>) {
        match res {
            Ok(()) => {
                tracing::debug!("✅ unprepare succeeded");
                self.unprepare_track = UnprepareTrack::Idle;
            }
            Err(err) if err.is_canceled() => {}
            Err(err) => {
                tracing::warn!(error = %err, "⚠️ unprepare failed, retrying in {UNPREPARE_BACKOFF_SECS}s");
                if let Some(token) = self.unprepare_track.token().map(str::to_string) {
                    self.unprepare_track = UnprepareTrack::Backoff { token };
                    self.deadlines.unprepare_deadline = Some(
                        Instant::now() + std::time::Duration::from_secs(UNPREPARE_BACKOFF_SECS as u64),
                    );
                }
            }
        }
    }
}

fn deadline_at(unix_time: i64) -> Instant {
    let now = now_unix();
    let delta = (unix_time - now).max(0) as u64;
    Instant::now() + std::time::Duration::from_secs(delta)
}

async fn poll_opt<T>(slot: &mut Option<BoxFuture<T>>) -> T {
    match slot {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(instant) => tokio::time::sleep_until(instant).await,
        None => std::future::pending().await,
    }
}

async fn poll_installation(working_dir: WorkingDir) -> CertStep {
    match working_dir.load_installation().await {
        Ok(Some(_)) => CertStep::Advanced(CertTrack::NeedAccount),
        Ok(None) => CertStep::Advanced(CertTrack::IdleUnconfigured),
        Err(e) => CertStep::Failed(CertTrack::IdleUnconfigured, e),
    }
}

async fn step_need_account(
    collaborator: Arc<dyn AcmeCollaborator>,
    working_dir: WorkingDir,
    installation: Installation,
) -> CertStep {
    async fn inner(
        collaborator: &dyn AcmeCollaborator,
        working_dir: &WorkingDir,
        installation: &Installation,
    ) -> Result<AcmeAccountRecord> {
        if let Some(account) = working_dir.load_account().await? {
            return Ok(account);
        }

        let jwk = match working_dir.load_jwk().await? {
            Some(rec) => rec.jwk,
            None => {
                return Err(AcmeError::Configuration(
                    "no account key material on disk".into(),
                ))
            }
        };

        let thumb = jwk.thumbprint()?;
        let acct = collaborator
            .new_account(&jwk, &installation.email, Some(&thumb))
            .await?;

        let record = AcmeAccountRecord {
            key: acct.key,
            kid: acct.kid,
            orders: acct.orders,
        };
        working_dir.save_account(&record).await?;
        working_dir
            .save_jwk(&JwkRecord { jwk: record.key.public() })
            .await?;
        Ok(record)
    }

    match inner(collaborator.as_ref(), &working_dir, &installation).await {
        Ok(account) => CertStep::Advanced(CertTrack::HaveAccountIdle { account }),
        Err(e) => CertStep::Failed(CertTrack::NeedAccount, e),
    }
}

/// Drives exactly one `NewCert*` transition. Each state performs one
/// collaborator call (or one local computation) and returns the next state.
async fn step_new_cert(
    collaborator: Arc<dyn AcmeCollaborator>,
    working_dir: WorkingDir,
    installation: Installation,
    track: CertTrack,
) -> CertStep {
    let collaborator = collaborator.as_ref();
    let fulldomain = installation.fulldomain();

    match track {
        CertTrack::NewCertKeygen { account } => {
            let path = working_dir.path(crate::store::KEYNEW_PEM);
            match collaborator.keygen(&path).await {
                Ok(pkey) => CertStep::Advanced(CertTrack::NewCertListOrders { account, pkey }),
                Err(e) => CertStep::Failed(CertTrack::NewCertKeygen { account }, e),
            }
        }

        CertTrack::NewCertListOrders { account, pkey } => {
            match collaborator.list_orders(&to_collab_account(&account)).await {
                Ok(mut orders) if !orders.is_empty() => {
                    let order = orders.remove(0);
                    CertStep::Advanced(CertTrack::NewCertGetOrder {
                        account,
                        pkey,
                        order,
                        remaining: orders,
                    })
                }
                Ok(_) => CertStep::Advanced(CertTrack::NewCertNewOrder { account, pkey }),
                Err(e) => CertStep::Failed(CertTrack::NewCertListOrders { account, pkey }, e),
            }
        }

        CertTrack::NewCertNewOrder { account, pkey } => {
            match collaborator.new_order(&to_collab_account(&account), &fulldomain).await {
                Ok(r) => CertStep::Advanced(CertTrack::NewCertGetAuthz {
                    account,
                    pkey,
                    order: r.order,
                    finalize: r.finalize,
                    authz: r.authz,
                }),
                Err(e) => CertStep::Failed(CertTrack::NewCertNewOrder { account, pkey }, e),
            }
        }

        CertTrack::NewCertGetOrder { account, pkey, order, mut remaining } => {
            match collaborator.get_order(&to_collab_account(&account), &order).await {
                Ok(r) => {
                    let domain_matches = r.domain == fulldomain;
                    let terminal = matches!(
                        r.status,
                        OrderStatus::Invalid
                            | OrderStatus::Revoked
                            | OrderStatus::Deactivated
                            | OrderStatus::Expired
                    );
                    if !domain_matches || terminal {
                        // Skip this order and try the next URL `list_orders`
                        // gave us; only fall back to a brand new order once
                        // every URL has been ruled out.
                        if remaining.is_empty() {
                            CertStep::Advanced(CertTrack::NewCertNewOrder { account, pkey })
                        } else {
                            let next = remaining.remove(0);
                            CertStep::Advanced(CertTrack::NewCertGetOrder {
                                account,
                                pkey,
                                order: next,
                                remaining,
                            })
                        }
                    } else {
                        match r.status {
                            OrderStatus::Pending => CertStep::Advanced(CertTrack::NewCertGetAuthz {
                                account,
                                pkey,
                                order,
                                finalize: r.finalize,
                                authz: r.authz,
                            }),
                            OrderStatus::Ready => CertStep::Advanced(CertTrack::NewCertFinalize {
                                account,
                                pkey,
                                order,
                                finalize: r.finalize,
                                token: None,
                            }),
                            OrderStatus::Processing => CertStep::Advanced(CertTrack::NewCertFinalizePoll {
                                account,
                                pkey,
                                order,
                                token: None,
                                retry_after: r.retry_after.unwrap_or(CHALLENGE_POLL_SECS),
                            }),
                            OrderStatus::Valid => match r.certurl {
                                Some(certurl) => CertStep::Advanced(CertTrack::NewCertDownload {
                                    account,
                                    pkey,
                                    token: None,
                                    certurl,
                                }),
                                None => CertStep::Failed(
                                    CertTrack::NewCertNewOrder { account, pkey },
                                    AcmeError::Protocol("order valid but no certurl".into()),
                                ),
                            },
                            OrderStatus::Invalid
                            | OrderStatus::Revoked
                            | OrderStatus::Deactivated
                            | OrderStatus::Expired => {
                                unreachable!("terminal statuses are filtered out above")
                            }
                        }
                    }
                }
                Err(e) => CertStep::Failed(
                    CertTrack::NewCertGetOrder { account, pkey, order, remaining },
                    e,
                ),
            }
        }

        CertTrack::NewCertGetAuthz { account, pkey, order, finalize, authz } => {
            match collaborator.get_authz(&to_collab_account(&account), &authz).await {
                Ok(r) if r.outer_status == ChallengeStatus::Invalid
                    || r.challenge_status == ChallengeStatus::Invalid =>
                {
                    // An invalid authorization can't be retried in place; it
                    // classifies as transient so the caller backs off and
                    // restarts from a fresh order.
                    CertStep::Failed(
                        CertTrack::NewCertNewOrder { account, pkey },
                        AcmeError::Response("authorization invalid".into()),
                    )
                }
                Ok(r) => match r.challenge_status {
                    ChallengeStatus::Pending => CertStep::Advanced(CertTrack::NewCertPrepare {
                        account,
                        pkey,
                        order,
                        finalize,
                        authz,
                        challenge: r.challenge,
                        token: r.token,
                    }),
                    ChallengeStatus::Processing => CertStep::Advanced(CertTrack::NewCertChallengeFinish {
                        account,
                        pkey,
                        order,
                        finalize,
                        authz,
                        token: r.token,
                        retry_after: r.retry_after.unwrap_or(CHALLENGE_POLL_SECS),
                    }),
                    ChallengeStatus::Valid => CertStep::Advanced(CertTrack::NewCertFinalize {
                        account,
                        pkey,
                        order,
                        finalize,
                        token: None,
                    }),
                    ChallengeStatus::Invalid => {
                        unreachable!("invalid challenge status is filtered out above")
                    }
                },
                Err(e) => CertStep::Failed(
                    CertTrack::NewCertGetAuthz { account, pkey, order, finalize, authz },
                    e,
                ),
            }
        }

        CertTrack::NewCertPrepare { account, pkey, order, finalize, authz, challenge, token } => {
            let thumb = match account.key.public().thumbprint() {
                Ok(t) => t,
                Err(e) => {
                    return CertStep::Failed(
                        CertTrack::NewCertPrepare { account, pkey, order, finalize, authz, challenge, token },
                        e,
                    )
                }
            };
            let proof = dns01_proof(&token, &thumb);
            match collaborator.prepare(&token, &proof).await {
                Ok(()) => CertStep::Advanced(CertTrack::NewCertChallenge {
                    account,
                    pkey,
                    order,
                    finalize,
                    authz,
                    challenge,
                    token,
                }),
                Err(e) => CertStep::Failed(
                    CertTrack::NewCertPrepare { account, pkey, order, finalize, authz, challenge, token },
                    e,
                ),
            }
        }

        CertTrack::NewCertChallenge { account, pkey, order, finalize, authz, challenge, token } => {
            match collaborator
                .challenge(&to_collab_account(&account), &authz, &challenge)
                .await
            {
                Ok(()) => CertStep::Advanced(CertTrack::NewCertChallengeFinish {
                    account,
                    pkey,
                    order,
                    finalize,
                    authz,
                    token,
                    retry_after: CHALLENGE_POLL_SECS,
                }),
                Err(e) => CertStep::Failed(
                    CertTrack::NewCertChallenge { account, pkey, order, finalize, authz, challenge, token },
                    e,
                ),
            }
        }

        CertTrack::NewCertChallengeFinish { account, pkey, order, finalize, authz, token, retry_after } => {
            match collaborator
                .challenge_finish(&to_collab_account(&account), &authz, retry_after)
                .await
            {
                Ok(()) => CertStep::Advanced(CertTrack::NewCertFinalize {
                    account,
                    pkey,
                    order,
                    finalize,
                    token: Some(token),
                }),
                Err(e) => CertStep::Failed(
                    CertTrack::NewCertChallengeFinish { account, pkey, order, finalize, authz, token, retry_after },
                    e,
                ),
            }
        }

        CertTrack::NewCertFinalize { account, pkey, order, finalize, token } => {
            match collaborator
                .finalize(&to_collab_account(&account), &order, &finalize, &fulldomain, &pkey)
                .await
            {
                Ok(issued) => CertStep::Advanced(CertTrack::NewCertInstall { account, token, cert_pem: issued.cert_pem }),
                Err(e) => CertStep::Failed(CertTrack::NewCertFinalize { account, pkey, order, finalize, token }, e),
            }
        }

        CertTrack::NewCertFinalizePoll { account, pkey, order, token, retry_after } => {
            match collaborator
                .finalize_from_processing(&to_collab_account(&account), &order, retry_after)
                .await
            {
                Ok(issued) => CertStep::Advanced(CertTrack::NewCertInstall { account, token, cert_pem: issued.cert_pem }),
                Err(e) => CertStep::Failed(CertTrack::NewCertFinalizePoll { account, pkey, order, token, retry_after }, e),
            }
        }

        CertTrack::NewCertDownload { account, pkey, token, certurl } => {
            match collaborator
                .finalize_from_valid(&to_collab_account(&account), &certurl)
                .await
            {
                Ok(issued) => CertStep::Advanced(CertTrack::NewCertInstall { account, token, cert_pem: issued.cert_pem }),
                Err(e) => CertStep::Failed(CertTrack::NewCertDownload { account, pkey, token, certurl }, e),
            }
        }

        // IdleUnconfigured / NeedAccount / HaveAccountIdle / NewCertInstall
        // are all handled by the caller before `step_new_cert` runs.
        other => CertStep::Advanced(other),
    }
}

fn to_collab_account(record: &AcmeAccountRecord) -> AcmeAccount {
    AcmeAccount {
        key: record.key.clone(),
        kid: record.kid.clone(),
        orders: record.orders.clone(),
    }
}
