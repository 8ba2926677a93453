//! End-to-end driver tests against a scripted `AcmeCollaborator`, in the
//! spirit of the expect/add call-queue harness this manager's test fixtures
//! were originally exercised with: each test enqueues the exact calls it
//! expects, in order, and panics on any mismatch.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use rcgen::KeyPair;
use sm_acme_core::{AcmeAccount, AcmeCollaborator, AcmeError, AcmeManager, Installation, Result};
use sm_acme_core::{AuthzResult, ChallengeStatus, GetOrderResult, IssuedCert, NewOrderResult, OrderStatus};
use tokio::sync::Mutex;

enum Call {
    Prepare(Result<()>),
    Unprepare(Result<()>),
    NewAccount(Result<AcmeAccount>),
    NewOrder(Result<NewOrderResult>),
    GetOrder(Result<GetOrderResult>),
    ListOrders(Result<Vec<String>>),
    GetAuthz(Result<AuthzResult>),
    Challenge(Result<()>),
    ChallengeFinish(Result<()>),
    Finalize(Result<IssuedCert>),
    FinalizeFromProcessing(Result<IssuedCert>),
    FinalizeFromValid(Result<IssuedCert>),
}

impl Call {
    fn name(&self) -> &'static str {
        match self {
            Call::Prepare(_) => "prepare",
            Call::Unprepare(_) => "unprepare",
            Call::NewAccount(_) => "new_account",
            Call::NewOrder(_) => "new_order",
            Call::GetOrder(_) => "get_order",
            Call::ListOrders(_) => "list_orders",
            Call::GetAuthz(_) => "get_authz",
            Call::Challenge(_) => "challenge",
            Call::ChallengeFinish(_) => "challenge_finish",
            Call::Finalize(_) => "finalize",
            Call::FinalizeFromProcessing(_) => "finalize_from_processing",
            Call::FinalizeFromValid(_) => "finalize_from_valid",
        }
    }
}

/// A collaborator double driven entirely by a pre-loaded queue of
/// expectations. `keygen` is not scripted: it always runs a real P-256
/// keygen and writes it to the requested path, since every test scenario
/// that reaches it needs a real key to feed `finalize`.
struct ScriptedCollaborator {
    queue: Mutex<VecDeque<Call>>,
    now: AtomicI64,
    /// The `retry_after` most recently passed to `finalize_from_processing`,
    /// so tests can confirm the order's own `Retry-After` survives the
    /// `NewCertFinalizePoll` hop rather than being replaced by a constant.
    last_finalize_retry_after: std::sync::Mutex<Option<i64>>,
}

impl ScriptedCollaborator {
    fn new(calls: Vec<Call>) -> Self {
        Self {
            queue: Mutex::new(calls.into_iter().collect()),
            now: AtomicI64::new(1_700_000_000),
            last_finalize_retry_after: std::sync::Mutex::new(None),
        }
    }

    fn last_finalize_retry_after(&self) -> Option<i64> {
        *self.last_finalize_retry_after.lock().unwrap()
    }

    async fn pop(&self, expected: &str) -> Call {
        let call = self
            .queue
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected call to {expected}: script exhausted"));
        assert_eq!(call.name(), expected, "call order mismatch");
        call
    }

    async fn remaining(&self) -> usize {
        self.queue.lock().await.len()
    }
}

#[async_trait]
impl AcmeCollaborator for ScriptedCollaborator {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    async fn prepare(&self, _token: &str, _proof: &str) -> Result<()> {
        match self.pop("prepare").await {
            Call::Prepare(r) => r,
            _ => unreachable!(),
        }
    }

    async fn unprepare(&self, _token: &str) -> Result<()> {
        match self.pop("unprepare").await {
            Call::Unprepare(r) => r,
            _ => unreachable!(),
        }
    }

    async fn keygen(&self, path: &Path) -> Result<KeyPair> {
        let pkey = KeyPair::generate().map_err(|e| AcmeError::ResourceExhausted(e.to_string()))?;
        tokio::fs::write(path, pkey.serialize_pem()).await?;
        Ok(pkey)
    }

    async fn new_account(
        &self,
        _key: &sm_acme_core::Jwk,
        _email: &str,
        _key_thumb: Option<&str>,
    ) -> Result<AcmeAccount> {
        match self.pop("new_account").await {
            Call::NewAccount(r) => r,
            _ => unreachable!(),
        }
    }

    async fn new_order(&self, _acct: &AcmeAccount, _domain: &str) -> Result<NewOrderResult> {
        match self.pop("new_order").await {
            Call::NewOrder(r) => r,
            _ => unreachable!(),
        }
    }

    async fn get_order(&self, _acct: &AcmeAccount, _order: &str) -> Result<GetOrderResult> {
        match self.pop("get_order").await {
            Call::GetOrder(r) => r,
            _ => unreachable!(),
        }
    }

    async fn list_orders(&self, _acct: &AcmeAccount) -> Result<Vec<String>> {
        match self.pop("list_orders").await {
            Call::ListOrders(r) => r,
            _ => unreachable!(),
        }
    }

    async fn get_authz(&self, _acct: &AcmeAccount, _authz: &str) -> Result<AuthzResult> {
        match self.pop("get_authz").await {
            Call::GetAuthz(r) => r,
            _ => unreachable!(),
        }
    }

    async fn challenge(&self, _acct: &AcmeAccount, _authz: &str, _challenge: &str) -> Result<()> {
        match self.pop("challenge").await {
            Call::Challenge(r) => r,
            _ => unreachable!(),
        }
    }

    async fn challenge_finish(&self, _acct: &AcmeAccount, _authz: &str, _retry_after: i64) -> Result<()> {
        match self.pop("challenge_finish").await {
            Call::ChallengeFinish(r) => r,
            _ => unreachable!(),
        }
    }

    async fn finalize(
        &self,
        _acct: &AcmeAccount,
        _order: &str,
        _finalize: &str,
        _domain: &str,
        _pkey: &KeyPair,
    ) -> Result<IssuedCert> {
        match self.pop("finalize").await {
            Call::Finalize(r) => r,
            _ => unreachable!(),
        }
    }

    async fn finalize_from_processing(
        &self,
        _acct: &AcmeAccount,
        _order: &str,
        retry_after: i64,
    ) -> Result<IssuedCert> {
        *self.last_finalize_retry_after.lock().unwrap() = Some(retry_after);
        match self.pop("finalize_from_processing").await {
            Call::FinalizeFromProcessing(r) => r,
            _ => unreachable!(),
        }
    }

    async fn finalize_from_valid(&self, _acct: &AcmeAccount, _certurl: &str) -> Result<IssuedCert> {
        match self.pop("finalize_from_valid").await {
            Call::FinalizeFromValid(r) => r,
            _ => unreachable!(),
        }
    }
}

fn test_account() -> AcmeAccount {
    AcmeAccount {
        key: sm_acme_core::Jwk {
            crv: "P-256".into(),
            kty: "EC".into(),
            x: "x".into(),
            y: "y".into(),
            d: Some("d".into()),
        },
        kid: "https://acme.example/acct/1".into(),
        orders: "https://acme.example/acct/1/orders".into(),
    }
}

fn self_signed_cert_pem() -> String {
    let params = rcgen::CertificateParams::new(vec!["yomamma.user.splintermail.com".into()]).unwrap();
    let keypair = KeyPair::generate().unwrap();
    let cert = params.self_signed(&keypair).unwrap();
    cert.pem()
}

fn write_account(dir: &Path) {
    let account_record = serde_json::json!({
        "key": {"crv": "P-256", "kty": "EC", "x": "x", "y": "y", "d": "d"},
        "kid": "https://acme.example/acct/1",
        "orders": "https://acme.example/acct/1/orders",
    });
    std::fs::write(
        dir.join("account.json"),
        serde_json::to_vec(&account_record).unwrap(),
    )
    .unwrap();
}

fn write_installation(dir: &Path) {
    let installation = Installation {
        email: "user@example.com".into(),
        secret: "shh".into(),
        subdomain: "yomamma".into(),
        token: "12345".into(),
    };
    std::fs::write(
        dir.join("installation.json"),
        serde_json::to_vec(&installation).unwrap(),
    )
    .unwrap();
}

#[tokio::test(start_paused = true)]
async fn unconfigured_polls_without_calling_out() {
    let dir = tempfile::tempdir().unwrap();
    let collaborator = Arc::new(ScriptedCollaborator::new(vec![]));
    let (manager, _rx) = AcmeManager::init(dir.path(), collaborator.clone()).await.unwrap();
    let closer = manager.closer();

    let handle = tokio::spawn(manager.run());
    tokio::time::advance(std::time::Duration::from_secs(20)).await;
    assert_eq!(collaborator.remaining().await, 0, "no collaborator calls while unconfigured");

    closer.notify_one();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn fresh_issuance_runs_full_sequence() {
    let dir = tempfile::tempdir().unwrap();
    write_installation(dir.path());

    let account = test_account();
    let cert_pem = self_signed_cert_pem();

    let calls = vec![
        Call::NewAccount(Ok(account.clone())),
        Call::ListOrders(Ok(vec![])),
        Call::NewOrder(Ok(NewOrderResult {
            order: "https://acme.example/order/1".into(),
            expires: "2099-01-01T00:00:00Z".into(),
            authz: "https://acme.example/authz/1".into(),
            finalize: "https://acme.example/order/1/finalize".into(),
        })),
        Call::GetAuthz(Ok(AuthzResult {
            outer_status: ChallengeStatus::Pending,
            challenge_status: ChallengeStatus::Pending,
            domain: "yomamma.user.splintermail.com".into(),
            expires: "2099-01-01T00:00:00Z".into(),
            challenge: "https://acme.example/chal/1".into(),
            token: "the-token".into(),
            retry_after: None,
        })),
        Call::Prepare(Ok(())),
        Call::Challenge(Ok(())),
        Call::ChallengeFinish(Ok(())),
        Call::Finalize(Ok(IssuedCert { cert_pem })),
        Call::Unprepare(Ok(())),
    ];
    let collaborator = Arc::new(ScriptedCollaborator::new(calls));

    // jwk.json must exist before NeedAccount can call new_account.
    let jwk = sm_acme_core::Jwk {
        crv: "P-256".into(),
        kty: "EC".into(),
        x: "ld3hMB2e_JD8Yn8u_FS76pjX3uRenrcWut-CKVi33bw".into(),
        y: "uL4CozKllAT0eTmGdpGQ2u5FQdu49K_QjMVywMOrifY".into(),
        d: None,
    };
    std::fs::write(
        dir.path().join("jwk.json"),
        serde_json::to_vec(&jwk).unwrap(),
    )
    .unwrap();

    let (manager, mut rx) = AcmeManager::init(dir.path(), collaborator.clone()).await.unwrap();
    let closer = manager.closer();
    let handle = tokio::spawn(manager.run());

    for _ in 0..50 {
        tokio::time::advance(std::time::Duration::from_secs(1)).await;
        if rx.borrow().is_some() && collaborator.remaining().await == 0 {
            break;
        }
    }

    assert!(rx.borrow_and_update().is_some(), "a server config should have been published");
    assert_eq!(collaborator.remaining().await, 0, "every scripted call should have been consumed");
    assert!(dir.path().join("key.pem").exists());
    assert!(dir.path().join("cert.pem").exists());
    assert!(dir.path().join("account.json").exists());

    closer.notify_one();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn transient_failures_back_off_on_the_fixed_progression() {
    let dir = tempfile::tempdir().unwrap();
    write_installation(dir.path());
    write_account(dir.path());

    // list_orders fails seven times in a row: the manager should back off on
    // {1, 5, 15, 30, 45, 60, 60} before this test stops driving it.
    let calls: Vec<Call> = (0..7)
        .map(|_| Call::ListOrders(Err(AcmeError::Conn("connection refused".into()))))
        .collect();
    let collaborator = Arc::new(ScriptedCollaborator::new(calls));

    let (manager, _rx) = AcmeManager::init(dir.path(), collaborator.clone()).await.unwrap();
    let closer = manager.closer();
    let handle = tokio::spawn(manager.run());

    let expected = [1u64, 5, 15, 30, 45, 60, 60];
    for delay in expected {
        tokio::time::advance(std::time::Duration::from_secs(delay)).await;
    }
    // a little slack to let the final retry attempt actually happen and be
    // consumed from the queue before we assert.
    tokio::time::advance(std::time::Duration::from_millis(10)).await;

    assert_eq!(collaborator.remaining().await, 0, "all seven scripted failures should have been consumed");

    closer.notify_one();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn existing_order_scan_skips_mismatched_domain_then_downloads_valid_order() {
    let dir = tempfile::tempdir().unwrap();
    write_installation(dir.path());
    write_account(dir.path());

    let cert_pem = self_signed_cert_pem();

    let calls = vec![
        Call::ListOrders(Ok(vec![
            "https://acme.example/order/wrong-domain".into(),
            "https://acme.example/order/mine".into(),
        ])),
        Call::GetOrder(Ok(GetOrderResult {
            status: OrderStatus::Valid,
            domain: "someoneelse.user.splintermail.com".into(),
            expires: "2099-01-01T00:00:00Z".into(),
            authz: "https://acme.example/authz/wrong".into(),
            finalize: "https://acme.example/order/wrong-domain/finalize".into(),
            certurl: Some("https://acme.example/cert/wrong".into()),
            retry_after: None,
        })),
        Call::GetOrder(Ok(GetOrderResult {
            status: OrderStatus::Valid,
            domain: "yomamma.user.splintermail.com".into(),
            expires: "2099-01-01T00:00:00Z".into(),
            authz: "https://acme.example/authz/mine".into(),
            finalize: "https://acme.example/order/mine/finalize".into(),
            certurl: Some("https://acme.example/cert/mine".into()),
            retry_after: None,
        })),
        Call::FinalizeFromValid(Ok(IssuedCert { cert_pem })),
    ];
    let collaborator = Arc::new(ScriptedCollaborator::new(calls));

    let (manager, mut rx) = AcmeManager::init(dir.path(), collaborator.clone()).await.unwrap();
    let closer = manager.closer();
    let handle = tokio::spawn(manager.run());

    for _ in 0..50 {
        tokio::time::advance(std::time::Duration::from_secs(1)).await;
        if rx.borrow().is_some() && collaborator.remaining().await == 0 {
            break;
        }
    }

    assert!(
        rx.borrow_and_update().is_some(),
        "the matching-domain valid order should have been downloaded"
    );
    assert_eq!(
        collaborator.remaining().await,
        0,
        "the mismatched-domain order should have been skipped, not stopped at"
    );

    closer.notify_one();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn existing_processing_order_polls_finalize_with_the_orders_own_retry_after() {
    let dir = tempfile::tempdir().unwrap();
    write_installation(dir.path());
    write_account(dir.path());

    let cert_pem = self_signed_cert_pem();

    let calls = vec![
        Call::ListOrders(Ok(vec!["https://acme.example/order/1".into()])),
        Call::GetOrder(Ok(GetOrderResult {
            status: OrderStatus::Processing,
            domain: "yomamma.user.splintermail.com".into(),
            expires: "2099-01-01T00:00:00Z".into(),
            authz: "https://acme.example/authz/1".into(),
            finalize: "https://acme.example/order/1/finalize".into(),
            certurl: None,
            retry_after: Some(42),
        })),
        Call::FinalizeFromProcessing(Ok(IssuedCert { cert_pem })),
    ];
    let collaborator = Arc::new(ScriptedCollaborator::new(calls));

    let (manager, mut rx) = AcmeManager::init(dir.path(), collaborator.clone()).await.unwrap();
    let closer = manager.closer();
    let handle = tokio::spawn(manager.run());

    for _ in 0..50 {
        tokio::time::advance(std::time::Duration::from_secs(1)).await;
        if rx.borrow().is_some() && collaborator.remaining().await == 0 {
            break;
        }
    }

    assert!(rx.borrow_and_update().is_some(), "a server config should have been published");
    assert_eq!(collaborator.remaining().await, 0);
    assert_eq!(
        collaborator.last_finalize_retry_after(),
        Some(42),
        "the order's own retry_after should reach finalize_from_processing unchanged"
    );

    closer.notify_one();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn existing_pending_order_with_processing_authz_skips_straight_to_challenge_finish() {
    let dir = tempfile::tempdir().unwrap();
    write_installation(dir.path());
    write_account(dir.path());

    let cert_pem = self_signed_cert_pem();

    let calls = vec![
        Call::ListOrders(Ok(vec!["https://acme.example/order/1".into()])),
        Call::GetOrder(Ok(GetOrderResult {
            status: OrderStatus::Pending,
            domain: "yomamma.user.splintermail.com".into(),
            expires: "2099-01-01T00:00:00Z".into(),
            authz: "https://acme.example/authz/1".into(),
            finalize: "https://acme.example/order/1/finalize".into(),
            certurl: None,
            retry_after: None,
        })),
        Call::GetAuthz(Ok(AuthzResult {
            outer_status: ChallengeStatus::Pending,
            challenge_status: ChallengeStatus::Processing,
            domain: "yomamma.user.splintermail.com".into(),
            expires: "2099-01-01T00:00:00Z".into(),
            challenge: "https://acme.example/chal/1".into(),
            token: "the-token".into(),
            retry_after: Some(9),
        })),
        // No Prepare/Challenge: a challenge already in PROCESSING means this
        // process (or a previous one) already triggered it.
        Call::ChallengeFinish(Ok(())),
        Call::Finalize(Ok(IssuedCert { cert_pem })),
        Call::Unprepare(Ok(())),
    ];
    let collaborator = Arc::new(ScriptedCollaborator::new(calls));

    let (manager, mut rx) = AcmeManager::init(dir.path(), collaborator.clone()).await.unwrap();
    let closer = manager.closer();
    let handle = tokio::spawn(manager.run());

    for _ in 0..50 {
        tokio::time::advance(std::time::Duration::from_secs(1)).await;
        if rx.borrow().is_some() && collaborator.remaining().await == 0 {
            break;
        }
    }

    assert!(rx.borrow_and_update().is_some(), "a server config should have been published");
    assert_eq!(
        collaborator.remaining().await,
        0,
        "every scripted call should have been consumed, with no extra prepare/challenge call attempted"
    );

    closer.notify_one();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn unprepare_retries_ten_minutes_after_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    write_installation(dir.path());

    let account = test_account();
    let cert_pem = self_signed_cert_pem();

    let calls = vec![
        Call::NewAccount(Ok(account.clone())),
        Call::ListOrders(Ok(vec![])),
        Call::NewOrder(Ok(NewOrderResult {
            order: "https://acme.example/order/1".into(),
            expires: "2099-01-01T00:00:00Z".into(),
            authz: "https://acme.example/authz/1".into(),
            finalize: "https://acme.example/order/1/finalize".into(),
        })),
        Call::GetAuthz(Ok(AuthzResult {
            outer_status: ChallengeStatus::Pending,
            challenge_status: ChallengeStatus::Pending,
            domain: "yomamma.user.splintermail.com".into(),
            expires: "2099-01-01T00:00:00Z".into(),
            challenge: "https://acme.example/chal/1".into(),
            token: "the-token".into(),
            retry_after: None,
        })),
        Call::Prepare(Ok(())),
        Call::Challenge(Ok(())),
        Call::ChallengeFinish(Ok(())),
        Call::Finalize(Ok(IssuedCert { cert_pem })),
        Call::Unprepare(Err(AcmeError::Conn("connection refused".into()))),
        Call::Unprepare(Ok(())),
    ];
    let collaborator = Arc::new(ScriptedCollaborator::new(calls));

    let jwk = sm_acme_core::Jwk {
        crv: "P-256".into(),
        kty: "EC".into(),
        x: "ld3hMB2e_JD8Yn8u_FS76pjX3uRenrcWut-CKVi33bw".into(),
        y: "uL4CozKllAT0eTmGdpGQ2u5FQdu49K_QjMVywMOrifY".into(),
        d: None,
    };
    std::fs::write(dir.path().join("jwk.json"), serde_json::to_vec(&jwk).unwrap()).unwrap();

    let (manager, mut rx) = AcmeManager::init(dir.path(), collaborator.clone()).await.unwrap();
    let closer = manager.closer();
    let handle = tokio::spawn(manager.run());

    // Drive until the cert is installed and the first (failing) unprepare
    // attempt has fired immediately, leaving only its retry queued.
    for _ in 0..50 {
        tokio::time::advance(std::time::Duration::from_secs(1)).await;
        if rx.borrow().is_some() && collaborator.remaining().await == 1 {
            break;
        }
    }
    assert_eq!(
        collaborator.remaining().await,
        1,
        "unprepare should fire immediately once the cert installs"
    );

    tokio::time::advance(std::time::Duration::from_secs(599)).await;
    assert_eq!(
        collaborator.remaining().await,
        1,
        "the retry must wait out the full ten-minute backoff"
    );

    tokio::time::advance(std::time::Duration::from_secs(2)).await;
    assert_eq!(
        collaborator.remaining().await,
        0,
        "the retry should fire once the ten-minute backoff elapses"
    );

    closer.notify_one();
    handle.await.unwrap().unwrap();
}
