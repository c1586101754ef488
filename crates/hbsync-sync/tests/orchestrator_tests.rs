//! Sync orchestrator tests against in-memory collaborators
//!
//! The clock is paused so retry backoff and rate limiting complete instantly
//! while elapsed time stays observable.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use hbsync_core::domain::{
    BundleRecord, Categorization, DownloadRecord, Gamekey, MfaChallenge, ProductRecord, Session,
    SessionSummary, SyncError, SyncRun, SyncStatus,
};
use hbsync_core::ports::{
    Credentials, IBrowserDriver, ICategorizer, ICredentialSource, IDataSyncer, ILibraryProvider,
    IMfaCodeSupplier, ISessionProbe, ISessionStore, ISyncIntervalPolicy, SessionStoreError,
};
use hbsync_core::retry::RetryPolicy;
use hbsync_core::usecases::{AuthPorts, AuthSettings, AuthStateMachine};
use hbsync_sync::{
    KeywordCategorizer, SlidingWindowRateLimiter, SyncOrchestrator, SyncPorts, SyncSettings,
};

const OLD_COOKIE: &str = "_simpleauth_sess=old";
const FRESH_COOKIE: &str = "_simpleauth_sess=fresh";

// ============================================================================
// Library fake
// ============================================================================

/// Scripted outcome of one `fetch_orders` call
enum Step {
    /// Well-formed orders for every requested key
    Orders,
    Fail(SyncError),
    Raw(Value),
}

struct FetchCall {
    gamekeys: Vec<Gamekey>,
    cookie: String,
}

#[derive(Default)]
struct FakeLibrary {
    gamekeys: Vec<Gamekey>,
    discover_error: Option<SyncError>,
    script: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<FetchCall>>,
    cancel_on_first_fetch: Option<CancellationToken>,
}

impl FakeLibrary {
    fn with_keys(n: usize) -> Self {
        Self {
            gamekeys: keys(n),
            ..Self::default()
        }
    }

    fn script(self, steps: Vec<Step>) -> Self {
        *self.script.lock().unwrap() = steps.into();
        self
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn cookies_used(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|c| c.cookie.clone()).collect()
    }

    fn keys_requested(&self, call: usize) -> Vec<Gamekey> {
        self.calls.lock().unwrap()[call].gamekeys.clone()
    }
}

#[async_trait]
impl ILibraryProvider for FakeLibrary {
    async fn discover_gamekeys(&self, _session: &Session) -> Result<Vec<Gamekey>, SyncError> {
        match &self.discover_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.gamekeys.clone()),
        }
    }

    async fn fetch_orders(
        &self,
        session: &Session,
        gamekeys: &[Gamekey],
    ) -> Result<Value, SyncError> {
        let first = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(FetchCall {
                gamekeys: gamekeys.to_vec(),
                cookie: session.cookie_header(),
            });
            calls.len() == 1
        };
        if first {
            if let Some(token) = &self.cancel_on_first_fetch {
                token.cancel();
            }
        }

        let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Orders);
        match step {
            Step::Orders => Ok(orders_for(gamekeys)),
            Step::Fail(err) => Err(err),
            Step::Raw(value) => Ok(value),
        }
    }
}

fn keys(n: usize) -> Vec<Gamekey> {
    (0..n)
        .map(|i| Gamekey::new(format!("key{i:05}")).unwrap())
        .collect()
}

/// One order per key, each with one product and one download
fn orders_for(gamekeys: &[Gamekey]) -> Value {
    let orders: Map<String, Value> = gamekeys
        .iter()
        .map(|key| {
            let order = json!({
                "gamekey": key.as_str(),
                "created": "2023-04-01T12:00:00.000000",
                "amount_spent": 12.5,
                "currency": "USD",
                "product": {"human_name": format!("Bundle {key}"), "category": "bundle"},
                "subproducts": [{
                    "human_name": format!("Dungeon Quest {key}"),
                    "machine_name": format!("dungeonquest_{key}"),
                    "payee": {"human_name": "Studio"},
                    "downloads": [{
                        "platform": "windows",
                        "download_struct": [{
                            "name": "Installer",
                            "url": {"web": format!("https://dl.example.com/{key}/setup.exe")},
                            "file_size": 1024,
                            "md5": "d41d8cd98f00b204e9800998ecf8427e"
                        }]
                    }]
                }]
            });
            (key.to_string(), order)
        })
        .collect();
    Value::Object(orders)
}

// ============================================================================
// Storage fakes
// ============================================================================

#[derive(Default)]
struct FakeSyncer {
    bundles: Mutex<Vec<BundleRecord>>,
    products: Mutex<Vec<(ProductRecord, Categorization)>>,
    downloads: Mutex<Vec<DownloadRecord>>,
    runs: Mutex<Vec<SyncRun>>,
    reject_product_suffix: Option<String>,
}

impl FakeSyncer {
    fn bundle_count(&self) -> usize {
        self.bundles.lock().unwrap().len()
    }

    fn product_count(&self) -> usize {
        self.products.lock().unwrap().len()
    }

    fn download_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }

    fn runs(&self) -> Vec<SyncRun> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl IDataSyncer for FakeSyncer {
    async fn upsert_bundle(&self, bundle: &BundleRecord) -> Result<(), SyncError> {
        self.bundles.lock().unwrap().push(bundle.clone());
        Ok(())
    }

    async fn upsert_product(
        &self,
        product: &ProductRecord,
        categorization: &Categorization,
    ) -> Result<(), SyncError> {
        if let Some(suffix) = &self.reject_product_suffix {
            if product.name.ends_with(suffix.as_str()) {
                return Err(SyncError::Persistence("constraint violated".into()));
            }
        }
        self.products
            .lock()
            .unwrap()
            .push((product.clone(), categorization.clone()));
        Ok(())
    }

    async fn upsert_download(&self, download: &DownloadRecord) -> Result<(), SyncError> {
        self.downloads.lock().unwrap().push(download.clone());
        Ok(())
    }

    async fn record_sync_run(&self, run: &SyncRun) -> Result<(), SyncError> {
        self.runs.lock().unwrap().push(run.clone());
        Ok(())
    }
}

struct FixedInterval(Result<bool, SyncError>);

#[async_trait]
impl ISyncIntervalPolicy for FixedInterval {
    async fn is_sync_due(&self, _now: DateTime<Utc>) -> Result<bool, SyncError> {
        self.0.clone()
    }
}

struct FailingCategorizer;

impl ICategorizer for FailingCategorizer {
    fn categorize(&self, _product: &ProductRecord) -> Result<Categorization, SyncError> {
        Err(SyncError::Parse("no rules loaded".into()))
    }
}

// ============================================================================
// Authentication fakes
// ============================================================================

#[derive(Default)]
struct MemoryStore {
    session: Mutex<Option<Session>>,
}

impl MemoryStore {
    fn stored(&self) -> Option<Session> {
        self.session.lock().unwrap().clone()
    }
}

#[async_trait]
impl ISessionStore for MemoryStore {
    async fn save(&self, session: &Session) -> Result<(), SessionStoreError> {
        *self.session.lock().unwrap() = Some(session.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Session, SessionStoreError> {
        self.stored().ok_or(SessionStoreError::NotFound)
    }

    async fn invalidate(&self) -> Result<(), SessionStoreError> {
        *self.session.lock().unwrap() = None;
        Ok(())
    }

    async fn inspect(&self) -> Result<Option<SessionSummary>, SessionStoreError> {
        Ok(None)
    }
}

struct FakeBrowser {
    reject_credentials: bool,
}

#[async_trait]
impl IBrowserDriver for FakeBrowser {
    async fn navigate(&self, _url: &str) -> Result<(), SyncError> {
        Ok(())
    }

    async fn submit_credentials(&self, _email: &str, _password: &str) -> Result<(), SyncError> {
        if self.reject_credentials {
            return Err(SyncError::authentication("invalid credentials"));
        }
        Ok(())
    }

    async fn detect_secondary_challenge(&self) -> Result<bool, SyncError> {
        Ok(false)
    }

    async fn submit_challenge_code(&self, _code: &str) -> Result<bool, SyncError> {
        Ok(false)
    }

    async fn current_cookies(&self) -> Result<HashMap<String, String>, SyncError> {
        Ok(HashMap::from([(
            "_simpleauth_sess".to_string(),
            "fresh".to_string(),
        )]))
    }
}

struct AcceptingProbe;

#[async_trait]
impl ISessionProbe for AcceptingProbe {
    async fn probe(&self, _session: &Session) -> Result<(), SyncError> {
        Ok(())
    }
}

struct NoMfa;

#[async_trait]
impl IMfaCodeSupplier for NoMfa {
    async fn request_code(&self, _challenge: &MfaChallenge) -> Option<String> {
        None
    }
}

struct StaticCredentials;

impl ICredentialSource for StaticCredentials {
    fn credentials(&self) -> Result<Credentials, SyncError> {
        Ok(Credentials::new("me@example.com", "hunter2"))
    }
}

fn fresh_session() -> Session {
    let now = Utc::now();
    let cookies = BTreeMap::from([("_simpleauth_sess".to_string(), "old".to_string())]);
    Session::new(
        cookies,
        "https://www.humblebundle.com",
        now,
        now + chrono::Duration::hours(12),
    )
}

// ============================================================================
// Rig
// ============================================================================

struct Rig {
    library: Arc<FakeLibrary>,
    syncer: Arc<FakeSyncer>,
    store: Arc<MemoryStore>,
    orchestrator: SyncOrchestrator,
}

struct RigBuilder {
    library: FakeLibrary,
    syncer: FakeSyncer,
    categorizer: Arc<dyn ICategorizer>,
    interval: Result<bool, SyncError>,
    with_session: bool,
    reject_login: bool,
    batch_size: usize,
    budget: usize,
    cancel: Option<CancellationToken>,
}

impl RigBuilder {
    fn new(library: FakeLibrary) -> Self {
        Self {
            library,
            syncer: FakeSyncer::default(),
            categorizer: Arc::new(KeywordCategorizer::new()),
            interval: Ok(true),
            with_session: true,
            reject_login: false,
            batch_size: 35,
            budget: 1000,
            cancel: None,
        }
    }

    fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    fn build(self) -> Rig {
        let store = Arc::new(MemoryStore::default());
        if self.with_session {
            *store.session.lock().unwrap() = Some(fresh_session());
        }
        let auth = AuthStateMachine::new(
            AuthPorts {
                store: store.clone(),
                browser: Arc::new(FakeBrowser {
                    reject_credentials: self.reject_login,
                }),
                probe: Arc::new(AcceptingProbe),
                mfa: Arc::new(NoMfa),
                credentials: Arc::new(StaticCredentials),
            },
            AuthSettings::default(),
        );

        let library = Arc::new(self.library);
        let syncer = Arc::new(self.syncer);
        let ports = SyncPorts {
            library: library.clone(),
            syncer: syncer.clone(),
            categorizer: self.categorizer,
            interval: Arc::new(FixedInterval(self.interval)),
        };
        let settings = SyncSettings {
            batch_size: self.batch_size,
            retry: RetryPolicy::batch(),
        };
        let limiter = Arc::new(SlidingWindowRateLimiter::with_window(
            self.budget,
            Duration::from_secs(60),
        ));

        let mut orchestrator = SyncOrchestrator::new(auth, ports, limiter, settings);
        if let Some(token) = self.cancel {
            orchestrator = orchestrator.with_cancellation(token);
        }

        Rig {
            library,
            syncer,
            store,
            orchestrator,
        }
    }
}

fn transient() -> Step {
    Step::Fail(SyncError::transient("503 Service Unavailable"))
}

fn rejected() -> Step {
    Step::Fail(SyncError::SessionRejected("401 Unauthorized".into()))
}

// ============================================================================
// Batching and retries
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_forty_gamekeys_with_transient_second_batch() {
    let library = FakeLibrary::with_keys(40).script(vec![
        Step::Orders,
        transient(),
        transient(),
        transient(),
        Step::Orders,
    ]);
    let mut rig = RigBuilder::new(library).build();
    let start = Instant::now();

    let run = rig.orchestrator.run(false).await;

    assert_eq!(run.status(), SyncStatus::Success);
    assert_eq!(run.gamekeys_discovered(), 40);
    assert_eq!(run.batches_total(), 2);
    assert_eq!(run.batches_succeeded(), 2);
    assert_eq!(rig.library.call_count(), 5);
    assert_eq!(rig.library.keys_requested(0).len(), 35);
    assert_eq!(rig.library.keys_requested(4).len(), 5);
    assert_eq!(rig.library.keys_requested(1), rig.library.keys_requested(4));

    // backoff of 1s + 2s + 4s
    assert!(start.elapsed() >= Duration::from_secs(7));

    assert_eq!(run.bundles_processed(), 40);
    assert_eq!(run.items_processed(), 40);
    assert_eq!(run.downloads_processed(), 40);
    assert_eq!(rig.syncer.bundle_count(), 40);
    assert_eq!(rig.syncer.product_count(), 40);
    assert_eq!(rig.syncer.download_count(), 40);
    assert_eq!(rig.syncer.runs().len(), 1);
    assert_eq!(rig.syncer.runs()[0].id(), run.id());
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_batch_does_not_stop_the_others() {
    let library = FakeLibrary::with_keys(5).script(vec![
        Step::Orders,
        transient(),
        transient(),
        transient(),
        transient(),
        Step::Orders,
    ]);
    let mut rig = RigBuilder::new(library).batch_size(2).build();

    let run = rig.orchestrator.run(false).await;

    assert_eq!(run.status(), SyncStatus::Partial);
    assert_eq!(run.batches_total(), 3);
    assert_eq!(run.batches_succeeded(), 2);
    assert_eq!(run.batches_failed(), 1);
    assert_eq!(run.failed_gamekeys(), &keys(5)[2..4]);
    assert_eq!(rig.library.call_count(), 6);
    assert_eq!(rig.syncer.bundle_count(), 3);
    assert!(run.errors().iter().any(|e| e.batch == Some(1)));
}

#[tokio::test(start_paused = true)]
async fn test_every_batch_failing_is_failed() {
    let library = FakeLibrary::with_keys(2).script(
        (0..8)
            .map(|_| Step::Fail(SyncError::RemoteApi {
                status: Some(404),
                message: "not found".into(),
            }))
            .collect(),
    );
    let mut rig = RigBuilder::new(library).batch_size(1).build();

    let run = rig.orchestrator.run(false).await;

    assert_eq!(run.status(), SyncStatus::Failed);
    assert_eq!(run.batches_failed(), 2);
    // non-transient errors are not retried
    assert_eq!(rig.library.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_hint_is_honoured() {
    let library = FakeLibrary::with_keys(1).script(vec![
        Step::Fail(SyncError::TransientNetwork {
            message: "429 Too Many Requests".into(),
            retry_after: Some(Duration::from_secs(20)),
        }),
        Step::Orders,
    ]);
    let mut rig = RigBuilder::new(library).build();
    let start = Instant::now();

    let run = rig.orchestrator.run(false).await;

    assert_eq!(run.status(), SyncStatus::Success);
    assert!(start.elapsed() >= Duration::from_secs(20));
    assert!(start.elapsed() < Duration::from_secs(21));
}

#[tokio::test(start_paused = true)]
async fn test_requests_respect_rate_limit() {
    let library = FakeLibrary::with_keys(3);
    let mut builder = RigBuilder::new(library).batch_size(1);
    builder.budget = 2;
    let mut rig = builder.build();
    let start = Instant::now();

    let run = rig.orchestrator.run(false).await;

    // discovery and the first fetch pass at once, the other two wait a window
    assert_eq!(run.status(), SyncStatus::Success);
    assert_eq!(rig.library.call_count(), 3);
    assert!(start.elapsed() >= Duration::from_secs(60));
    assert!(start.elapsed() < Duration::from_secs(61));
}

// ============================================================================
// Discovery and session
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_empty_library_is_success_without_fetches() {
    let mut rig = RigBuilder::new(FakeLibrary::default()).build();

    let run = rig.orchestrator.run(false).await;

    assert_eq!(run.status(), SyncStatus::Success);
    assert_eq!(run.gamekeys_discovered(), 0);
    assert_eq!(run.batches_total(), 0);
    assert_eq!(rig.library.call_count(), 0);
    assert_eq!(rig.syncer.runs().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_discovery_failure_fails_run() {
    let library = FakeLibrary {
        discover_error: Some(SyncError::Parse("not a list".into())),
        ..FakeLibrary::with_keys(3)
    };
    let mut rig = RigBuilder::new(library).build();

    let run = rig.orchestrator.run(false).await;

    assert_eq!(run.status(), SyncStatus::Failed);
    assert_eq!(rig.library.call_count(), 0);
    assert_eq!(rig.syncer.runs().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_session_and_failed_login_fails_run() {
    let mut builder = RigBuilder::new(FakeLibrary::with_keys(3));
    builder.with_session = false;
    builder.reject_login = true;
    let mut rig = builder.build();

    let run = rig.orchestrator.run(false).await;

    assert_eq!(run.status(), SyncStatus::Failed);
    assert_eq!(rig.library.call_count(), 0);
    let runs = rig.syncer.runs();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].errors()[0].message.contains("invalid credentials"));
}

#[tokio::test(start_paused = true)]
async fn test_mid_run_rejection_reauthenticates_and_retries_same_batch() {
    let library = FakeLibrary::with_keys(4).script(vec![Step::Orders, rejected(), Step::Orders]);
    let mut rig = RigBuilder::new(library).batch_size(2).build();

    let run = rig.orchestrator.run(false).await;

    assert_eq!(run.status(), SyncStatus::Success);
    assert_eq!(run.batches_succeeded(), 2);
    assert_eq!(
        rig.library.cookies_used(),
        vec![OLD_COOKIE, OLD_COOKIE, FRESH_COOKIE]
    );
    assert_eq!(rig.library.keys_requested(1), rig.library.keys_requested(2));
    assert_eq!(rig.store.stored().unwrap().cookie_header(), FRESH_COOKIE);
}

#[tokio::test(start_paused = true)]
async fn test_second_rejection_aborts_run() {
    let library = FakeLibrary::with_keys(3).script(vec![
        Step::Orders,
        rejected(),
        rejected(),
        Step::Orders,
    ]);
    let mut rig = RigBuilder::new(library).batch_size(1).build();

    let run = rig.orchestrator.run(false).await;

    assert_eq!(run.status(), SyncStatus::Partial);
    assert_eq!(run.batches_succeeded(), 1);
    assert_eq!(run.batches_failed(), 1);
    assert_eq!(rig.library.call_count(), 3);
    assert!(run
        .errors()
        .iter()
        .any(|e| e.batch.is_none() && e.message.contains("1 batches not attempted")));
    assert_eq!(run.failed_gamekeys(), &keys(3)[1..]);
    assert_eq!(rig.syncer.runs().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_reauthentication_aborts_run() {
    let library = FakeLibrary::with_keys(2).script(vec![rejected()]);
    let mut builder = RigBuilder::new(library).batch_size(1);
    builder.reject_login = true;
    let mut rig = builder.build();

    let run = rig.orchestrator.run(false).await;

    assert_eq!(run.status(), SyncStatus::Failed);
    assert_eq!(run.batches_succeeded(), 0);
    assert_eq!(rig.library.call_count(), 1);
    // the rejected batch and the one never attempted
    assert_eq!(run.failed_gamekeys(), &keys(2)[..]);
}

// ============================================================================
// Records
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_unreadable_batch_is_not_retried() {
    let library = FakeLibrary::with_keys(2).script(vec![Step::Raw(json!(["not", "orders"]))]);
    let mut rig = RigBuilder::new(library).batch_size(1).build();

    let run = rig.orchestrator.run(false).await;

    assert_eq!(run.status(), SyncStatus::Partial);
    assert_eq!(run.batches_failed(), 1);
    assert_eq!(run.batches_succeeded(), 1);
    assert_eq!(rig.library.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_record_counts_as_failed_item() {
    let keys = keys(1);
    let mut orders = orders_for(&keys);
    orders[keys[0].as_str()]["subproducts"]
        .as_array_mut()
        .unwrap()
        .push(json!({"machine_name": "nameless"}));
    let library = FakeLibrary::with_keys(1).script(vec![Step::Raw(orders)]);
    let mut rig = RigBuilder::new(library).build();

    let run = rig.orchestrator.run(false).await;

    assert_eq!(run.status(), SyncStatus::Success);
    assert_eq!(run.items_processed(), 1);
    assert_eq!(run.items_failed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_storage_failure_skips_product_downloads() {
    let mut builder = RigBuilder::new(FakeLibrary::with_keys(2));
    builder.syncer.reject_product_suffix = Some("key00001".into());
    let mut rig = builder.build();

    let run = rig.orchestrator.run(false).await;

    assert_eq!(run.status(), SyncStatus::Success);
    assert_eq!(run.bundles_processed(), 2);
    assert_eq!(run.items_processed(), 1);
    assert_eq!(run.items_failed(), 1);
    assert_eq!(rig.syncer.download_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_products_are_categorized() {
    let mut rig = RigBuilder::new(FakeLibrary::with_keys(1)).build();

    rig.orchestrator.run(false).await;

    let products = rig.syncer.products.lock().unwrap();
    assert_eq!(products[0].1.category, "game");
    assert_eq!(products[0].1.subcategory.as_deref(), Some("rpg"));
}

#[tokio::test(start_paused = true)]
async fn test_categorizer_failure_falls_back_to_uncategorized() {
    let mut builder = RigBuilder::new(FakeLibrary::with_keys(1));
    builder.categorizer = Arc::new(FailingCategorizer);
    let mut rig = builder.build();

    let run = rig.orchestrator.run(false).await;

    assert_eq!(run.status(), SyncStatus::Success);
    assert_eq!(run.items_failed(), 0);
    let products = rig.syncer.products.lock().unwrap();
    assert!(products[0].1.is_uncategorized());
}

// ============================================================================
// Interval and cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_recent_sync_is_skipped_and_not_recorded() {
    let mut builder = RigBuilder::new(FakeLibrary::with_keys(3));
    builder.interval = Ok(false);
    let mut rig = builder.build();

    let run = rig.orchestrator.run(false).await;

    assert!(run.was_skipped());
    assert_eq!(run.status(), SyncStatus::Success);
    assert_eq!(rig.library.call_count(), 0);
    assert!(rig.syncer.runs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_force_bypasses_interval() {
    let mut builder = RigBuilder::new(FakeLibrary::with_keys(3));
    builder.interval = Ok(false);
    let mut rig = builder.build();

    let run = rig.orchestrator.run(true).await;

    assert!(!run.was_skipped());
    assert!(run.forced());
    assert_eq!(rig.library.call_count(), 1);
    assert_eq!(rig.syncer.runs().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unreadable_interval_does_not_block_sync() {
    let mut builder = RigBuilder::new(FakeLibrary::with_keys(1));
    builder.interval = Err(SyncError::Persistence("database locked".into()));
    let mut rig = builder.build();

    let run = rig.orchestrator.run(false).await;

    assert_eq!(run.status(), SyncStatus::Success);
    assert_eq!(rig.library.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_between_batches_is_partial() {
    let token = CancellationToken::new();
    let library = FakeLibrary {
        cancel_on_first_fetch: Some(token.clone()),
        ..FakeLibrary::with_keys(3)
    };
    let mut builder = RigBuilder::new(library).batch_size(1);
    builder.cancel = Some(token);
    let mut rig = builder.build();

    let run = rig.orchestrator.run(false).await;

    assert_eq!(run.status(), SyncStatus::Partial);
    assert!(run.was_cancelled());
    assert_eq!(run.batches_succeeded(), 1);
    assert_eq!(run.batches_failed(), 0);
    assert_eq!(rig.library.call_count(), 1);
    assert_eq!(run.failed_gamekeys(), &keys(3)[1..]);
    assert_eq!(rig.syncer.runs().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff() {
    let token = CancellationToken::new();
    let library = FakeLibrary::with_keys(1).script((0..4).map(|_| transient()).collect());
    let mut builder = RigBuilder::new(library);
    builder.cancel = Some(token.clone());
    let mut rig = builder.build();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        token.cancel();
    });
    let run = rig.orchestrator.run(false).await;

    // first retry at 1s, cancelled during the 2s wait before the second
    assert_eq!(run.status(), SyncStatus::Partial);
    assert!(run.was_cancelled());
    assert_eq!(rig.library.call_count(), 2);
    assert_eq!(run.failed_gamekeys(), &keys(1)[..]);
}
