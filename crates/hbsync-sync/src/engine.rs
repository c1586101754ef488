//! Sync orchestrator - drives one end-to-end synchronization run
//!
//! A run:
//! 1. Checks the minimum-interval policy (unless forced)
//! 2. Obtains a session from the authentication state machine
//! 3. Discovers the library's gamekeys
//! 4. Fetches orders in batches, each through the rate limiter, with
//!    bounded retries for transient failures
//! 5. Decomposes every batch into records and hands them to the storage
//!    collaborator, categorizing products on the way
//! 6. Persists the finished [`SyncRun`]
//!
//! A batch that exhausts its retries is recorded and the run moves on. A
//! session rejected mid-run triggers one re-authentication; a second
//! rejection, or a failed re-authentication, ends the run early.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use hbsync_core::{
    config::Config,
    domain::{
        partition, Categorization, FetchBatch, Gamekey, Session, SyncError, SyncRun,
        DEFAULT_BATCH_SIZE,
    },
    ports::{ICategorizer, IDataSyncer, ILibraryProvider, ISyncIntervalPolicy},
    retry::{sleep_or_cancel, RetryPolicy},
    usecases::AuthStateMachine,
};
use serde_json::Value;

use crate::parse::{decompose_batch, OrderRecords};
use crate::rate_limit::SlidingWindowRateLimiter;

// ============================================================================
// Settings and collaborators
// ============================================================================

/// Tunables for a sync run
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Gamekeys per order fetch
    pub batch_size: usize,
    /// Retry schedule for transient failures of discovery and batch fetches
    pub retry: RetryPolicy,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.sync.batch_size,
            retry: config.sync.retry_policy(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::batch(),
        }
    }
}

/// Collaborators needed by [`SyncOrchestrator`] besides authentication
#[derive(Clone)]
pub struct SyncPorts {
    pub library: Arc<dyn ILibraryProvider>,
    pub syncer: Arc<dyn IDataSyncer>,
    pub categorizer: Arc<dyn ICategorizer>,
    pub interval: Arc<dyn ISyncIntervalPolicy>,
}

// ============================================================================
// Remote calls
// ============================================================================

/// Successful result of a remote call
enum RemoteReply {
    Gamekeys(Vec<Gamekey>),
    Orders(Value),
}

impl RemoteReply {
    fn into_gamekeys(self) -> Vec<Gamekey> {
        match self {
            Self::Gamekeys(keys) => keys,
            Self::Orders(_) => Vec::new(),
        }
    }

    fn into_orders(self) -> Value {
        match self {
            Self::Orders(value) => value,
            Self::Gamekeys(_) => Value::Null,
        }
    }
}

/// Why a remote call gave up
enum CallFailure {
    /// Retries used up, or an error that is never retried
    Exhausted(SyncError),
    /// The session was rejected and could not be replaced
    SessionLost(SyncError),
    Cancelled,
}

// ============================================================================
// SyncOrchestrator
// ============================================================================

/// Runs synchronizations against one library
pub struct SyncOrchestrator {
    auth: AuthStateMachine,
    library: Arc<dyn ILibraryProvider>,
    syncer: Arc<dyn IDataSyncer>,
    categorizer: Arc<dyn ICategorizer>,
    interval: Arc<dyn ISyncIntervalPolicy>,
    limiter: Arc<SlidingWindowRateLimiter>,
    settings: SyncSettings,
    cancel: CancellationToken,
}

impl SyncOrchestrator {
    /// Creates a new orchestrator
    ///
    /// # Arguments
    ///
    /// * `auth` - Supplies the session, and replaces it when rejected mid-run
    /// * `ports` - Library provider, storage, categorizer and interval policy
    /// * `limiter` - Shared outbound request budget
    /// * `settings` - Batch size and retry schedule
    pub fn new(
        auth: AuthStateMachine,
        ports: SyncPorts,
        limiter: Arc<SlidingWindowRateLimiter>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            auth,
            library: ports.library,
            syncer: ports.syncer,
            categorizer: ports.categorizer,
            interval: ports.interval,
            limiter,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `token` to stop the run between batches and abort waits
    ///
    /// The same token is handed to the authentication state machine.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.auth = self.auth.with_cancellation(token.clone());
        self.cancel = token;
        self
    }

    pub fn auth(&self) -> &AuthStateMachine {
        &self.auth
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    // ========================================================================
    // Run
    // ========================================================================

    /// Performs one synchronization run
    ///
    /// Never fails as a whole: every outcome, including a run that could not
    /// start, is reported through the returned [`SyncRun`]. Runs skipped by
    /// the interval policy are not persisted; every other run is.
    #[tracing::instrument(skip(self))]
    pub async fn run(&mut self, force: bool) -> SyncRun {
        let mut run = SyncRun::start(force);

        if !force {
            match self.interval.is_sync_due(Utc::now()).await {
                Ok(true) => {}
                Ok(false) => {
                    info!("Last sync is recent, skipping");
                    run.finish_skipped("minimum interval since the last sync has not elapsed");
                    return run;
                }
                Err(err) => {
                    warn!(error = %err, "Could not read last sync time, syncing anyway");
                }
            }
        }

        info!(run_id = %run.id(), force, "Starting sync run");

        let mut session = match self.auth.ensure_session().await {
            Ok(session) => session,
            Err(SyncError::Cancelled) => {
                run.mark_cancelled();
                run.finish_from_counts(false);
                self.persist(&run).await;
                return run;
            }
            Err(err) => {
                error!(error = %err, "Could not obtain a session");
                run.finish_failed(format!("No usable session: {err}"));
                self.persist(&run).await;
                return run;
            }
        };

        let mut reauth_used = false;
        let gamekeys = match self.call_remote(&mut session, &mut reauth_used, None).await {
            Ok(reply) => reply.into_gamekeys(),
            Err(CallFailure::Cancelled) => {
                run.mark_cancelled();
                run.finish_from_counts(false);
                self.persist(&run).await;
                return run;
            }
            Err(CallFailure::Exhausted(err)) | Err(CallFailure::SessionLost(err)) => {
                error!(error = %err, "Gamekey discovery failed");
                run.finish_failed(format!("Gamekey discovery failed: {err}"));
                self.persist(&run).await;
                return run;
            }
        };

        let mut batches = partition(&gamekeys, self.settings.batch_size);
        run.set_discovered(gamekeys.len(), batches.len());
        info!(
            gamekeys = gamekeys.len(),
            batches = batches.len(),
            batch_size = self.settings.batch_size,
            "Library discovered"
        );

        let total = batches.len();
        let mut aborted = false;
        // First batch left unfetched when the loop stops early
        let mut stopped_at = None;
        for batch in batches.iter_mut() {
            if self.cancel.is_cancelled() {
                info!(remaining = total - batch.index(), "Sync cancelled between batches");
                run.mark_cancelled();
                stopped_at = Some(batch.index());
                break;
            }

            match self
                .call_remote(&mut session, &mut reauth_used, Some(&mut *batch))
                .await
            {
                Ok(reply) => {
                    self.forward(batch, &reply.into_orders(), &mut run).await;
                }
                Err(CallFailure::Exhausted(err)) => {
                    warn!(
                        batch = batch.index(),
                        retries = batch.retry_count(),
                        error = %err,
                        "Batch failed, continuing with the next one"
                    );
                    batch.record_failure(err.to_string());
                    run.record_batch_failure(batch.index(), batch.gamekeys(), err.to_string());
                }
                Err(CallFailure::SessionLost(err)) => {
                    error!(batch = batch.index(), error = %err, "Session lost, aborting run");
                    batch.record_failure(err.to_string());
                    run.record_batch_failure(batch.index(), batch.gamekeys(), err.to_string());
                    let skipped = total - batch.index() - 1;
                    run.record_error(
                        None,
                        format!("Run aborted after session loss; {skipped} batches not attempted"),
                    );
                    aborted = true;
                    stopped_at = Some(batch.index() + 1);
                    break;
                }
                Err(CallFailure::Cancelled) => {
                    info!(batch = batch.index(), "Sync cancelled during batch");
                    run.mark_cancelled();
                    stopped_at = Some(batch.index());
                    break;
                }
            }
        }

        if let Some(first) = stopped_at {
            for batch in batches.iter().skip(first) {
                run.record_unattempted(batch.gamekeys());
            }
        }

        run.finish_from_counts(aborted);
        self.persist(&run).await;

        info!(
            run_id = %run.id(),
            status = %run.status(),
            batches_succeeded = run.batches_succeeded(),
            batches_failed = run.batches_failed(),
            bundles = run.bundles_processed(),
            items = run.items_processed(),
            downloads = run.downloads_processed(),
            items_failed = run.items_failed(),
            "Sync run finished"
        );
        run
    }

    async fn persist(&self, run: &SyncRun) {
        if let Err(err) = self.syncer.record_sync_run(run).await {
            error!(run_id = %run.id(), error = %err, "Failed to record sync run");
        }
    }

    // ========================================================================
    // Retry loop
    // ========================================================================

    /// Performs discovery (`batch` is `None`) or one batch fetch
    ///
    /// Every attempt passes through the rate limiter. Transient errors are
    /// retried per the retry policy, honouring a server `Retry-After` hint.
    /// A rejected session is replaced once per run and the same call retried.
    async fn call_remote(
        &mut self,
        session: &mut Session,
        reauth_used: &mut bool,
        mut batch: Option<&mut FetchBatch>,
    ) -> Result<RemoteReply, CallFailure> {
        let operation = if batch.is_some() { "fetch_orders" } else { "discover_gamekeys" };
        let mut retries = 0u32;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(CallFailure::Cancelled),
                _ = self.limiter.admit() => {}
            }

            let result = match batch.as_deref() {
                Some(batch) => self
                    .library
                    .fetch_orders(session, batch.gamekeys())
                    .await
                    .map(RemoteReply::Orders),
                None => self
                    .library
                    .discover_gamekeys(session)
                    .await
                    .map(RemoteReply::Gamekeys),
            };

            let err = match result {
                Ok(reply) => {
                    if retries > 0 {
                        info!(operation, attempt = retries, "Operation succeeded after retry");
                    }
                    return Ok(reply);
                }
                Err(err) => err,
            };

            if err.is_auth_shaped() {
                if *reauth_used {
                    return Err(CallFailure::SessionLost(err));
                }
                *reauth_used = true;
                warn!(operation, error = %err, "Session rejected, re-authenticating");
                match self.auth.reauthenticate().await {
                    Ok(fresh) => {
                        *session = fresh;
                        continue;
                    }
                    Err(SyncError::Cancelled) => return Err(CallFailure::Cancelled),
                    Err(reauth_err) => return Err(CallFailure::SessionLost(reauth_err)),
                }
            }

            if !err.is_transient() || !self.settings.retry.allows_retry(retries) {
                return Err(CallFailure::Exhausted(err));
            }

            let delay = self.settings.retry.delay_with_hint(retries, err.retry_after());
            warn!(
                operation,
                attempt = retries + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient error, retrying"
            );
            if let Some(batch) = batch.as_deref_mut() {
                batch.record_retry(err.to_string());
            }
            retries += 1;

            if !sleep_or_cancel(delay, &self.cancel).await {
                return Err(CallFailure::Cancelled);
            }
        }
    }

    // ========================================================================
    // Hand-off to storage
    // ========================================================================

    /// Decomposes one batch response and stores its records
    ///
    /// A response that cannot be read at all fails the batch. Individual
    /// malformed or unstorable records only count as failed items.
    async fn forward(&self, batch: &FetchBatch, response: &Value, run: &mut SyncRun) {
        let records = match decompose_batch(response, batch.gamekeys()) {
            Ok(records) => records,
            Err(err) => {
                warn!(batch = batch.index(), error = %err, "Batch response unreadable");
                run.record_batch_failure(batch.index(), batch.gamekeys(), err.to_string());
                return;
            }
        };

        for failure in records.failures {
            debug!(batch = batch.index(), %failure, "Skipping malformed record");
            run.record_item_failure(Some(batch.index()), failure);
        }

        for order in &records.orders {
            self.store_order(batch.index(), order, run).await;
        }

        run.record_batch_success();
        debug!(
            batch = batch.index(),
            orders = records.orders.len(),
            "Batch stored"
        );
    }

    async fn store_order(&self, batch: usize, order: &OrderRecords, run: &mut SyncRun) {
        if let Err(err) = self.syncer.upsert_bundle(&order.bundle).await {
            warn!(gamekey = %order.bundle.gamekey, error = %err, "Failed to store bundle");
            run.record_item_failure(
                Some(batch),
                format!("bundle {}: {err}", order.bundle.gamekey),
            );
            return;
        }
        run.record_bundle();

        for entry in &order.products {
            let product = &entry.product;
            let categorization = match self.categorizer.categorize(product) {
                Ok(categorization) => categorization,
                Err(err) => {
                    debug!(product = %product.name, error = %err, "Categorization failed");
                    Categorization::uncategorized()
                }
            };

            if let Err(err) = self.syncer.upsert_product(product, &categorization).await {
                warn!(product = %product.name, error = %err, "Failed to store product");
                run.record_item_failure(Some(batch), format!("product {}: {err}", product.name));
                continue;
            }
            run.record_item();

            for download in &entry.downloads {
                match self.syncer.upsert_download(download).await {
                    Ok(()) => run.record_download(),
                    Err(err) => {
                        warn!(
                            product = %product.name,
                            platform = %download.platform,
                            error = %err,
                            "Failed to store download"
                        );
                        run.record_item_failure(
                            Some(batch),
                            format!("download {} of {}: {err}", download.name, product.name),
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let settings = SyncSettings::from_config(&Config::default());
        assert_eq!(settings.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(settings.retry, RetryPolicy::batch());
    }

    #[test]
    fn test_reply_conversion() {
        let keys = vec![Gamekey::new("AAAA1111").unwrap()];
        assert_eq!(RemoteReply::Gamekeys(keys.clone()).into_gamekeys(), keys);
        assert!(RemoteReply::Gamekeys(keys).into_orders().is_null());
        assert!(RemoteReply::Orders(Value::Null).into_gamekeys().is_empty());
    }
}
