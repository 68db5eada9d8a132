//! Reconciliation of one (user, provider) pair per job.
//!
//! A job pulls each remote collection, diffs it against the local store and
//! entity mappings, applies the result and then pushes local edits. Every
//! job is bracketed by the ledger: it starts with [`SyncLedger::begin`] and
//! always ends with [`SyncLedger::complete`], and the integration config
//! leaves `syncing` when the job returns. A disconnect during the job fails
//! it at the next write, since mapping and cursor writes require a
//! connected pair.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use eduplanr_core::Collection;
use lifeos_integrations::{SyncMode, describe, ids::PROVIDER_EDUPLANR};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::clock::Clock;
use super::diff::{
    Classification, DiffError, IncomingRecord, classify, collection_for, local_id_for,
    normalize_timestamp, record_hash, to_push_record,
};
use super::ledger::{JobOutcome, LedgerError, SyncLedger, SyncTrigger, TIMEOUT_REASON};
use super::provider::{ProviderError, RemoteProvider};
use crate::credentials::CredentialRefresher;
use crate::store::{
    Credentials, EntityMapping, IntegrationConfig, IntegrationStatus, LocalRecord, RecordCategory,
    StoreError, SyncStore,
};

pub const DEFAULT_CEILING: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{provider} is not connected or sync is disabled for {user_id}")]
    NotConnected { user_id: String, provider: String },
    #[error("provider is not supported by the sync engine: {0}")]
    UnsupportedProvider(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid record: {0}")]
    InvalidRecord(#[from] DiffError),
}

impl EngineError {
    pub fn is_already_running(&self) -> bool {
        matches!(self, EngineError::Ledger(LedgerError::AlreadyRunning { .. }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncScope {
    Full,
    /// Local edits only; used by the change watcher.
    PushOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Pulling,
    Diffing,
    Applying,
    Pushing,
    Failed,
}

impl SyncPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Pulling => "pulling",
            SyncPhase::Diffing => "diffing",
            SyncPhase::Applying => "applying",
            SyncPhase::Pushing => "pushing",
            SyncPhase::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    Credentials,
    Pull(Collection),
    Push,
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStep::Credentials => f.write_str("credentials"),
            SyncStep::Pull(collection) => f.write_str(collection.as_str()),
            SyncStep::Push => f.write_str("push"),
        }
    }
}

/// A step of the job that failed while the rest carried on.
#[derive(Debug)]
pub struct StepFailure {
    pub step: SyncStep,
    pub error: ProviderError,
}

#[derive(Debug)]
pub struct SyncReport {
    pub job_id: String,
    pub outcome: JobOutcome,
    pub status: IntegrationStatus,
    pub pulled: u32,
    pub pushed: u32,
    pub rejected: u32,
    pub failures: Vec<StepFailure>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatusView {
    pub status: IntegrationStatus,
    pub last_synced: Option<i64>,
    pub last_error: Option<String>,
    pub pull_count: u32,
    pub push_count: u32,
}

#[derive(Debug, Default)]
struct JobRun {
    pulled: u32,
    pushed: u32,
    rejected: u32,
    attempted: usize,
    failures: Vec<StepFailure>,
}

impl JobRun {
    fn outcome(&self) -> JobOutcome {
        if self.failures.is_empty() {
            JobOutcome::Success
        } else if self.failures.len() >= self.attempted {
            JobOutcome::Failed
        } else {
            JobOutcome::Partial
        }
    }

    fn status(&self) -> IntegrationStatus {
        let outcome = self.outcome();
        if outcome == JobOutcome::Failed
            || self.failures.iter().any(|f| f.error.requires_reconnect())
        {
            IntegrationStatus::Error
        } else if outcome == JobOutcome::Partial || self.rejected > 0 {
            IntegrationStatus::Degraded
        } else {
            IntegrationStatus::Idle
        }
    }

    fn error_message(&self) -> Option<String> {
        if let Some(failure) = self.failures.first() {
            return Some(format!("{}: {}", failure.step, failure.error));
        }
        (self.rejected > 0).then(|| format!("{} record(s) rejected by provider", self.rejected))
    }

    fn fail(&mut self, step: SyncStep, error: ProviderError) {
        warn!(%step, %error, "sync step failed");
        self.failures.push(StepFailure { step, error });
    }
}

struct PendingPush {
    record: LocalRecord,
    hash: String,
}

pub struct SyncEngine {
    store: SyncStore,
    ledger: SyncLedger,
    remote: RemoteProvider,
    refresher: CredentialRefresher,
    clock: Arc<dyn Clock>,
    ceiling: Duration,
}

impl SyncEngine {
    pub fn new(
        store: SyncStore,
        ledger: SyncLedger,
        remote: RemoteProvider,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            ledger,
            remote,
            refresher: CredentialRefresher::new(None),
            clock,
            ceiling: DEFAULT_CEILING,
        }
    }

    pub fn with_refresher(mut self, refresher: CredentialRefresher) -> Self {
        self.refresher = refresher;
        self
    }

    pub fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = ceiling;
        self
    }

    pub fn store(&self) -> &SyncStore {
        &self.store
    }

    pub fn ledger(&self) -> &SyncLedger {
        &self.ledger
    }

    pub async fn sync(
        &self,
        user_id: &str,
        provider: &str,
        trigger: SyncTrigger,
        scope: SyncScope,
    ) -> Result<SyncReport, EngineError> {
        if !is_supported(provider) {
            return Err(EngineError::UnsupportedProvider(provider.to_string()));
        }
        let config = self
            .store
            .get_config(user_id, provider)
            .await?
            .filter(|config| config.connected && config.sync_enabled)
            .ok_or_else(|| not_connected(user_id, provider))?;

        let job_id = self.ledger.begin(user_id, provider, trigger).await?;
        info!(%job_id, user_id, provider, %trigger, ?scope, "sync job started");

        let result = match self.store.mark_syncing(user_id, provider).await {
            Ok(true) => {
                match tokio::time::timeout(self.ceiling, self.run_job(&job_id, &config, scope))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(JobAbort::Timeout),
                }
            }
            Ok(false) => Err(JobAbort::Engine(not_connected(user_id, provider))),
            Err(err) => Err(JobAbort::Engine(err.into())),
        };

        let (run, mut outcome, status, mut message) = match result {
            Ok(run) => {
                let outcome = run.outcome();
                let status = run.status();
                let message = run.error_message();
                (run, outcome, status, message)
            }
            Err(abort) => {
                debug!(%job_id, phase = SyncPhase::Failed.as_str(), "sync phase");
                let message = abort.message();
                (
                    JobRun::default(),
                    JobOutcome::Failed,
                    IntegrationStatus::Error,
                    Some(message),
                )
            }
        };

        let finalized = self
            .ledger
            .complete(&job_id, outcome, run.pulled, run.pushed, message.as_deref())
            .await;
        match finalized {
            Ok(()) => {
                let last_synced = matches!(outcome, JobOutcome::Success | JobOutcome::Partial)
                    .then(|| self.clock.now_unix());
                self.finish_config(user_id, provider, status, message.as_deref(), last_synced)
                    .await;
            }
            Err(LedgerError::AlreadyFinalized(_)) => {
                warn!(%job_id, "sync job was superseded before it finished");
                outcome = JobOutcome::Failed;
                message = Some(TIMEOUT_REASON.to_string());
            }
            Err(err) => {
                let reason = err.to_string();
                self.finish_config(user_id, provider, IntegrationStatus::Error, Some(&reason), None)
                    .await;
                return Err(err.into());
            }
        }

        match outcome {
            JobOutcome::Failed => error!(
                %job_id, user_id, provider, error = message.as_deref().unwrap_or_default(),
                "sync job failed"
            ),
            _ => info!(
                %job_id, user_id, provider, %outcome, pulled = run.pulled, pushed = run.pushed,
                "sync job finished"
            ),
        }

        Ok(SyncReport {
            job_id,
            outcome,
            status,
            pulled: run.pulled,
            pushed: run.pushed,
            rejected: run.rejected,
            failures: run.failures,
            error: message,
        })
    }

    /// Writes the job result to the config, retrying once. A config still left
    /// `syncing` is reset by [`SyncEngine::recover`] or by the next job.
    async fn finish_config(
        &self,
        user_id: &str,
        provider: &str,
        status: IntegrationStatus,
        message: Option<&str>,
        last_synced: Option<i64>,
    ) {
        for attempt in 1..=2 {
            match self
                .store
                .finish_sync(user_id, provider, status, message, last_synced)
                .await
            {
                Ok(()) => return,
                Err(err) if attempt == 1 => {
                    warn!(user_id, provider, %err, "failed to record sync result; retrying");
                }
                Err(err) => {
                    error!(user_id, provider, %err, "integration status left as syncing");
                }
            }
        }
    }

    /// Fails the job once the integration was disconnected under it.
    async fn ensure_connected(&self, config: &IntegrationConfig) -> Result<(), EngineError> {
        let connected = self
            .store
            .get_config(&config.user_id, &config.provider)
            .await?
            .is_some_and(|current| current.connected);
        if connected {
            Ok(())
        } else {
            Err(not_connected(&config.user_id, &config.provider))
        }
    }

    async fn run_job(
        &self,
        job_id: &str,
        config: &IntegrationConfig,
        scope: SyncScope,
    ) -> Result<JobRun, JobAbort> {
        let mut run = JobRun::default();
        let mut phase = SyncPhase::Idle;

        let Some(credentials) = self.usable_credentials(config).await? else {
            run.attempted += 1;
            run.fail(SyncStep::Credentials, ProviderError::AuthExpired);
            return Ok(run);
        };

        if scope == SyncScope::Full && config.sync_mode.allows_pull() {
            let mut mappings = self.mappings_by_remote(config).await?;
            for collection in Collection::ALL {
                self.ensure_connected(config).await?;
                run.attempted += 1;
                enter(job_id, &mut phase, SyncPhase::Pulling);
                let since = self
                    .store
                    .get_cursor(&config.user_id, &config.provider, collection.as_str())
                    .await?;
                let state = match self
                    .remote
                    .fetch_remote_state(&credentials, collection, since.as_deref())
                    .await
                {
                    Ok(state) => state,
                    Err(err) => {
                        run.fail(SyncStep::Pull(collection), err);
                        continue;
                    }
                };

                enter(job_id, &mut phase, SyncPhase::Diffing);
                let mut changes = Vec::with_capacity(state.records.len());
                for doc in state.records {
                    let remote_id = doc.id.clone();
                    match IncomingRecord::from_remote(collection, doc) {
                        Ok(incoming) => changes.push(
                            self.plan_change(config, incoming, &mappings).await?,
                        ),
                        Err(err) => warn!(%remote_id, %err, "skipping malformed remote document"),
                    }
                }

                enter(job_id, &mut phase, SyncPhase::Applying);
                for change in changes {
                    run.pulled += self.apply_change(config, change, &mut mappings).await?;
                }
                let advanced = self
                    .store
                    .set_cursor(
                        &config.user_id,
                        &config.provider,
                        collection.as_str(),
                        &state.as_of,
                    )
                    .await?;
                if !advanced {
                    return Err(not_connected(&config.user_id, &config.provider).into());
                }
            }
        }

        if config.sync_mode.allows_push() {
            enter(job_id, &mut phase, SyncPhase::Pushing);
            let batch = self.collect_push_batch(config).await?;
            if !batch.is_empty() {
                self.ensure_connected(config).await?;
                run.attempted += 1;
                self.push_batch(config, &credentials, batch, &mut run).await?;
            }
        }

        enter(job_id, &mut phase, SyncPhase::Idle);
        Ok(run)
    }

    /// Returns credentials that are valid now, refreshing and persisting
    /// them if they are about to expire. `None` means the user must reconnect.
    async fn usable_credentials(
        &self,
        config: &IntegrationConfig,
    ) -> Result<Option<Credentials>, EngineError> {
        let Some(credentials) = config.credentials.clone() else {
            return Ok(None);
        };
        let now = self.clock.now_unix();
        if !self.refresher.needs_refresh(&credentials, now) {
            return Ok(Some(credentials));
        }
        match self.refresher.refresh(&credentials, now).await {
            Ok(refreshed) => {
                if !self
                    .store
                    .save_credentials(&config.user_id, &config.provider, &refreshed)
                    .await?
                {
                    return Err(not_connected(&config.user_id, &config.provider));
                }
                info!(user_id = %config.user_id, provider = %config.provider, "refreshed access token");
                Ok(Some(refreshed))
            }
            Err(err) if credentials.is_expired_at(now) => {
                warn!(user_id = %config.user_id, provider = %config.provider, %err, "token refresh failed");
                Ok(None)
            }
            Err(err) => {
                debug!(%err, "early token refresh failed; current token still valid");
                Ok(Some(credentials))
            }
        }
    }

    async fn mappings_by_remote(
        &self,
        config: &IntegrationConfig,
    ) -> Result<HashMap<(RecordCategory, String), EntityMapping>, EngineError> {
        Ok(self
            .store
            .list_mappings(&config.user_id, &config.provider)
            .await?
            .into_iter()
            .map(|mapping| ((mapping.entity_type, mapping.remote_id.clone()), mapping))
            .collect())
    }

    async fn plan_change(
        &self,
        config: &IntegrationConfig,
        incoming: IncomingRecord,
        mappings: &HashMap<(RecordCategory, String), EntityMapping>,
    ) -> Result<PlannedChange, EngineError> {
        let mapping = mappings
            .get(&(incoming.category, incoming.remote_id.clone()))
            .cloned();
        let local_id = mapping
            .as_ref()
            .map(|mapping| mapping.local_id.clone())
            .unwrap_or_else(|| {
                local_id_for(&config.provider, incoming.category, &incoming.remote_id)
            });
        let existing = self.store.get_record(&config.user_id, &local_id).await?;
        let hash = incoming.content_hash();
        let class = classify(&hash, incoming.deleted, mapping.as_ref(), existing.as_ref());
        Ok(PlannedChange {
            local_id,
            incoming,
            hash,
            class,
            existing,
        })
    }

    /// Applies one classified record and returns how many local writes it made.
    async fn apply_change(
        &self,
        config: &IntegrationConfig,
        change: PlannedChange,
        mappings: &mut HashMap<(RecordCategory, String), EntityMapping>,
    ) -> Result<u32, EngineError> {
        let mode = config.sync_mode;
        let key = (change.incoming.category, change.incoming.remote_id.clone());
        match change.class {
            Classification::Unchanged => Ok(0),
            Classification::Deleted => {
                if !mode.allows_pulled_deletes() {
                    debug!(local_id = %change.local_id, %mode, "ignoring remote deletion");
                    return Ok(0);
                }
                self.store
                    .delete_record(&config.user_id, &change.local_id)
                    .await?;
                mappings.remove(&key);
                Ok(1)
            }
            Classification::Changed | Classification::New
                if change.existing.is_some() && !mode.allows_pulled_updates() =>
            {
                debug!(local_id = %change.local_id, %mode, "keeping existing local record");
                Ok(0)
            }
            Classification::Changed | Classification::New => {
                let push_eligible = change
                    .existing
                    .as_ref()
                    .is_some_and(|existing| existing.push_eligible);
                let record = change.incoming.into_local(
                    change.local_id,
                    &config.user_id,
                    &config.provider,
                    push_eligible,
                    self.clock.now_unix(),
                );
                let mapping = EntityMapping {
                    user_id: config.user_id.clone(),
                    provider: config.provider.clone(),
                    local_id: record.id.clone(),
                    entity_type: record.category,
                    remote_id: key.1.clone(),
                    last_synced_hash: change.hash,
                };
                // The mapping write is refused once the pair is disconnected,
                // so it goes first to keep the record out as well.
                if !self.store.upsert_mapping(&mapping).await? {
                    return Err(not_connected(&config.user_id, &config.provider));
                }
                self.store.upsert_record(&record).await?;
                mappings.insert(key, mapping);
                Ok(1)
            }
        }
    }

    async fn collect_push_batch(
        &self,
        config: &IntegrationConfig,
    ) -> Result<Vec<PendingPush>, EngineError> {
        let mappings: HashMap<String, EntityMapping> = self
            .store
            .list_mappings(&config.user_id, &config.provider)
            .await?
            .into_iter()
            .map(|mapping| (mapping.local_id.clone(), mapping))
            .collect();
        let candidates = self
            .store
            .list_push_candidates(&config.user_id, &config.provider)
            .await?;

        Ok(candidates
            .into_iter()
            .filter_map(|record| {
                let hash = record_hash(&record);
                let synced = mappings
                    .get(&record.id)
                    .is_some_and(|mapping| mapping.last_synced_hash == hash);
                let rejected = record.rejected_hash.as_deref() == Some(hash.as_str());
                (!synced && !rejected).then_some(PendingPush { record, hash })
            })
            .collect())
    }

    async fn push_batch(
        &self,
        config: &IntegrationConfig,
        credentials: &Credentials,
        batch: Vec<PendingPush>,
        run: &mut JobRun,
    ) -> Result<(), EngineError> {
        let existing: HashMap<String, String> = self
            .store
            .list_mappings(&config.user_id, &config.provider)
            .await?
            .into_iter()
            .map(|mapping| (mapping.local_id, mapping.remote_id))
            .collect();
        let records: Vec<_> = batch
            .iter()
            .filter_map(|pending| {
                let collection = collection_for(pending.record.category)?;
                let remote_id = existing.get(&pending.record.id).cloned().or_else(|| {
                    (pending.record.source == config.provider)
                        .then(|| pending.record.external_id.clone())
                        .flatten()
                });
                Some(to_push_record(&pending.record, collection, remote_id))
            })
            .collect();

        let result = match self.remote.push_local_changes(credentials, &records).await {
            Ok(result) => result,
            Err(err) => {
                run.fail(SyncStep::Push, err);
                return Ok(());
            }
        };

        let by_id: HashMap<&str, &PendingPush> = batch
            .iter()
            .map(|pending| (pending.record.id.as_str(), pending))
            .collect();
        for accepted in &result.accepted {
            let Some(pending) = by_id.get(accepted.local_id.as_str()) else {
                warn!(local_id = %accepted.local_id, "provider accepted an unknown record");
                continue;
            };
            let mapped = self
                .store
                .upsert_mapping(&EntityMapping {
                    user_id: config.user_id.clone(),
                    provider: config.provider.clone(),
                    local_id: pending.record.id.clone(),
                    entity_type: pending.record.category,
                    remote_id: accepted.remote_id.clone(),
                    last_synced_hash: pending.hash.clone(),
                })
                .await?;
            if !mapped {
                return Err(not_connected(&config.user_id, &config.provider));
            }
            if pending.record.last_error.is_some() || pending.record.rejected_hash.is_some() {
                self.store
                    .clear_record_error(&config.user_id, &pending.record.id)
                    .await?;
            }
            run.pushed += 1;
        }
        for rejected in &result.rejected {
            let Some(pending) = by_id.get(rejected.local_id.as_str()) else {
                warn!(local_id = %rejected.local_id, "provider rejected an unknown record");
                continue;
            };
            warn!(local_id = %rejected.local_id, reason = %rejected.reason, "record rejected by provider");
            self.store
                .mark_rejected(
                    &config.user_id,
                    &pending.record.id,
                    &rejected.reason,
                    &pending.hash,
                )
                .await?;
            run.rejected += 1;
        }
        Ok(())
    }

    /// Finalizes jobs orphaned by a previous process and flags their configs.
    pub async fn recover(&self) -> Result<usize, EngineError> {
        let pairs = self.ledger.recover_interrupted().await?;
        for (user_id, provider) in &pairs {
            warn!(user_id, provider, "failing sync job interrupted by shutdown");
            self.store
                .finish_sync(
                    user_id,
                    provider,
                    IntegrationStatus::Error,
                    Some(super::ledger::INTERRUPTED_REASON),
                    None,
                )
                .await?;
        }
        for (user_id, provider) in self
            .store
            .reset_orphaned_syncing(super::ledger::INTERRUPTED_REASON)
            .await?
        {
            warn!(user_id, provider, "integration was left syncing without a job");
        }
        Ok(pairs.len())
    }

    pub async fn connect(
        &self,
        user_id: &str,
        provider: &str,
        credentials: Credentials,
        sync_mode: Option<SyncMode>,
    ) -> Result<IntegrationConfig, EngineError> {
        let descriptor =
            describe(provider).ok_or_else(|| EngineError::UnsupportedProvider(provider.into()))?;
        let previous = self.store.get_config(user_id, provider).await?;
        let config = IntegrationConfig {
            user_id: user_id.to_string(),
            provider: provider.to_string(),
            connected: true,
            sync_enabled: true,
            sync_mode: sync_mode.unwrap_or(descriptor.default_sync_mode),
            status: IntegrationStatus::Idle,
            credentials: Some(credentials),
            last_synced: previous.and_then(|previous| previous.last_synced),
            last_error: None,
        };
        self.store.upsert_config(&config).await?;
        info!(user_id, provider, mode = %config.sync_mode, "integration connected");
        Ok(config)
    }

    /// Takes effect immediately. A job still running for the pair fails at
    /// its next mapping, cursor or status write, all of which are refused
    /// for a disconnected pair.
    pub async fn disconnect(&self, user_id: &str, provider: &str) -> Result<(), EngineError> {
        if !self.store.disconnect(user_id, provider).await? {
            return Err(not_connected(user_id, provider));
        }
        info!(user_id, provider, "integration disconnected");
        Ok(())
    }

    pub async fn set_sync_enabled(
        &self,
        user_id: &str,
        provider: &str,
        enabled: bool,
    ) -> Result<(), EngineError> {
        if !self
            .store
            .set_sync_enabled(user_id, provider, enabled)
            .await?
        {
            return Err(not_connected(user_id, provider));
        }
        Ok(())
    }

    pub async fn status(
        &self,
        user_id: &str,
        provider: &str,
    ) -> Result<Option<SyncStatusView>, EngineError> {
        let Some(config) = self.store.get_config(user_id, provider).await? else {
            return Ok(None);
        };
        let last_job = self.ledger.latest_finalized(user_id, provider).await?;
        Ok(Some(SyncStatusView {
            status: config.status,
            last_synced: config.last_synced,
            last_error: config.last_error,
            pull_count: last_job.as_ref().map_or(0, |job| job.pulled_count),
            push_count: last_job.as_ref().map_or(0, |job| job.pushed_count),
        }))
    }

    /// Stores a record written by the application. Timestamps are normalized
    /// and `updated_at` is stamped from the engine clock.
    pub async fn upsert_local_record(
        &self,
        mut record: LocalRecord,
    ) -> Result<LocalRecord, EngineError> {
        record.starts_at = normalize_timestamp("starts_at", record.starts_at.as_deref())?;
        record.ends_at = normalize_timestamp("ends_at", record.ends_at.as_deref())?;
        record.due_at = normalize_timestamp("due_at", record.due_at.as_deref())?;
        record.updated_at = self.clock.now_unix();
        self.store.upsert_record(&record).await?;
        Ok(record)
    }

    /// Deletes a record the application removed, together with its mappings
    /// for every provider. Returns `false` if there was no such record.
    pub async fn delete_local_record(
        &self,
        user_id: &str,
        local_id: &str,
    ) -> Result<bool, EngineError> {
        let deleted = self.store.delete_record(user_id, local_id).await?;
        if deleted {
            info!(user_id, local_id, "local record deleted");
        }
        Ok(deleted)
    }
}

fn not_connected(user_id: &str, provider: &str) -> EngineError {
    EngineError::NotConnected {
        user_id: user_id.to_string(),
        provider: provider.to_string(),
    }
}

struct PlannedChange {
    local_id: String,
    incoming: IncomingRecord,
    hash: String,
    class: Classification,
    existing: Option<LocalRecord>,
}

enum JobAbort {
    Timeout,
    Engine(EngineError),
}

impl JobAbort {
    fn message(&self) -> String {
        match self {
            JobAbort::Timeout => TIMEOUT_REASON.to_string(),
            JobAbort::Engine(err) => err.to_string(),
        }
    }
}

impl From<EngineError> for JobAbort {
    fn from(err: EngineError) -> Self {
        JobAbort::Engine(err)
    }
}

impl From<StoreError> for JobAbort {
    fn from(err: StoreError) -> Self {
        JobAbort::Engine(err.into())
    }
}

fn enter(job_id: &str, phase: &mut SyncPhase, next: SyncPhase) {
    if *phase != next {
        debug!(job_id, from = phase.as_str(), to = next.as_str(), "sync phase");
        *phase = next;
    }
}

/// Providers the engine has a remote client for.
pub fn is_supported(provider: &str) -> bool {
    provider == PROVIDER_EDUPLANR
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
