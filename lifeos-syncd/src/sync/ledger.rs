//! Append-only record of sync attempts.
//!
//! [`SyncLedger::begin`] is the only concurrency gate between sync jobs: the
//! `sync_jobs_single_pending` index allows at most one pending job per
//! (user, provider), so whichever insert lands first wins.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use thiserror::Error;
use uuid::Uuid;

use super::clock::Clock;

pub const TIMEOUT_REASON: &str = "Timeout";
pub const INTERRUPTED_REASON: &str = "Interrupted";

const JOB_COLUMNS: &str = "id, user_id, provider, trigger, started_at, completed_at, outcome, pulled_count, pushed_count, error_message";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("a sync for {user_id}/{provider} is already running")]
    AlreadyRunning { user_id: String, provider: String },
    #[error("sync job not found: {0}")]
    JobNotFound(String),
    #[error("sync job {0} was already finalized")]
    AlreadyFinalized(String),
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("invalid {column} value: {value}")]
    InvalidValue { column: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncTrigger {
    Manual,
    Scheduled,
    Webhook,
    LocalChange,
}

impl SyncTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncTrigger::Manual => "manual",
            SyncTrigger::Scheduled => "scheduled",
            SyncTrigger::Webhook => "webhook",
            SyncTrigger::LocalChange => "local_change",
        }
    }
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncTrigger {
    type Err = LedgerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "manual" => Ok(SyncTrigger::Manual),
            "scheduled" => Ok(SyncTrigger::Scheduled),
            "webhook" => Ok(SyncTrigger::Webhook),
            "local_change" => Ok(SyncTrigger::LocalChange),
            other => Err(LedgerError::InvalidValue {
                column: "trigger",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Pending,
    Success,
    Partial,
    Failed,
}

impl JobOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            JobOutcome::Pending => "pending",
            JobOutcome::Success => "success",
            JobOutcome::Partial => "partial",
            JobOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobOutcome {
    type Err = LedgerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(JobOutcome::Pending),
            "success" => Ok(JobOutcome::Success),
            "partial" => Ok(JobOutcome::Partial),
            "failed" => Ok(JobOutcome::Failed),
            other => Err(LedgerError::InvalidValue {
                column: "outcome",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    pub id: String,
    pub user_id: String,
    pub provider: String,
    pub trigger: SyncTrigger,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub outcome: JobOutcome,
    pub pulled_count: u32,
    pub pushed_count: u32,
    pub error_message: Option<String>,
}

#[derive(Clone)]
pub struct SyncLedger {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    stale_after_secs: i64,
}

impl SyncLedger {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>, stale_after: Duration) -> Self {
        Self {
            pool,
            clock,
            stale_after_secs: stale_after.as_secs() as i64,
        }
    }

    /// Opens a pending job for the pair. Pending jobs older than the
    /// staleness threshold are finalized as failed first.
    pub async fn begin(
        &self,
        user_id: &str,
        provider: &str,
        trigger: SyncTrigger,
    ) -> Result<String, LedgerError> {
        let now = self.clock.now_unix();
        let cutoff = now.saturating_sub(self.stale_after_secs);

        let superseded = sqlx::query(
            "UPDATE sync_jobs
             SET outcome = 'failed', completed_at = ?3, error_message = ?4
             WHERE user_id = ?1 AND provider = ?2 AND outcome = 'pending' AND started_at <= ?5",
        )
        .bind(user_id)
        .bind(provider)
        .bind(now)
        .bind(TIMEOUT_REASON)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        if superseded.rows_affected() > 0 {
            tracing::warn!(user_id, provider, "superseded stale pending sync job");
        }

        let id = Uuid::new_v4().to_string();
        let inserted = sqlx::query(
            "INSERT INTO sync_jobs (id, user_id, provider, trigger, started_at, outcome)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending')",
        )
        .bind(&id)
        .bind(user_id)
        .bind(provider)
        .bind(trigger.as_str())
        .bind(now)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(id),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Err(LedgerError::AlreadyRunning {
                    user_id: user_id.to_string(),
                    provider: provider.to_string(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn complete(
        &self,
        job_id: &str,
        outcome: JobOutcome,
        pulled: u32,
        pushed: u32,
        error: Option<&str>,
    ) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "UPDATE sync_jobs
             SET outcome = ?2, completed_at = ?3, pulled_count = ?4, pushed_count = ?5, error_message = ?6
             WHERE id = ?1 AND outcome = 'pending'",
        )
        .bind(job_id)
        .bind(outcome.as_str())
        .bind(self.clock.now_unix())
        .bind(pulled)
        .bind(pushed)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }
        match self.get_job(job_id).await? {
            Some(_) => Err(LedgerError::AlreadyFinalized(job_id.to_string())),
            None => Err(LedgerError::JobNotFound(job_id.to_string())),
        }
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<SyncJob>, LedgerError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM sync_jobs WHERE id = ?1"))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    pub async fn get_active(
        &self,
        user_id: &str,
        provider: &str,
    ) -> Result<Option<SyncJob>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM sync_jobs
             WHERE user_id = ?1 AND provider = ?2 AND outcome = 'pending'"
        ))
        .bind(user_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    pub async fn latest_finalized(
        &self,
        user_id: &str,
        provider: &str,
    ) -> Result<Option<SyncJob>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM sync_jobs
             WHERE user_id = ?1 AND provider = ?2 AND outcome != 'pending'
             ORDER BY completed_at DESC, rowid DESC
             LIMIT 1"
        ))
        .bind(user_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    /// Most recent jobs first. `provider` of `None` lists every provider.
    pub async fn list_jobs(
        &self,
        user_id: &str,
        provider: Option<&str>,
        limit: u32,
    ) -> Result<Vec<SyncJob>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM sync_jobs
             WHERE user_id = ?1 AND (?2 IS NULL OR provider = ?2)
             ORDER BY started_at DESC, rowid DESC
             LIMIT ?3"
        ))
        .bind(user_id)
        .bind(provider)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(job_from_row).collect()
    }

    /// Fails every job left pending by a previous process and returns the
    /// affected (user, provider) pairs.
    pub async fn recover_interrupted(&self) -> Result<Vec<(String, String)>, LedgerError> {
        let rows = sqlx::query(
            "UPDATE sync_jobs
             SET outcome = 'failed', completed_at = ?1, error_message = ?2
             WHERE outcome = 'pending'
             RETURNING user_id, provider",
        )
        .bind(self.clock.now_unix())
        .bind(INTERRUPTED_REASON)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| -> Result<(String, String), LedgerError> {
                Ok((row.try_get("user_id")?, row.try_get("provider")?))
            })
            .collect()
    }
}

fn job_from_row(row: &SqliteRow) -> Result<SyncJob, LedgerError> {
    let trigger: String = row.try_get("trigger")?;
    let outcome: String = row.try_get("outcome")?;
    Ok(SyncJob {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        provider: row.try_get("provider")?,
        trigger: trigger.parse()?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        outcome: outcome.parse()?,
        pulled_count: row.try_get("pulled_count")?,
        pushed_count: row.try_get("pushed_count")?,
        error_message: row.try_get("error_message")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SyncStore;
    use crate::sync::clock::ManualClock;

    async fn make_ledger(clock: Arc<ManualClock>) -> SyncLedger {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = SyncStore::from_pool(pool.clone());
        store.init().await.unwrap();
        SyncLedger::new(pool, clock, Duration::from_secs(240))
    }

    #[tokio::test]
    async fn second_begin_for_same_pair_is_rejected() {
        let ledger = make_ledger(Arc::new(ManualClock::new(1_000))).await;

        let job = ledger
            .begin("u1", "eduplanr", SyncTrigger::Scheduled)
            .await
            .unwrap();
        let err = ledger
            .begin("u1", "eduplanr", SyncTrigger::LocalChange)
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::AlreadyRunning { .. }));
        assert_eq!(
            ledger.get_active("u1", "eduplanr").await.unwrap().unwrap().id,
            job
        );
        // other pairs are independent
        ledger
            .begin("u1", "google-calendar", SyncTrigger::Manual)
            .await
            .unwrap();
        ledger
            .begin("u2", "eduplanr", SyncTrigger::Manual)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn stale_pending_job_is_superseded() {
        let clock = Arc::new(ManualClock::new(1_000));
        let ledger = make_ledger(clock.clone()).await;
        let stale = ledger
            .begin("u1", "eduplanr", SyncTrigger::Scheduled)
            .await
            .unwrap();

        clock.advance(239);
        assert!(matches!(
            ledger.begin("u1", "eduplanr", SyncTrigger::Manual).await,
            Err(LedgerError::AlreadyRunning { .. })
        ));

        clock.advance(1);
        let fresh = ledger
            .begin("u1", "eduplanr", SyncTrigger::Manual)
            .await
            .unwrap();

        let stale_job = ledger.get_job(&stale).await.unwrap().unwrap();
        assert_eq!(stale_job.outcome, JobOutcome::Failed);
        assert_eq!(stale_job.error_message.as_deref(), Some(TIMEOUT_REASON));
        assert_eq!(stale_job.completed_at, Some(1_240));
        assert_eq!(
            ledger.get_active("u1", "eduplanr").await.unwrap().unwrap().id,
            fresh
        );
    }

    #[tokio::test]
    async fn complete_finalizes_once() {
        let ledger = make_ledger(Arc::new(ManualClock::new(1_000))).await;
        let job = ledger
            .begin("u1", "eduplanr", SyncTrigger::Manual)
            .await
            .unwrap();

        ledger
            .complete(&job, JobOutcome::Partial, 3, 1, Some("tasks: unavailable"))
            .await
            .unwrap();
        let err = ledger
            .complete(&job, JobOutcome::Success, 0, 0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyFinalized(_)));
        assert!(matches!(
            ledger
                .complete("missing", JobOutcome::Success, 0, 0, None)
                .await,
            Err(LedgerError::JobNotFound(_))
        ));

        let finished = ledger.get_job(&job).await.unwrap().unwrap();
        assert_eq!(finished.outcome, JobOutcome::Partial);
        assert_eq!(finished.pulled_count, 3);
        assert_eq!(finished.pushed_count, 1);
        assert!(ledger.get_active("u1", "eduplanr").await.unwrap().is_none());
        assert_eq!(
            ledger
                .latest_finalized("u1", "eduplanr")
                .await
                .unwrap()
                .unwrap()
                .id,
            job
        );
    }

    #[tokio::test]
    async fn list_jobs_returns_newest_first() {
        let clock = Arc::new(ManualClock::new(1_000));
        let ledger = make_ledger(clock.clone()).await;
        let mut ids = Vec::new();
        for _ in 0..3 {
            let job = ledger
                .begin("u1", "eduplanr", SyncTrigger::Scheduled)
                .await
                .unwrap();
            ledger
                .complete(&job, JobOutcome::Success, 0, 0, None)
                .await
                .unwrap();
            ids.push(job);
            clock.advance(10);
        }
        ledger
            .begin("u1", "google-calendar", SyncTrigger::Manual)
            .await
            .unwrap();

        let listed: Vec<_> = ledger
            .list_jobs("u1", Some("eduplanr"), 2)
            .await
            .unwrap()
            .into_iter()
            .map(|job| job.id)
            .collect();
        assert_eq!(listed, vec![ids[2].clone(), ids[1].clone()]);
        assert_eq!(ledger.list_jobs("u1", None, 10).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn recovery_fails_leftover_pending_jobs() {
        let ledger = make_ledger(Arc::new(ManualClock::new(1_000))).await;
        let job = ledger
            .begin("u1", "eduplanr", SyncTrigger::Scheduled)
            .await
            .unwrap();

        let recovered = ledger.recover_interrupted().await.unwrap();

        assert_eq!(recovered, vec![("u1".to_string(), "eduplanr".to_string())]);
        let job = ledger.get_job(&job).await.unwrap().unwrap();
        assert_eq!(job.outcome, JobOutcome::Failed);
        assert_eq!(job.error_message.as_deref(), Some(INTERRUPTED_REASON));
        assert!(ledger.recover_interrupted().await.unwrap().is_empty());
    }
}
