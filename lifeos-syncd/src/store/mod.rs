//! Local persistent store for integration state and the documents the
//! engine reconciles.
//!
//! Everything lives in one sqlite database: integration configs, the job
//! ledger (see [`crate::sync::ledger`]), local records, entity mappings and
//! per-collection pull cursors.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use lifeos_integrations::{SyncMode, UnknownSyncMode};
use serde::{Deserialize, Serialize};
use sqlx::{SqlitePool, migrate::Migrator, sqlite::SqliteConnectOptions};
use thiserror::Error;

mod configs;
mod records;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XDG data directory is unavailable")]
    MissingDataDir,
    #[error("invalid {column} value: {value}")]
    InvalidValue { column: &'static str, value: String },
    #[error("credentials are not valid JSON: {0}")]
    Credentials(#[from] serde_json::Error),
    #[error("invalid sync mode: {0}")]
    SyncMode(#[from] UnknownSyncMode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationStatus {
    Idle,
    Syncing,
    Degraded,
    Error,
}

impl IntegrationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IntegrationStatus::Idle => "idle",
            IntegrationStatus::Syncing => "syncing",
            IntegrationStatus::Degraded => "degraded",
            IntegrationStatus::Error => "error",
        }
    }

    fn parse(value: &str) -> Result<Self, StoreError> {
        match value {
            "idle" => Ok(IntegrationStatus::Idle),
            "syncing" => Ok(IntegrationStatus::Syncing),
            "degraded" => Ok(IntegrationStatus::Degraded),
            "error" => Ok(IntegrationStatus::Error),
            other => Err(StoreError::InvalidValue {
                column: "status",
                value: other.to_string(),
            }),
        }
    }
}

/// Token bundle owned by one integration config.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds; `None` means the token does not expire.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub remote_user_id: String,
}

impl Credentials {
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .field("remote_user_id", &self.remote_user_id)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrationConfig {
    pub user_id: String,
    pub provider: String,
    pub connected: bool,
    pub sync_enabled: bool,
    pub sync_mode: SyncMode,
    pub status: IntegrationStatus,
    pub credentials: Option<Credentials>,
    pub last_synced: Option<i64>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordCategory {
    Session,
    Task,
    Subject,
}

impl RecordCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordCategory::Session => "session",
            RecordCategory::Task => "task",
            RecordCategory::Subject => "subject",
        }
    }
}

impl fmt::Display for RecordCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordCategory {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "session" => Ok(RecordCategory::Session),
            "task" => Ok(RecordCategory::Task),
            "subject" => Ok(RecordCategory::Subject),
            other => Err(StoreError::InvalidValue {
                column: "category",
                value: other.to_string(),
            }),
        }
    }
}

/// Source tag for records created in the application itself.
pub const LOCAL_SOURCE: &str = "local";

/// A task, study session or subject in the user's local document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRecord {
    pub id: String,
    pub user_id: String,
    pub category: RecordCategory,
    pub title: String,
    pub body: Option<String>,
    pub subject: Option<String>,
    pub starts_at: Option<String>,
    pub ends_at: Option<String>,
    pub due_at: Option<String>,
    pub completed: bool,
    /// [`LOCAL_SOURCE`] or the key of the provider it was imported from.
    pub source: String,
    pub external_id: Option<String>,
    pub push_eligible: bool,
    pub last_error: Option<String>,
    pub rejected_hash: Option<String>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMapping {
    pub user_id: String,
    pub provider: String,
    pub local_id: String,
    pub entity_type: RecordCategory,
    pub remote_id: String,
    pub last_synced_hash: String,
}

#[derive(Clone)]
pub struct SyncStore {
    pool: SqlitePool,
}

impl SyncStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePool::connect(database_url).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn init(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

pub fn default_db_path() -> Result<PathBuf, StoreError> {
    let mut path = dirs::data_dir().ok_or(StoreError::MissingDataDir)?;
    path.push("lifeos-sync");
    path.push("sync.db");
    Ok(path)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
