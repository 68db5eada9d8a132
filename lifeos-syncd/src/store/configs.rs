use sqlx::{Row, sqlite::SqliteRow};

use super::{Credentials, IntegrationConfig, IntegrationStatus, StoreError, SyncStore};

const CONFIG_COLUMNS: &str = "user_id, provider, connected, sync_enabled, sync_mode, status, credentials, last_synced, last_error";

impl SyncStore {
    pub async fn upsert_config(&self, config: &IntegrationConfig) -> Result<(), StoreError> {
        let credentials = config
            .credentials
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        sqlx::query(
            "INSERT INTO integration_configs (
                user_id, provider, connected, sync_enabled, sync_mode, status, credentials, last_synced, last_error
             )
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(user_id, provider) DO UPDATE SET
                connected = excluded.connected,
                sync_enabled = excluded.sync_enabled,
                sync_mode = excluded.sync_mode,
                status = excluded.status,
                credentials = excluded.credentials,
                last_synced = excluded.last_synced,
                last_error = excluded.last_error",
        )
        .bind(&config.user_id)
        .bind(&config.provider)
        .bind(config.connected)
        .bind(config.sync_enabled)
        .bind(config.sync_mode.as_str())
        .bind(config.status.as_str())
        .bind(credentials)
        .bind(config.last_synced)
        .bind(&config.last_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_config(
        &self,
        user_id: &str,
        provider: &str,
    ) -> Result<Option<IntegrationConfig>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {CONFIG_COLUMNS} FROM integration_configs WHERE user_id = ?1 AND provider = ?2"
        ))
        .bind(user_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(config_from_row).transpose()
    }

    pub async fn list_configs(&self) -> Result<Vec<IntegrationConfig>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {CONFIG_COLUMNS} FROM integration_configs ORDER BY user_id ASC, provider ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(config_from_row).collect()
    }

    pub async fn list_configs_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<IntegrationConfig>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {CONFIG_COLUMNS} FROM integration_configs WHERE user_id = ?1 ORDER BY provider ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(config_from_row).collect()
    }

    /// Returns `false` when the pair is no longer connected.
    pub async fn mark_syncing(&self, user_id: &str, provider: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE integration_configs SET status = 'syncing'
             WHERE user_id = ?1 AND provider = ?2 AND connected = 1",
        )
        .bind(user_id)
        .bind(provider)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Records the end of a sync. `last_synced` of `None` keeps the previous
    /// value. A disconnected pair keeps the state `disconnect` left.
    pub async fn finish_sync(
        &self,
        user_id: &str,
        provider: &str,
        status: IntegrationStatus,
        last_error: Option<&str>,
        last_synced: Option<i64>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE integration_configs
             SET status = ?3,
                 last_error = ?4,
                 last_synced = COALESCE(?5, last_synced)
             WHERE user_id = ?1 AND provider = ?2 AND connected = 1",
        )
        .bind(user_id)
        .bind(provider)
        .bind(status.as_str())
        .bind(last_error)
        .bind(last_synced)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns `false` when the pair was disconnected meanwhile.
    pub async fn save_credentials(
        &self,
        user_id: &str,
        provider: &str,
        credentials: &Credentials,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE integration_configs SET credentials = ?3
             WHERE user_id = ?1 AND provider = ?2 AND connected = 1",
        )
        .bind(user_id)
        .bind(provider)
        .bind(serde_json::to_string(credentials)?)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_sync_enabled(
        &self,
        user_id: &str,
        provider: &str,
        enabled: bool,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE integration_configs SET sync_enabled = ?3 WHERE user_id = ?1 AND provider = ?2",
        )
        .bind(user_id)
        .bind(provider)
        .bind(enabled)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Clears credentials and forgets every mapping and cursor of the pair.
    /// Imported records stay in the local store.
    pub async fn disconnect(&self, user_id: &str, provider: &str) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE integration_configs
             SET connected = 0, credentials = NULL, status = 'idle', last_error = NULL
             WHERE user_id = ?1 AND provider = ?2",
        )
        .bind(user_id)
        .bind(provider)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM entity_mappings WHERE user_id = ?1 AND provider = ?2")
            .bind(user_id)
            .bind(provider)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sync_cursors WHERE user_id = ?1 AND provider = ?2")
            .bind(user_id)
            .bind(provider)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Moves configs stuck in `syncing` without a pending job to `error`.
    pub async fn reset_orphaned_syncing(
        &self,
        reason: &str,
    ) -> Result<Vec<(String, String)>, StoreError> {
        let rows = sqlx::query(
            "UPDATE integration_configs
             SET status = 'error', last_error = ?1
             WHERE status = 'syncing'
               AND NOT EXISTS (
                   SELECT 1 FROM sync_jobs
                   WHERE sync_jobs.user_id = integration_configs.user_id
                     AND sync_jobs.provider = integration_configs.provider
                     AND sync_jobs.outcome = 'pending'
               )
             RETURNING user_id, provider",
        )
        .bind(reason)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| Ok((row.try_get("user_id")?, row.try_get("provider")?)))
            .collect()
    }
}

fn config_from_row(row: &SqliteRow) -> Result<IntegrationConfig, StoreError> {
    let sync_mode: String = row.try_get("sync_mode")?;
    let status: String = row.try_get("status")?;
    let credentials: Option<String> = row.try_get("credentials")?;
    Ok(IntegrationConfig {
        user_id: row.try_get("user_id")?,
        provider: row.try_get("provider")?,
        connected: row.try_get("connected")?,
        sync_enabled: row.try_get("sync_enabled")?,
        sync_mode: sync_mode.parse()?,
        status: IntegrationStatus::parse(&status)?,
        credentials: credentials
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?,
        last_synced: row.try_get("last_synced")?,
        last_error: row.try_get("last_error")?,
    })
}
