use sqlx::{Row, sqlite::SqliteRow};

use super::{EntityMapping, LOCAL_SOURCE, LocalRecord, StoreError, SyncStore};

const RECORD_COLUMNS: &str = "id, user_id, category, title, body, subject, starts_at, ends_at, due_at, completed, source, external_id, push_eligible, last_error, rejected_hash, updated_at";

impl SyncStore {
    pub async fn upsert_record(&self, record: &LocalRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO local_records (
                id, user_id, category, title, body, subject, starts_at, ends_at, due_at,
                completed, source, external_id, push_eligible, last_error, rejected_hash, updated_at
             )
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT(user_id, id) DO UPDATE SET
                category = excluded.category,
                title = excluded.title,
                body = excluded.body,
                subject = excluded.subject,
                starts_at = excluded.starts_at,
                ends_at = excluded.ends_at,
                due_at = excluded.due_at,
                completed = excluded.completed,
                source = excluded.source,
                external_id = excluded.external_id,
                push_eligible = excluded.push_eligible,
                last_error = excluded.last_error,
                rejected_hash = excluded.rejected_hash,
                updated_at = excluded.updated_at",
        )
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(record.category.as_str())
        .bind(&record.title)
        .bind(&record.body)
        .bind(&record.subject)
        .bind(&record.starts_at)
        .bind(&record.ends_at)
        .bind(&record.due_at)
        .bind(record.completed)
        .bind(&record.source)
        .bind(&record.external_id)
        .bind(record.push_eligible)
        .bind(&record.last_error)
        .bind(&record.rejected_hash)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_record(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<Option<LocalRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM local_records WHERE user_id = ?1 AND id = ?2"
        ))
        .bind(user_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    pub async fn list_records(&self, user_id: &str) -> Result<Vec<LocalRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM local_records WHERE user_id = ?1 ORDER BY id ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(record_from_row).collect()
    }

    /// Records that may flow to `provider`: its own imports plus local
    /// sessions and tasks flagged for export.
    pub async fn list_push_candidates(
        &self,
        user_id: &str,
        provider: &str,
    ) -> Result<Vec<LocalRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM local_records
             WHERE user_id = ?1
               AND category IN ('session', 'task')
               AND (source = ?2 OR (source = ?3 AND push_eligible = 1))
             ORDER BY id ASC"
        ))
        .bind(user_id)
        .bind(provider)
        .bind(LOCAL_SOURCE)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(record_from_row).collect()
    }

    /// Deletes a record together with every mapping that points at it.
    pub async fn delete_record(&self, user_id: &str, id: &str) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM entity_mappings WHERE user_id = ?1 AND local_id = ?2")
            .bind(user_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM local_records WHERE user_id = ?1 AND id = ?2")
            .bind(user_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_rejected(
        &self,
        user_id: &str,
        id: &str,
        reason: &str,
        content_hash: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE local_records SET last_error = ?3, rejected_hash = ?4 WHERE user_id = ?1 AND id = ?2",
        )
        .bind(user_id)
        .bind(id)
        .bind(reason)
        .bind(content_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn clear_record_error(&self, user_id: &str, id: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE local_records SET last_error = NULL, rejected_hash = NULL WHERE user_id = ?1 AND id = ?2",
        )
        .bind(user_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Writes the mapping only while the pair is connected and returns
    /// whether it was written.
    pub async fn upsert_mapping(&self, mapping: &EntityMapping) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO entity_mappings (user_id, provider, local_id, entity_type, remote_id, last_synced_hash)
             SELECT ?1, ?2, ?3, ?4, ?5, ?6
             WHERE EXISTS (
                 SELECT 1 FROM integration_configs
                 WHERE user_id = ?1 AND provider = ?2 AND connected = 1
             )
             ON CONFLICT(user_id, provider, local_id) DO UPDATE SET
                entity_type = excluded.entity_type,
                remote_id = excluded.remote_id,
                last_synced_hash = excluded.last_synced_hash",
        )
        .bind(&mapping.user_id)
        .bind(&mapping.provider)
        .bind(&mapping.local_id)
        .bind(mapping.entity_type.as_str())
        .bind(&mapping.remote_id)
        .bind(&mapping.last_synced_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_mapping(
        &self,
        user_id: &str,
        provider: &str,
        local_id: &str,
    ) -> Result<Option<EntityMapping>, StoreError> {
        let row = sqlx::query(
            "SELECT user_id, provider, local_id, entity_type, remote_id, last_synced_hash
             FROM entity_mappings WHERE user_id = ?1 AND provider = ?2 AND local_id = ?3",
        )
        .bind(user_id)
        .bind(provider)
        .bind(local_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(mapping_from_row).transpose()
    }

    pub async fn list_mappings(
        &self,
        user_id: &str,
        provider: &str,
    ) -> Result<Vec<EntityMapping>, StoreError> {
        let rows = sqlx::query(
            "SELECT user_id, provider, local_id, entity_type, remote_id, last_synced_hash
             FROM entity_mappings WHERE user_id = ?1 AND provider = ?2 ORDER BY local_id ASC",
        )
        .bind(user_id)
        .bind(provider)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(mapping_from_row).collect()
    }

    pub async fn get_cursor(
        &self,
        user_id: &str,
        provider: &str,
        collection: &str,
    ) -> Result<Option<String>, StoreError> {
        let row = sqlx::query(
            "SELECT as_of FROM sync_cursors WHERE user_id = ?1 AND provider = ?2 AND collection = ?3",
        )
        .bind(user_id)
        .bind(provider)
        .bind(collection)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row
            .map(|row| row.try_get::<String, _>("as_of"))
            .transpose()?)
    }

    /// Same connection guard as [`SyncStore::upsert_mapping`].
    pub async fn set_cursor(
        &self,
        user_id: &str,
        provider: &str,
        collection: &str,
        as_of: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO sync_cursors (user_id, provider, collection, as_of)
             SELECT ?1, ?2, ?3, ?4
             WHERE EXISTS (
                 SELECT 1 FROM integration_configs
                 WHERE user_id = ?1 AND provider = ?2 AND connected = 1
             )
             ON CONFLICT(user_id, provider, collection) DO UPDATE SET as_of = excluded.as_of",
        )
        .bind(user_id)
        .bind(provider)
        .bind(collection)
        .bind(as_of)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn record_from_row(row: &SqliteRow) -> Result<LocalRecord, StoreError> {
    let category: String = row.try_get("category")?;
    Ok(LocalRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        category: category.parse()?,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        subject: row.try_get("subject")?,
        starts_at: row.try_get("starts_at")?,
        ends_at: row.try_get("ends_at")?,
        due_at: row.try_get("due_at")?,
        completed: row.try_get("completed")?,
        source: row.try_get("source")?,
        external_id: row.try_get("external_id")?,
        push_eligible: row.try_get("push_eligible")?,
        last_error: row.try_get("last_error")?,
        rejected_hash: row.try_get("rejected_hash")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn mapping_from_row(row: &SqliteRow) -> Result<EntityMapping, StoreError> {
    let entity_type: String = row.try_get("entity_type")?;
    Ok(EntityMapping {
        user_id: row.try_get("user_id")?,
        provider: row.try_get("provider")?,
        local_id: row.try_get("local_id")?,
        entity_type: entity_type.parse()?,
        remote_id: row.try_get("remote_id")?,
        last_synced_hash: row.try_get("last_synced_hash")?,
    })
}
