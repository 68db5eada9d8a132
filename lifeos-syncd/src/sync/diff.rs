//! Normalization, content hashing and classification of pulled records.

use eduplanr_core::{Collection, PushRecord, RemoteDocument};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::{OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339};

use crate::store::{EntityMapping, LocalRecord, RecordCategory};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiffError {
    #[error("remote document has no id")]
    MissingId,
    #[error("invalid {field} timestamp: {value}")]
    InvalidTimestamp { field: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    New,
    Unchanged,
    Changed,
    Deleted,
}

pub fn category_for(collection: Collection) -> RecordCategory {
    match collection {
        Collection::Sessions => RecordCategory::Session,
        Collection::Tasks => RecordCategory::Task,
    }
}

pub fn collection_for(category: RecordCategory) -> Option<Collection> {
    match category {
        RecordCategory::Session => Some(Collection::Sessions),
        RecordCategory::Task => Some(Collection::Tasks),
        RecordCategory::Subject => None,
    }
}

/// Stable id for a record imported from `provider`.
pub fn local_id_for(provider: &str, category: RecordCategory, external_id: &str) -> String {
    format!("{provider}-{category}-{external_id}")
}

/// Rewrites an RFC 3339 timestamp in UTC so equal instants hash equally.
pub fn normalize_timestamp(
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<String>, DiffError> {
    let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    let invalid = || DiffError::InvalidTimestamp {
        field,
        value: value.to_string(),
    };
    let parsed = OffsetDateTime::parse(value, &Rfc3339).map_err(|_| invalid())?;
    parsed
        .to_offset(UtcOffset::UTC)
        .format(&Rfc3339)
        .map(Some)
        .map_err(|_| invalid())
}

#[derive(Serialize)]
struct RecordContent<'a> {
    category: &'a str,
    title: &'a str,
    body: Option<&'a str>,
    subject: Option<&'a str>,
    starts_at: Option<&'a str>,
    ends_at: Option<&'a str>,
    due_at: Option<&'a str>,
    completed: bool,
}

impl RecordContent<'_> {
    fn hash(&self) -> String {
        // Field order is fixed by the struct, so the JSON is canonical.
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        format!("{:x}", Sha256::digest(&encoded))
    }
}

/// A pulled document in local shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingRecord {
    pub remote_id: String,
    pub category: RecordCategory,
    pub title: String,
    pub body: Option<String>,
    pub subject: Option<String>,
    pub starts_at: Option<String>,
    pub ends_at: Option<String>,
    pub due_at: Option<String>,
    pub completed: bool,
    pub deleted: bool,
}

impl IncomingRecord {
    pub fn from_remote(collection: Collection, doc: RemoteDocument) -> Result<Self, DiffError> {
        if doc.id.trim().is_empty() {
            return Err(DiffError::MissingId);
        }
        Ok(Self {
            starts_at: normalize_timestamp("start_time", doc.start_time.as_deref())?,
            ends_at: normalize_timestamp("end_time", doc.end_time.as_deref())?,
            due_at: normalize_timestamp("due_date", doc.due_date.as_deref())?,
            remote_id: doc.id,
            category: category_for(collection),
            title: doc.title,
            body: doc.notes,
            subject: doc.subject,
            completed: doc.completed,
            deleted: doc.deleted,
        })
    }

    pub fn content_hash(&self) -> String {
        RecordContent {
            category: self.category.as_str(),
            title: &self.title,
            body: self.body.as_deref(),
            subject: self.subject.as_deref(),
            starts_at: self.starts_at.as_deref(),
            ends_at: self.ends_at.as_deref(),
            due_at: self.due_at.as_deref(),
            completed: self.completed,
        }
        .hash()
    }

    pub fn into_local(
        self,
        local_id: String,
        user_id: &str,
        provider: &str,
        push_eligible: bool,
        now: i64,
    ) -> LocalRecord {
        LocalRecord {
            id: local_id,
            user_id: user_id.to_string(),
            category: self.category,
            title: self.title,
            body: self.body,
            subject: self.subject,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            due_at: self.due_at,
            completed: self.completed,
            source: provider.to_string(),
            external_id: Some(self.remote_id),
            push_eligible,
            last_error: None,
            rejected_hash: None,
            updated_at: now,
        }
    }
}

pub fn record_hash(record: &LocalRecord) -> String {
    RecordContent {
        category: record.category.as_str(),
        title: &record.title,
        body: record.body.as_deref(),
        subject: record.subject.as_deref(),
        starts_at: record.starts_at.as_deref(),
        ends_at: record.ends_at.as_deref(),
        due_at: record.due_at.as_deref(),
        completed: record.completed,
    }
    .hash()
}

pub fn classify(
    incoming_hash: &str,
    deleted: bool,
    mapping: Option<&EntityMapping>,
    local: Option<&LocalRecord>,
) -> Classification {
    if deleted {
        return if mapping.is_some() || local.is_some() {
            Classification::Deleted
        } else {
            Classification::Unchanged
        };
    }
    match (mapping, local) {
        (Some(mapping), Some(_)) if mapping.last_synced_hash == incoming_hash => {
            Classification::Unchanged
        }
        (Some(_), Some(_)) => Classification::Changed,
        _ => Classification::New,
    }
}

pub fn to_push_record(
    record: &LocalRecord,
    collection: Collection,
    remote_id: Option<String>,
) -> PushRecord {
    PushRecord {
        local_id: record.id.clone(),
        collection,
        remote_id,
        title: record.title.clone(),
        notes: record.body.clone(),
        subject: record.subject.clone(),
        start_time: record.starts_at.clone(),
        end_time: record.ends_at.clone(),
        due_date: record.due_at.clone(),
        completed: record.completed,
    }
}
