use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.eduplanr.app";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum EduPlanrError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("base url cannot carry path segments: {0}")]
    InvalidBaseUrl(String),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    NotFound,
    RateLimit,
    Transient,
    Permanent,
}

/// Remote collections exposed per EduPlanr user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Sessions,
    Tasks,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Sessions, Collection::Tasks];

    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Sessions => "sessions",
            Collection::Tasks => "tasks",
        }
    }
}

#[derive(Clone)]
pub struct EduPlanrClient {
    http: Client,
    base_url: Url,
}

impl EduPlanrClient {
    pub fn new() -> Result<Self, EduPlanrError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, EduPlanrError> {
        Self::with_base_url_and_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_base_url_and_timeout(
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, EduPlanrError> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            base_url: Url::parse(base_url)?,
        })
    }

    /// Lists documents of `collection` changed since `since` (RFC 3339).
    pub async fn list_collection(
        &self,
        token: &str,
        remote_user: &str,
        collection: Collection,
        since: Option<&str>,
    ) -> Result<RemotePage, EduPlanrError> {
        let mut url = self.user_endpoint(remote_user, collection.as_str())?;
        if let Some(since) = since {
            url.query_pairs_mut().append_pair("since", since);
        }
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn push_batch(
        &self,
        token: &str,
        remote_user: &str,
        records: &[PushRecord],
    ) -> Result<BatchResult, EduPlanrError> {
        let url = self.user_endpoint(remote_user, "batch")?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&BatchRequest { records })
            .send()
            .await?;
        Self::handle_response(response).await
    }

    fn user_endpoint(&self, remote_user: &str, tail: &str) -> Result<Url, EduPlanrError> {
        let mut url = self.base_url.join("/v1/users/")?;
        url.path_segments_mut()
            .map_err(|_| EduPlanrError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(remote_user)
            .push(tail);
        Ok(url)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, EduPlanrError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(EduPlanrError::Api { status, body })
        }
    }
}

impl EduPlanrError {
    pub fn classification(&self) -> ApiErrorClass {
        match self {
            EduPlanrError::Api { status, .. } => classify_api_status(*status),
            EduPlanrError::Request(err) if err.is_decode() || err.is_builder() => {
                ApiErrorClass::Permanent
            }
            EduPlanrError::Request(_) => ApiErrorClass::Transient,
            EduPlanrError::Url(_) | EduPlanrError::InvalidBaseUrl(_) => ApiErrorClass::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            ApiErrorClass::RateLimit | ApiErrorClass::Transient
        )
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::NOT_FOUND {
        ApiErrorClass::NotFound
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(status, StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_EARLY)
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

/// A study session or task as EduPlanr stores it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RemoteDocument {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RemotePage {
    pub items: Vec<RemoteDocument>,
    pub as_of: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PushRecord {
    pub local_id: String,
    pub collection: Collection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    records: &'a [PushRecord],
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct BatchResult {
    #[serde(default)]
    pub accepted: Vec<PushAccepted>,
    #[serde(default)]
    pub rejected: Vec<PushRejected>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PushAccepted {
    pub local_id: String,
    pub remote_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PushRejected {
    pub local_id: String,
    pub reason: String,
}
