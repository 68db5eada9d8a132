use std::sync::Arc;

use eduplanr_core::{
    ApiErrorClass, BatchResult, Collection, EduPlanrClient, EduPlanrError, PushRecord,
    RemoteDocument,
};
use thiserror::Error;

use super::clock::Clock;
use crate::store::Credentials;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("credentials expired or were revoked")]
    AuthExpired,
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),
    #[error("remote rejected the request: {0}")]
    RemoteRejected(String),
    #[error("remote account not found, reconnect required")]
    NotFound,
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::RemoteUnavailable(_))
    }

    /// The integration cannot make progress until the user reconnects.
    pub fn requires_reconnect(&self) -> bool {
        matches!(self, ProviderError::AuthExpired | ProviderError::NotFound)
    }
}

impl From<EduPlanrError> for ProviderError {
    fn from(err: EduPlanrError) -> Self {
        match err.classification() {
            ApiErrorClass::Auth => ProviderError::AuthExpired,
            ApiErrorClass::NotFound => ProviderError::NotFound,
            ApiErrorClass::RateLimit | ApiErrorClass::Transient => {
                ProviderError::RemoteUnavailable(err.to_string())
            }
            ApiErrorClass::Permanent => ProviderError::RemoteRejected(err.to_string()),
        }
    }
}

#[derive(Debug)]
pub struct RemoteState {
    pub records: Vec<RemoteDocument>,
    pub as_of: String,
}

/// EduPlanr as seen by the engine. Performs no local writes.
#[derive(Clone)]
pub struct RemoteProvider {
    client: EduPlanrClient,
    clock: Arc<dyn Clock>,
}

impl RemoteProvider {
    pub fn new(client: EduPlanrClient, clock: Arc<dyn Clock>) -> Self {
        Self { client, clock }
    }

    pub async fn fetch_remote_state(
        &self,
        credentials: &Credentials,
        collection: Collection,
        since: Option<&str>,
    ) -> Result<RemoteState, ProviderError> {
        self.ensure_fresh(credentials)?;
        let page = self
            .client
            .list_collection(
                &credentials.access_token,
                &credentials.remote_user_id,
                collection,
                since,
            )
            .await?;
        Ok(RemoteState {
            records: page.items,
            as_of: page.as_of,
        })
    }

    pub async fn push_local_changes(
        &self,
        credentials: &Credentials,
        records: &[PushRecord],
    ) -> Result<BatchResult, ProviderError> {
        self.ensure_fresh(credentials)?;
        Ok(self
            .client
            .push_batch(
                &credentials.access_token,
                &credentials.remote_user_id,
                records,
            )
            .await?)
    }

    fn ensure_fresh(&self, credentials: &Credentials) -> Result<(), ProviderError> {
        if credentials.is_expired_at(self.clock.now_unix()) {
            return Err(ProviderError::AuthExpired);
        }
        Ok(())
    }
}
