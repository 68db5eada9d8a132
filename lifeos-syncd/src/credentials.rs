use eduplanr_core::{OAuthClient, OAuthError};
use thiserror::Error;

use crate::store::Credentials;

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("oauth client is required to refresh expired token")]
    MissingOAuthClient,
    #[error("refresh token is missing")]
    MissingRefreshToken,
    #[error("oauth refresh failed: {0}")]
    OAuth(#[from] OAuthError),
}

/// Refreshes provider access tokens shortly before they expire.
pub struct CredentialRefresher {
    oauth_client: Option<OAuthClient>,
    refresh_skew_secs: i64,
}

impl CredentialRefresher {
    pub fn new(oauth_client: Option<OAuthClient>) -> Self {
        Self {
            oauth_client,
            refresh_skew_secs: 60,
        }
    }

    pub fn needs_refresh(&self, credentials: &Credentials, now: i64) -> bool {
        let Some(expires_at) = credentials.expires_at else {
            return false;
        };
        expires_at <= now.saturating_add(self.refresh_skew_secs)
    }

    /// Exchanges the refresh token for a new bundle. The caller persists it.
    pub async fn refresh(
        &self,
        credentials: &Credentials,
        now: i64,
    ) -> Result<Credentials, CredentialsError> {
        let refresh_token = credentials
            .refresh_token
            .clone()
            .ok_or(CredentialsError::MissingRefreshToken)?;
        let client = self
            .oauth_client
            .as_ref()
            .ok_or(CredentialsError::MissingOAuthClient)?;
        let token = client.refresh_token(&refresh_token).await?;
        Ok(Credentials {
            access_token: token.access_token,
            refresh_token: token.refresh_token.or(Some(refresh_token)),
            expires_at: token
                .expires_in
                .map(|secs| now.saturating_add(secs as i64)),
            remote_user_id: credentials.remote_user_id.clone(),
        })
    }
}
