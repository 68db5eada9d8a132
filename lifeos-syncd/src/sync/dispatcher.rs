use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::engine::{EngineError, SyncEngine, SyncScope, is_supported};
use super::ledger::SyncTrigger;

/// A request to reconcile one user, optionally limited to one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub user_id: String,
    /// `None` means every connected and enabled provider of the user.
    pub provider: Option<String>,
    pub scope: SyncScope,
    pub trigger: SyncTrigger,
}

#[derive(Clone)]
pub struct SyncDispatcher {
    engine: Arc<SyncEngine>,
}

impl SyncDispatcher {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self { engine }
    }

    pub fn spawn(self, mut requests: mpsc::UnboundedReceiver<SyncRequest>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                self.dispatch(request).await;
            }
        })
    }

    /// Starts one engine run per target provider and returns their handles.
    pub async fn dispatch(&self, request: SyncRequest) -> Vec<JoinHandle<()>> {
        let providers = match self.providers_for(&request).await {
            Ok(providers) => providers,
            Err(err) => {
                error!(user_id = %request.user_id, %err, "failed to resolve sync targets");
                return Vec::new();
            }
        };
        if providers.is_empty() {
            debug!(user_id = %request.user_id, "no providers to sync");
        }

        providers
            .into_iter()
            .map(|provider| {
                let engine = Arc::clone(&self.engine);
                let user_id = request.user_id.clone();
                let (scope, trigger) = (request.scope, request.trigger);
                tokio::spawn(async move {
                    match engine.sync(&user_id, &provider, trigger, scope).await {
                        Ok(_) => {}
                        Err(err) if err.is_already_running() => {
                            debug!(%user_id, %provider, %trigger, "sync already running; dropping trigger");
                        }
                        Err(EngineError::NotConnected { .. }) => {
                            debug!(%user_id, %provider, "integration not connected; dropping trigger");
                        }
                        Err(EngineError::UnsupportedProvider(_)) => {
                            warn!(%user_id, %provider, "no sync client for provider");
                        }
                        Err(err) => {
                            error!(%user_id, %provider, %err, "sync request failed");
                        }
                    }
                })
            })
            .collect()
    }

    async fn providers_for(&self, request: &SyncRequest) -> Result<Vec<String>, EngineError> {
        if let Some(provider) = &request.provider {
            return Ok(vec![provider.clone()]);
        }
        Ok(self
            .engine
            .store()
            .list_configs_for_user(&request.user_id)
            .await?
            .into_iter()
            .filter(|config| config.connected && config.sync_enabled)
            .filter(|config| is_supported(&config.provider))
            .map(|config| config.provider)
            .collect())
    }
}
