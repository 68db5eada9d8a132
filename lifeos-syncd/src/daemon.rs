use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use eduplanr_core::{DEFAULT_BASE_URL as DEFAULT_EDUPLANR_BASE_URL, EduPlanrClient, OAuthClient};
use lifeos_integrations::ids::{DBUS_NAME_SYNC, DBUS_OBJECT_PATH_SYNC};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use zbus::connection::Builder as ConnectionBuilder;
use zbus::object_server::SignalEmitter;

use crate::credentials::CredentialRefresher;
use crate::dbus_api::SyncDbusService;
use crate::store::{IntegrationConfig, SyncStore, default_db_path};
use crate::sync::clock::{Clock, SystemClock};
use crate::sync::engine::{DEFAULT_CEILING, SyncEngine};
use crate::sync::ledger::SyncLedger;
use crate::sync::provider::RemoteProvider;
use crate::sync::scheduler::{DEFAULT_INTERVAL, SyncScheduler};
use crate::sync::watcher::{ChangeWatcher, DEFAULT_QUIET_PERIOD};
use crate::sync::{SyncDispatcher, SyncRequest};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub db_path: PathBuf,
    pub user_ids: Vec<String>,
    pub eduplanr_base_url: String,
    pub oauth_base_url: Option<String>,
    pub sync_interval: Duration,
    pub debounce: Duration,
    pub sync_ceiling: Duration,
    pub request_timeout: Duration,
    pub enable_dbus: bool,
}

impl DaemonConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        let db_path = match std::env::var("LIFEOS_DB_PATH") {
            Ok(value) => expand_with_home(&value, &home),
            Err(_) => default_db_path().context("failed to resolve database path")?,
        };
        let user_ids = read_list_env("LIFEOS_USER_ID");
        let eduplanr_base_url = std::env::var("LIFEOS_EDUPLANR_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_EDUPLANR_BASE_URL.to_string());
        let oauth_base_url = std::env::var("LIFEOS_EDUPLANR_OAUTH_URL").ok();
        let sync_interval = Duration::from_secs(read_u64_env(
            "LIFEOS_SYNC_INTERVAL_SECS",
            DEFAULT_INTERVAL.as_secs(),
        ));
        let debounce = Duration::from_millis(read_u64_env(
            "LIFEOS_DEBOUNCE_MS",
            DEFAULT_QUIET_PERIOD.as_millis() as u64,
        ));
        let sync_ceiling = Duration::from_secs(read_u64_env(
            "LIFEOS_SYNC_CEILING_SECS",
            DEFAULT_CEILING.as_secs(),
        ));
        let request_timeout = Duration::from_secs(read_u64_env(
            "LIFEOS_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        ));
        let enable_dbus = read_bool_env("LIFEOS_ENABLE_DBUS", true);

        Ok(Self {
            db_path,
            user_ids,
            eduplanr_base_url,
            oauth_base_url,
            sync_interval,
            debounce,
            sync_ceiling,
            request_timeout,
            enable_dbus,
        })
    }

    /// Pending jobs older than this are treated as abandoned.
    pub fn stale_after(&self) -> Duration {
        self.sync_ceiling.saturating_mul(2)
    }
}

pub struct DaemonRuntime {
    config: DaemonConfig,
    engine: Arc<SyncEngine>,
}

impl DaemonRuntime {
    pub async fn bootstrap(config: DaemonConfig) -> anyhow::Result<Self> {
        let store = SyncStore::open(&config.db_path)
            .await
            .with_context(|| format!("failed to open sync store at {:?}", config.db_path))?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ledger = SyncLedger::new(
            store.pool().clone(),
            Arc::clone(&clock),
            config.stale_after(),
        );
        let client = EduPlanrClient::with_base_url_and_timeout(
            &config.eduplanr_base_url,
            config.request_timeout,
        )
        .context("invalid EduPlanr base url")?;
        let remote = RemoteProvider::new(client, Arc::clone(&clock));
        let refresher =
            CredentialRefresher::new(oauth_client_from_env(config.oauth_base_url.as_deref())?);
        let engine = SyncEngine::new(store, ledger, remote, clock)
            .with_refresher(refresher)
            .with_ceiling(config.sync_ceiling);

        let recovered = engine
            .recover()
            .await
            .context("failed to recover interrupted sync jobs")?;
        if recovered > 0 {
            warn!(recovered, "failed sync jobs left pending by previous run");
        }

        Ok(Self {
            config,
            engine: Arc::new(engine),
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        info!(
            db_path = %self.config.db_path.display(),
            users = self.config.user_ids.len(),
            interval_secs = self.config.sync_interval.as_secs(),
            dbus = self.config.enable_dbus,
            "lifeos-syncd started"
        );

        let (request_tx, request_rx) = mpsc::unbounded_channel::<SyncRequest>();
        let dispatcher_handle = SyncDispatcher::new(Arc::clone(&self.engine)).spawn(request_rx);
        let watcher = Arc::new(ChangeWatcher::new(self.config.debounce, request_tx.clone()));
        let scheduler = SyncScheduler::new(self.config.sync_interval, request_tx.clone());
        for user_id in &self.config.user_ids {
            scheduler.start(user_id).await;
        }

        let dbus_connection = if self.config.enable_dbus {
            Some(
                ConnectionBuilder::session()?
                    .name(DBUS_NAME_SYNC)?
                    .serve_at(
                        DBUS_OBJECT_PATH_SYNC,
                        SyncDbusService::new(
                            Arc::clone(&self.engine),
                            Arc::clone(&watcher),
                            request_tx.clone(),
                        ),
                    )?
                    .build()
                    .await
                    .context("failed to start D-Bus object server")?,
            )
        } else {
            None
        };

        let signal_handle = match &dbus_connection {
            Some(connection) => {
                let signal_emitter = SignalEmitter::new(connection, DBUS_OBJECT_PATH_SYNC)
                    .context("failed to create D-Bus signal emitter")?
                    .into_owned();
                let engine_for_signals = Arc::clone(&self.engine);
                Some(tokio::spawn(async move {
                    let mut last_seen = HashMap::new();
                    loop {
                        match engine_for_signals.store().list_configs().await {
                            Ok(configs) => {
                                for change in status_changes(&mut last_seen, &configs) {
                                    if let Err(err) = SyncDbusService::status_changed(
                                        &signal_emitter,
                                        &change.user_id,
                                        &change.provider,
                                        &change.status,
                                        &change.last_error,
                                    )
                                    .await
                                    {
                                        warn!(%err, "failed to emit StatusChanged");
                                    }
                                }
                            }
                            Err(err) => error!(%err, "failed to read integration status"),
                        }
                        tokio::time::sleep(STATUS_POLL_INTERVAL).await;
                    }
                }))
            }
            None => None,
        };

        tokio::signal::ctrl_c()
            .await
            .context("failed waiting for shutdown signal")?;
        info!("shutting down");

        scheduler.stop_all().await;
        watcher.shutdown().await;
        if let Some(handle) = signal_handle {
            handle.abort();
        }
        drop(dbus_connection);
        dispatcher_handle.abort();

        Ok(())
    }
}

include!("daemon_helpers.rs");

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;
