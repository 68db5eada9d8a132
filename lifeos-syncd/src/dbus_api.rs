use std::sync::Arc;

use lifeos_integrations::SyncMode;
use lifeos_integrations::ids::{
    DBUS_ERROR_BUSY, DBUS_ERROR_FAILED, DBUS_ERROR_INVALID_ARGUMENT, DBUS_ERROR_NOT_CONNECTED,
    DBUS_ERROR_NOT_FOUND,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;
use zbus::{interface, object_server::SignalEmitter};

use crate::store::Credentials;
use crate::sync::engine::{EngineError, SyncScope};
use crate::sync::ledger::{SyncJob, SyncTrigger};
use crate::sync::watcher::{ChangeKind, ChangeWatcher};
use crate::sync::{SyncEngine, SyncRequest};

/// (id, provider, trigger, outcome, started_at, completed_at, pulled, pushed, error)
pub type JobRow = (String, String, String, String, i64, i64, u32, u32, String);

#[derive(Debug, Error)]
pub enum DbusServiceError {
    #[error("integration does not exist")]
    NotFound,
    #[error("sync already in progress")]
    Busy,
    #[error("integration is not connected")]
    NotConnected,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("operation failed: {0}")]
    Failed(String),
}

pub fn dbus_error_name(err: &DbusServiceError) -> &'static str {
    match err {
        DbusServiceError::NotFound => DBUS_ERROR_NOT_FOUND,
        DbusServiceError::Busy => DBUS_ERROR_BUSY,
        DbusServiceError::NotConnected => DBUS_ERROR_NOT_CONNECTED,
        DbusServiceError::InvalidArgument(_) => DBUS_ERROR_INVALID_ARGUMENT,
        DbusServiceError::Failed(_) => DBUS_ERROR_FAILED,
    }
}

fn map_to_fdo(err: DbusServiceError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(format!("{}: {}", dbus_error_name(&err), err))
}

fn map_engine_error(err: EngineError) -> zbus::fdo::Error {
    let mapped = match err {
        err if err.is_already_running() => DbusServiceError::Busy,
        EngineError::NotConnected { .. } => DbusServiceError::NotConnected,
        EngineError::UnsupportedProvider(provider) => {
            DbusServiceError::InvalidArgument(format!("unknown provider {provider}"))
        }
        EngineError::InvalidRecord(err) => DbusServiceError::InvalidArgument(err.to_string()),
        other => DbusServiceError::Failed(other.to_string()),
    };
    map_to_fdo(mapped)
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

fn job_row(job: SyncJob) -> JobRow {
    (
        job.id,
        job.provider,
        job.trigger.to_string(),
        job.outcome.to_string(),
        job.started_at,
        job.completed_at.unwrap_or(0),
        job.pulled_count,
        job.pushed_count,
        job.error_message.unwrap_or_default(),
    )
}

pub struct SyncDbusService {
    engine: Arc<SyncEngine>,
    watcher: Arc<ChangeWatcher>,
    requests: mpsc::UnboundedSender<SyncRequest>,
}

impl SyncDbusService {
    pub fn new(
        engine: Arc<SyncEngine>,
        watcher: Arc<ChangeWatcher>,
        requests: mpsc::UnboundedSender<SyncRequest>,
    ) -> Self {
        Self {
            engine,
            watcher,
            requests,
        }
    }
}

#[interface(name = "org.lifeos.Sync1")]
impl SyncDbusService {
    /// Stores credentials for a provider and marks it connected. Empty
    /// `refresh_token`, zero `expires_at` and empty `sync_mode` mean "none"
    /// and "provider default".
    async fn connect(
        &self,
        user_id: &str,
        provider: &str,
        access_token: &str,
        refresh_token: &str,
        expires_at: i64,
        remote_user_id: &str,
        sync_mode: &str,
    ) -> zbus::fdo::Result<()> {
        let user_id = non_empty(user_id)
            .ok_or_else(|| map_to_fdo(DbusServiceError::InvalidArgument("empty user id".into())))?;
        if access_token.is_empty() {
            return Err(map_to_fdo(DbusServiceError::InvalidArgument(
                "empty access token".into(),
            )));
        }
        let sync_mode = non_empty(sync_mode)
            .map(|mode| mode.parse::<SyncMode>())
            .transpose()
            .map_err(|err| {
                map_to_fdo(DbusServiceError::InvalidArgument(format!(
                    "unknown sync mode {}",
                    err.0
                )))
            })?;
        let credentials = Credentials {
            access_token: access_token.to_string(),
            refresh_token: non_empty(refresh_token).map(str::to_string),
            expires_at: (expires_at > 0).then_some(expires_at),
            remote_user_id: remote_user_id.to_string(),
        };
        self.engine
            .connect(user_id, provider, credentials, sync_mode)
            .await
            .map_err(map_engine_error)?;
        Ok(())
    }

    async fn disconnect(&self, user_id: &str, provider: &str) -> zbus::fdo::Result<()> {
        self.engine
            .disconnect(user_id, provider)
            .await
            .map_err(map_engine_error)
    }

    async fn set_sync_enabled(
        &self,
        user_id: &str,
        provider: &str,
        enabled: bool,
    ) -> zbus::fdo::Result<()> {
        self.engine
            .set_sync_enabled(user_id, provider, enabled)
            .await
            .map_err(map_engine_error)
    }

    /// Queues a manual sync. An empty `provider` syncs every connected one.
    async fn sync_now(&self, user_id: &str, provider: &str) -> zbus::fdo::Result<()> {
        let user_id = non_empty(user_id)
            .ok_or_else(|| map_to_fdo(DbusServiceError::InvalidArgument("empty user id".into())))?;
        let request = SyncRequest {
            user_id: user_id.to_string(),
            provider: non_empty(provider).map(str::to_string),
            scope: SyncScope::Full,
            trigger: SyncTrigger::Manual,
        };
        debug!(?request, "manual sync requested over D-Bus");
        self.requests
            .send(request)
            .map_err(|_| map_to_fdo(DbusServiceError::Failed("dispatcher stopped".into())))
    }

    async fn notify_local_change(
        &self,
        user_id: &str,
        provider: &str,
        kind: &str,
    ) -> zbus::fdo::Result<()> {
        let kind = kind
            .parse::<ChangeKind>()
            .map_err(|err| map_to_fdo(DbusServiceError::InvalidArgument(err.to_string())))?;
        self.watcher.on_local_change(user_id, provider, kind).await;
        Ok(())
    }

    /// Removes a record deleted in the application along with its mappings.
    async fn delete_local_record(&self, user_id: &str, local_id: &str) -> zbus::fdo::Result<()> {
        let deleted = self
            .engine
            .delete_local_record(user_id, local_id)
            .await
            .map_err(map_engine_error)?;
        if !deleted {
            return Err(map_to_fdo(DbusServiceError::NotFound));
        }
        Ok(())
    }

    /// Returns (status, last_synced, last_error, pulled, pushed). Zero and
    /// empty values stand for "never".
    async fn get_status(
        &self,
        user_id: &str,
        provider: &str,
    ) -> zbus::fdo::Result<(String, i64, String, u32, u32)> {
        let view = self
            .engine
            .status(user_id, provider)
            .await
            .map_err(map_engine_error)?
            .ok_or_else(|| map_to_fdo(DbusServiceError::NotFound))?;
        Ok((
            view.status.as_str().to_string(),
            view.last_synced.unwrap_or(0),
            view.last_error.unwrap_or_default(),
            view.pull_count,
            view.push_count,
        ))
    }

    async fn list_jobs(
        &self,
        user_id: &str,
        provider: &str,
        limit: u32,
    ) -> zbus::fdo::Result<Vec<JobRow>> {
        let jobs = self
            .engine
            .ledger()
            .list_jobs(user_id, non_empty(provider), limit.clamp(1, 500))
            .await
            .map_err(|err| map_to_fdo(DbusServiceError::Failed(err.to_string())))?;
        Ok(jobs.into_iter().map(job_row).collect())
    }

    #[zbus(signal)]
    pub async fn status_changed(
        ctxt: &SignalEmitter<'_>,
        user_id: &str,
        provider: &str,
        status: &str,
        last_error: &str,
    ) -> zbus::Result<()>;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use eduplanr_core::EduPlanrClient;
    use sqlx::SqlitePool;

    use super::*;
    use crate::store::{LOCAL_SOURCE, LocalRecord, RecordCategory, SyncStore};
    use crate::sync::clock::ManualClock;
    use crate::sync::ledger::SyncLedger;
    use crate::sync::provider::RemoteProvider;

    async fn make_service() -> (SyncDbusService, mpsc::UnboundedReceiver<SyncRequest>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = SyncStore::from_pool(pool.clone());
        store.init().await.unwrap();
        let ledger = SyncLedger::new(pool, clock.clone(), Duration::from_secs(240));
        let remote = RemoteProvider::new(
            EduPlanrClient::with_base_url("http://127.0.0.1:9").unwrap(),
            clock.clone(),
        );
        let engine = Arc::new(SyncEngine::new(store, ledger, remote, clock));
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = Arc::new(ChangeWatcher::new(Duration::from_secs(5), tx.clone()));
        (SyncDbusService::new(engine, watcher, tx), rx)
    }

    fn assert_error_name(err: zbus::fdo::Error, name: &str) {
        match err {
            zbus::fdo::Error::Failed(msg) => assert!(msg.starts_with(name), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn maps_errors_to_stable_dbus_names() {
        assert_eq!(
            dbus_error_name(&DbusServiceError::NotFound),
            DBUS_ERROR_NOT_FOUND
        );
        assert_eq!(dbus_error_name(&DbusServiceError::Busy), DBUS_ERROR_BUSY);
        assert_eq!(
            dbus_error_name(&DbusServiceError::NotConnected),
            DBUS_ERROR_NOT_CONNECTED
        );
        assert_eq!(
            dbus_error_name(&DbusServiceError::InvalidArgument("x".into())),
            DBUS_ERROR_INVALID_ARGUMENT
        );
        assert_eq!(
            dbus_error_name(&DbusServiceError::Failed("x".into())),
            DBUS_ERROR_FAILED
        );
    }

    #[tokio::test]
    async fn connect_then_get_status() {
        let (service, _rx) = make_service().await;
        service
            .connect("u1", "eduplanr", "token-1", "", 0, "remote-1", "")
            .await
            .unwrap();

        let status = service.get_status("u1", "eduplanr").await.unwrap();
        assert_eq!(status, ("idle".to_string(), 0, String::new(), 0, 0));
    }

    #[tokio::test]
    async fn connect_rejects_unknown_mode_and_provider() {
        let (service, _rx) = make_service().await;
        let err = service
            .connect("u1", "eduplanr", "token-1", "", 0, "remote-1", "sideways")
            .await
            .expect_err("expected invalid mode");
        assert_error_name(err, DBUS_ERROR_INVALID_ARGUMENT);

        let err = service
            .connect("u1", "myspace", "token-1", "", 0, "remote-1", "")
            .await
            .expect_err("expected unknown provider");
        assert_error_name(err, DBUS_ERROR_INVALID_ARGUMENT);
    }

    #[tokio::test]
    async fn unknown_integration_is_not_found() {
        let (service, _rx) = make_service().await;
        let err = service
            .get_status("u1", "eduplanr")
            .await
            .expect_err("expected not found");
        assert_error_name(err, DBUS_ERROR_NOT_FOUND);

        let err = service
            .disconnect("u1", "eduplanr")
            .await
            .expect_err("expected not connected");
        assert_error_name(err, DBUS_ERROR_NOT_CONNECTED);
    }

    #[tokio::test]
    async fn sync_now_queues_manual_request() {
        let (service, mut rx) = make_service().await;
        service.sync_now("u1", "").await.unwrap();
        service.sync_now("u1", "eduplanr").await.unwrap();

        let all = rx.try_recv().unwrap();
        assert_eq!(all.provider, None);
        assert_eq!(all.trigger, SyncTrigger::Manual);
        assert_eq!(all.scope, SyncScope::Full);
        let one = rx.try_recv().unwrap();
        assert_eq!(one.provider.as_deref(), Some("eduplanr"));
    }

    #[tokio::test]
    async fn local_changes_reach_the_watcher() {
        let (service, _rx) = make_service().await;
        let err = service
            .notify_local_change("u1", "eduplanr", "renamed")
            .await
            .expect_err("expected invalid kind");
        assert_error_name(err, DBUS_ERROR_INVALID_ARGUMENT);

        service
            .notify_local_change("u1", "eduplanr", "updated")
            .await
            .unwrap();
        assert_eq!(service.watcher.pending_count().await, 1);
    }

    #[tokio::test]
    async fn deleting_a_local_record_removes_it_once() {
        let (service, _rx) = make_service().await;
        service
            .engine
            .upsert_local_record(LocalRecord {
                id: "local-1".into(),
                user_id: "u1".into(),
                category: RecordCategory::Task,
                title: "Revise notes".into(),
                body: None,
                subject: None,
                starts_at: None,
                ends_at: None,
                due_at: None,
                completed: false,
                source: LOCAL_SOURCE.into(),
                external_id: None,
                push_eligible: true,
                last_error: None,
                rejected_hash: None,
                updated_at: 0,
            })
            .await
            .unwrap();

        service.delete_local_record("u1", "local-1").await.unwrap();
        assert!(
            service
                .engine
                .store()
                .get_record("u1", "local-1")
                .await
                .unwrap()
                .is_none()
        );

        let err = service
            .delete_local_record("u1", "local-1")
            .await
            .expect_err("expected not found");
        assert_error_name(err, DBUS_ERROR_NOT_FOUND);
    }

    #[tokio::test]
    async fn list_jobs_flattens_ledger_rows() {
        let (service, _rx) = make_service().await;
        let ledger = service.engine.ledger();
        let job_id = ledger
            .begin("u1", "eduplanr", SyncTrigger::Manual)
            .await
            .unwrap();

        let rows = service.list_jobs("u1", "", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.0, job_id);
        assert_eq!(row.2, "manual");
        assert_eq!(row.3, "pending");
        assert_eq!(row.5, 0);
    }
}
