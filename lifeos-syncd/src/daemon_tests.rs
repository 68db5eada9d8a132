use super::*;
use crate::store::IntegrationStatus;
use lifeos_integrations::SyncMode;

fn config(provider: &str, status: IntegrationStatus, last_error: Option<&str>) -> IntegrationConfig {
    IntegrationConfig {
        user_id: "u1".into(),
        provider: provider.into(),
        connected: true,
        sync_enabled: true,
        sync_mode: SyncMode::TwoWay,
        status,
        credentials: None,
        last_synced: None,
        last_error: last_error.map(Into::into),
    }
}

#[test]
fn expands_tilde_to_home_db_path() {
    let home = PathBuf::from("/tmp/home-user");
    assert_eq!(
        expand_with_home("~/lifeos/sync.db", &home),
        PathBuf::from("/tmp/home-user/lifeos/sync.db")
    );
    assert_eq!(expand_with_home("~", &home), home);
    assert_eq!(
        expand_with_home("/var/lib/sync.db", &home),
        PathBuf::from("/var/lib/sync.db")
    );
}

#[test]
fn reads_intervals_from_env_or_default() {
    assert_eq!(read_u64_env("NO_SUCH_ENV_FOR_TEST", 42), 42);
}

#[test]
fn dbus_is_enabled_by_default() {
    assert!(read_bool_env("NO_SUCH_BOOL_ENV_FOR_TEST", true));
}

#[test]
fn user_list_is_comma_separated() {
    assert_eq!(parse_list(" u1, ,u2,"), vec!["u1".to_string(), "u2".to_string()]);
    assert!(parse_list("").is_empty());
    assert!(read_list_env("NO_SUCH_LIST_ENV_FOR_TEST").is_empty());
}

#[test]
fn stale_threshold_is_twice_the_ceiling() {
    let config = DaemonConfig {
        db_path: PathBuf::from("/tmp/sync.db"),
        user_ids: Vec::new(),
        eduplanr_base_url: DEFAULT_EDUPLANR_BASE_URL.into(),
        oauth_base_url: None,
        sync_interval: DEFAULT_INTERVAL,
        debounce: DEFAULT_QUIET_PERIOD,
        sync_ceiling: Duration::from_secs(120),
        request_timeout: Duration::from_secs(30),
        enable_dbus: false,
    };
    assert_eq!(config.stale_after(), Duration::from_secs(240));
}

#[test]
fn status_changes_are_reported_once() {
    let mut last_seen = HashMap::new();
    let configs = vec![
        config("eduplanr", IntegrationStatus::Idle, None),
        config("google-calendar", IntegrationStatus::Idle, None),
    ];
    assert_eq!(status_changes(&mut last_seen, &configs).len(), 2);
    assert!(status_changes(&mut last_seen, &configs).is_empty());

    let configs = vec![
        config("eduplanr", IntegrationStatus::Error, Some("Timeout")),
        config("google-calendar", IntegrationStatus::Idle, None),
    ];
    let changes = status_changes(&mut last_seen, &configs);
    assert_eq!(
        changes,
        vec![StatusChange {
            user_id: "u1".into(),
            provider: "eduplanr".into(),
            status: "error".into(),
            last_error: "Timeout".into(),
        }]
    );
}

#[test]
fn removed_pairs_are_forgotten() {
    let mut last_seen = HashMap::new();
    let configs = vec![config("eduplanr", IntegrationStatus::Idle, None)];
    status_changes(&mut last_seen, &configs);
    status_changes(&mut last_seen, &[]);
    assert!(last_seen.is_empty());
    assert_eq!(status_changes(&mut last_seen, &configs).len(), 1);
}

#[tokio::test]
async fn bootstrap_recovers_interrupted_jobs() {
    let dir = std::env::temp_dir().join(format!("lifeos-syncd-{}", uuid::Uuid::new_v4()));
    let db_path = dir.join("sync.db");
    {
        let store = SyncStore::open(&db_path).await.unwrap();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ledger = SyncLedger::new(store.pool().clone(), clock, Duration::from_secs(240));
        ledger
            .begin("u1", "eduplanr", crate::sync::SyncTrigger::Scheduled)
            .await
            .unwrap();
        store.pool().close().await;
    }

    let config = DaemonConfig {
        db_path: db_path.clone(),
        user_ids: vec!["u1".into()],
        eduplanr_base_url: "http://127.0.0.1:9/".into(),
        oauth_base_url: None,
        sync_interval: DEFAULT_INTERVAL,
        debounce: DEFAULT_QUIET_PERIOD,
        sync_ceiling: DEFAULT_CEILING,
        request_timeout: Duration::from_secs(1),
        enable_dbus: false,
    };
    let runtime = DaemonRuntime::bootstrap(config).await.unwrap();
    let jobs = runtime.engine.ledger().list_jobs("u1", None, 10).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(
        jobs[0].error_message.as_deref(),
        Some(crate::sync::ledger::INTERRUPTED_REASON)
    );

    let _ = std::fs::remove_dir_all(dir);
}
