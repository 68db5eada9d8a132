//! Trailing-edge debounce of local edits into push-only sync requests.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use super::dispatcher::SyncRequest;
use super::engine::SyncScope;
use super::ledger::SyncTrigger;
use super::timer::ScheduledTask;

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
            ChangeKind::Deleted => "deleted",
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown change kind: {0}")]
pub struct UnknownChangeKind(pub String);

impl FromStr for ChangeKind {
    type Err = UnknownChangeKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "created" => Ok(ChangeKind::Created),
            "updated" => Ok(ChangeKind::Updated),
            "deleted" => Ok(ChangeKind::Deleted),
            other => Err(UnknownChangeKind(other.to_string())),
        }
    }
}

type PairKey = (String, String);

struct PendingTimer {
    generation: u64,
    _task: ScheduledTask,
}

pub struct ChangeWatcher {
    quiet_period: Duration,
    requests: mpsc::UnboundedSender<SyncRequest>,
    pending: Arc<Mutex<HashMap<PairKey, PendingTimer>>>,
    generation: AtomicU64,
}

impl ChangeWatcher {
    pub fn new(quiet_period: Duration, requests: mpsc::UnboundedSender<SyncRequest>) -> Self {
        Self {
            quiet_period,
            requests,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Restarts the quiet period for the pair. Only the last change in a
    /// burst produces a request.
    pub async fn on_local_change(&self, user_id: &str, provider: &str, kind: ChangeKind) {
        debug!(user_id, provider, %kind, "local change");
        let key = (user_id.to_string(), provider.to_string());
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let mut timers = self.pending.lock().await;

        let pending = Arc::clone(&self.pending);
        let requests = self.requests.clone();
        let quiet_period = self.quiet_period;
        let fire_key = key.clone();
        let task = ScheduledTask::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            let mut pending = pending.lock().await;
            let current = pending
                .get(&fire_key)
                .is_some_and(|timer| timer.generation == generation);
            if !current {
                return;
            }
            // Removing the entry aborts this task at its next await point,
            // so nothing below may await.
            let timer = pending.remove(&fire_key);
            let (user_id, provider) = fire_key;
            let _ = requests.send(SyncRequest {
                user_id,
                provider: Some(provider),
                scope: SyncScope::PushOnly,
                trigger: SyncTrigger::LocalChange,
            });
            drop(pending);
            drop(timer);
        });

        let replaced = timers.insert(
            key,
            PendingTimer {
                generation,
                _task: task,
            },
        );
        if replaced.is_some() {
            debug!(user_id, provider, "debounce timer restarted");
        }
    }

    /// Cancels every pending timer of `user_id`.
    pub async fn teardown_user(&self, user_id: &str) {
        self.pending
            .lock()
            .await
            .retain(|(user, _), _| user != user_id);
    }

    pub async fn shutdown(&self) {
        self.pending.lock().await.clear();
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watcher() -> (ChangeWatcher, mpsc::UnboundedReceiver<SyncRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChangeWatcher::new(Duration::from_secs(5), tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_changes_yields_one_push_request() {
        let (watcher, mut rx) = watcher();

        for _ in 0..10 {
            watcher
                .on_local_change("u1", "eduplanr", ChangeKind::Updated)
                .await;
            tokio::time::sleep(Duration::from_millis(400)).await;
        }
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(6)).await;

        let request = rx.try_recv().unwrap();
        assert_eq!(request.user_id, "u1");
        assert_eq!(request.provider.as_deref(), Some("eduplanr"));
        assert_eq!(request.scope, SyncScope::PushOnly);
        assert_eq!(request.trigger, SyncTrigger::LocalChange);
        assert!(rx.try_recv().is_err());
        assert_eq!(watcher.pending_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pairs_are_debounced_independently() {
        let (watcher, mut rx) = watcher();

        watcher
            .on_local_change("u1", "eduplanr", ChangeKind::Created)
            .await;
        watcher
            .on_local_change("u2", "eduplanr", ChangeKind::Deleted)
            .await;
        tokio::time::sleep(Duration::from_secs(6)).await;

        let mut users = vec![rx.try_recv().unwrap().user_id, rx.try_recv().unwrap().user_id];
        users.sort();
        assert_eq!(users, vec!["u1", "u2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn no_timer_fires_after_teardown() {
        let (watcher, mut rx) = watcher();

        watcher
            .on_local_change("u1", "eduplanr", ChangeKind::Updated)
            .await;
        watcher
            .on_local_change("u2", "eduplanr", ChangeKind::Updated)
            .await;
        watcher.teardown_user("u1").await;
        assert_eq!(watcher.pending_count().await, 1);
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(rx.try_recv().unwrap().user_id, "u2");
        assert!(rx.try_recv().is_err());

        watcher
            .on_local_change("u2", "eduplanr", ChangeKind::Updated)
            .await;
        watcher.shutdown().await;
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn change_kind_parses() {
        assert_eq!("created".parse::<ChangeKind>(), Ok(ChangeKind::Created));
        assert_eq!(
            "renamed".parse::<ChangeKind>(),
            Err(UnknownChangeKind("renamed".into()))
        );
    }
}
