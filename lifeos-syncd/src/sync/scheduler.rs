//! Periodic full reconciliation per user.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::dispatcher::SyncRequest;
use super::engine::SyncScope;
use super::ledger::SyncTrigger;
use super::timer::ScheduledTask;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

pub struct SyncScheduler {
    interval: Duration,
    requests: mpsc::UnboundedSender<SyncRequest>,
    running: Mutex<HashMap<String, ScheduledTask>>,
}

impl SyncScheduler {
    pub fn new(interval: Duration, requests: mpsc::UnboundedSender<SyncRequest>) -> Self {
        Self {
            interval,
            requests,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Requests a full sync now and then every interval. Returns `false` if
    /// the user already has a schedule.
    pub async fn start(&self, user_id: &str) -> bool {
        let mut running = self.running.lock().await;
        if running.contains_key(user_id) {
            debug!(user_id, "scheduler already running");
            return false;
        }

        let requests = self.requests.clone();
        let period = self.interval;
        let owner = user_id.to_string();
        let task = ScheduledTask::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let request = SyncRequest {
                    user_id: owner.clone(),
                    provider: None,
                    scope: SyncScope::Full,
                    trigger: SyncTrigger::Scheduled,
                };
                if requests.send(request).is_err() {
                    break;
                }
            }
        });
        running.insert(user_id.to_string(), task);
        info!(user_id, interval_secs = period.as_secs(), "scheduled sync started");
        true
    }

    pub async fn stop(&self, user_id: &str) -> bool {
        let stopped = self.running.lock().await.remove(user_id).is_some();
        if stopped {
            info!(user_id, "scheduled sync stopped");
        }
        stopped
    }

    pub async fn stop_all(&self) {
        self.running.lock().await.clear();
    }

    pub async fn is_running(&self, user_id: &str) -> bool {
        self.running.lock().await.contains_key(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_immediately_then_every_interval() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = SyncScheduler::new(Duration::from_secs(300), tx);

        assert!(scheduler.start("u1").await);
        tokio::time::sleep(Duration::from_millis(1)).await;
        let first = rx.try_recv().unwrap();
        assert_eq!(first.user_id, "u1");
        assert_eq!(first.provider, None);
        assert_eq!(first.scope, SyncScope::Full);
        assert_eq!(first.trigger, SyncTrigger::Scheduled);
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_is_a_no_op_and_stop_silences() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = SyncScheduler::new(Duration::from_secs(300), tx);

        assert!(scheduler.start("u1").await);
        assert!(!scheduler.start("u1").await);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());

        assert!(scheduler.stop("u1").await);
        assert!(!scheduler.is_running("u1").await);
        tokio::time::sleep(Duration::from_secs(900)).await;
        assert!(rx.try_recv().is_err());
        assert!(!scheduler.stop("u1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_cancels_every_user() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = SyncScheduler::new(Duration::from_secs(60), tx);
        scheduler.start("u1").await;
        scheduler.start("u2").await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        while rx.try_recv().is_ok() {}

        scheduler.stop_all().await;
        tokio::time::sleep(Duration::from_secs(600)).await;

        assert!(rx.try_recv().is_err());
    }
}
