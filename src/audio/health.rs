//! Background health tracking for the transcriber chain.
//!
//! One long-lived task per transcriber probes at a fixed interval with a
//! per-check timeout. A passing check resets the failure counter; a
//! transcriber is marked unhealthy once `consecutive_fails` reaches the
//! configured threshold. Status queries return copies.

use super::traits::{Transcriber, TranscriberHealth};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Shared health state for all transcribers.
pub struct HealthMonitor {
    statuses: RwLock<HashMap<String, TranscriberHealth>>,
    fail_threshold: u32,
}

impl HealthMonitor {
    pub fn new(fail_threshold: u32) -> Self {
        Self {
            statuses: RwLock::new(HashMap::new()),
            fail_threshold: fail_threshold.max(1),
        }
    }

    /// Current status of one transcriber. Unknown names are optimistic
    /// (healthy until the first probe lands).
    pub async fn is_healthy(&self, name: &str) -> bool {
        self.statuses
            .read()
            .await
            .get(name)
            .map(|h| h.healthy)
            .unwrap_or(true)
    }

    /// Copy of the whole status map.
    pub async fn snapshot(&self) -> HashMap<String, TranscriberHealth> {
        self.statuses.read().await.clone()
    }

    /// Record one probe (or dispatch-time) outcome.
    pub async fn record(&self, name: &str, outcome: Result<(), String>) {
        let mut statuses = self.statuses.write().await;
        let entry = statuses.entry(name.to_string()).or_default();
        entry.last_check = Some(Utc::now());
        match outcome {
            Ok(()) => {
                entry.consecutive_fails = 0;
                entry.healthy = true;
                entry.error_message = None;
            }
            Err(message) => {
                entry.consecutive_fails += 1;
                entry.error_message = Some(message);
                if entry.consecutive_fails >= self.fail_threshold {
                    if entry.healthy {
                        warn!(
                            transcriber = name,
                            fails = entry.consecutive_fails,
                            "marking transcriber unhealthy"
                        );
                    }
                    entry.healthy = false;
                }
            }
        }
    }

    /// Spawn the periodic checker task for one transcriber. The task
    /// exits when `shutdown` fires.
    pub fn spawn_checker(
        self: &Arc<Self>,
        transcriber: Arc<dyn Transcriber>,
        interval: Duration,
        check_timeout: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let name = transcriber.name().to_string();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!(transcriber = %name, "health checker stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let outcome =
                            match tokio::time::timeout(check_timeout, transcriber.health_check())
                                .await
                            {
                                Ok(Ok(())) => Ok(()),
                                Ok(Err(e)) => Err(e.to_string()),
                                Err(_) => Err("health check timed out".to_string()),
                            };
                        monitor.record(&name, outcome).await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failures_accumulate_to_threshold() {
        let monitor = HealthMonitor::new(3);
        assert!(monitor.is_healthy("remote").await);

        monitor.record("remote", Err("timeout".into())).await;
        monitor.record("remote", Err("timeout".into())).await;
        assert!(monitor.is_healthy("remote").await);

        monitor.record("remote", Err("timeout".into())).await;
        assert!(!monitor.is_healthy("remote").await);

        let snapshot = monitor.snapshot().await;
        assert_eq!(snapshot["remote"].consecutive_fails, 3);
        assert_eq!(snapshot["remote"].error_message.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_success_resets_counter() {
        let monitor = HealthMonitor::new(2);
        monitor.record("local", Err("boom".into())).await;
        monitor.record("local", Err("boom".into())).await;
        assert!(!monitor.is_healthy("local").await);

        monitor.record("local", Ok(())).await;
        assert!(monitor.is_healthy("local").await);
        let snapshot = monitor.snapshot().await;
        assert_eq!(snapshot["local"].consecutive_fails, 0);
        assert!(snapshot["local"].error_message.is_none());
        assert!(snapshot["local"].last_check.is_some());
    }

    #[tokio::test]
    async fn test_snapshot_is_a_copy() {
        let monitor = HealthMonitor::new(1);
        monitor.record("remote", Ok(())).await;
        let mut snapshot = monitor.snapshot().await;
        snapshot.get_mut("remote").unwrap().healthy = false;
        // the monitor's own state is untouched
        assert!(monitor.is_healthy("remote").await);
    }

    #[tokio::test]
    async fn test_checker_task_probes_and_stops() {
        let monitor = Arc::new(HealthMonitor::new(1));
        let transcriber: Arc<dyn Transcriber> = Arc::new(super::super::DegradedTranscriber::new());
        let shutdown = CancellationToken::new();

        let handle = monitor.spawn_checker(
            transcriber,
            Duration::from_millis(10),
            Duration::from_millis(50),
            shutdown.clone(),
        );

        // first tick fires immediately; the degraded probe always fails
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!monitor.is_healthy("degraded").await);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
