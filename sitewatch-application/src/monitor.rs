// Background activity monitor.
// One scan-loop task polls the user directory and audit trail on a fixed
// interval, evaluates the rule set per user, and pushes detections onto a
// bounded alert channel. The send is non-blocking: under a slow consumer
// the alert is dropped rather than stalling the scan loop.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use sitewatch_domain::{
    default_rules, ActivityLogStore, DetectedAnomaly, Rule, RuleThresholds, RuntimeConfig,
    UserAccount, UserDirectory,
};

use crate::Metrics;

pub struct ActivityMonitor {
    user_directory: Arc<dyn UserDirectory>,
    log_store: Arc<dyn ActivityLogStore>,
    rules: Vec<Rule>,
    thresholds: RuleThresholds,
    scan_interval: StdDuration,
    lookback: Duration,
    user_page_size: u64,
    /// Users currently flagged. Records scan outcomes and manual flags;
    /// membership never gates scanning.
    flagged: RwLock<HashSet<u64>>,
    alert_tx: Mutex<Option<mpsc::Sender<DetectedAnomaly>>>,
    alert_rx: Mutex<Option<mpsc::Receiver<DetectedAnomaly>>>,
    running: AtomicBool,
    stop_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<Metrics>,
}

impl ActivityMonitor {
    pub fn new(
        user_directory: Arc<dyn UserDirectory>,
        log_store: Arc<dyn ActivityLogStore>,
        config: &RuntimeConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (alert_tx, alert_rx) = mpsc::channel(config.alert_buffer.max(1));
        let (stop_tx, _) = watch::channel(false);
        Self {
            user_directory,
            log_store,
            rules: default_rules(),
            thresholds: config.thresholds.clone(),
            scan_interval: StdDuration::from_secs(config.scan_interval_seconds.max(1)),
            lookback: Duration::hours(config.activity_lookback_hours.max(1) as i64),
            user_page_size: config.user_page_size.max(1),
            flagged: RwLock::new(HashSet::new()),
            alert_tx: Mutex::new(Some(alert_tx)),
            alert_rx: Mutex::new(Some(alert_rx)),
            running: AtomicBool::new(false),
            stop_tx,
            handle: Mutex::new(None),
            metrics,
        }
    }

    /// Launches the scan loop. Idempotent: a second call while running is a
    /// no-op.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(alert_tx) = self.alert_tx.lock().await.clone() else {
            self.running.store(false, Ordering::SeqCst);
            warn!("alert channel already closed, not starting activity monitor");
            return;
        };
        // Subscribe before spawning so a stop() issued right after start()
        // cannot race past an unwatched loop.
        let stop_rx = self.stop_tx.subscribe();
        let monitor = Arc::clone(self);
        let handle = tokio::spawn(monitor.scan_loop(stop_rx, alert_tx));
        *self.handle.lock().await = Some(handle);
        info!("activity monitor started");
    }

    /// Signals the scan loop to terminate after its current cycle and waits
    /// for it to exit. Safe to call repeatedly: the watch signal is
    /// idempotent, unlike a blocking send into a loop that may no longer be
    /// listening.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.handle.lock().await.take() {
            let _ = handle.await;
        }
        info!("activity monitor stopped");
    }

    /// Takes the read end of the alert channel. Intended for exactly one
    /// consumer; returns `None` once taken.
    pub async fn subscribe(&self) -> Option<mpsc::Receiver<DetectedAnomaly>> {
        self.alert_rx.lock().await.take()
    }

    /// Drops the producer side of the alert channel so the dispatcher's
    /// receive loop terminates. Call after `stop()`.
    pub(crate) async fn close_alerts(&self) {
        self.alert_tx.lock().await.take();
    }

    pub async fn flag_user(&self, user_id: u64) {
        self.flagged.write().await.insert(user_id);
    }

    pub async fn unflag_user(&self, user_id: u64) {
        self.flagged.write().await.remove(&user_id);
    }

    pub async fn is_flagged(&self, user_id: u64) -> bool {
        self.flagged.read().await.contains(&user_id)
    }

    pub async fn flagged_users(&self) -> Vec<u64> {
        let mut users: Vec<u64> = self.flagged.read().await.iter().copied().collect();
        users.sort_unstable();
        users
    }

    async fn scan_loop(
        self: Arc<Self>,
        mut stop_rx: watch::Receiver<bool>,
        alert_tx: mpsc::Sender<DetectedAnomaly>,
    ) {
        let start = tokio::time::Instant::now() + self.scan_interval;
        let mut ticker = tokio::time::interval_at(start, self.scan_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.scan_cycle(Utc::now(), &alert_tx).await {
                        Ok(()) => self.metrics.record_scan_cycle(),
                        Err(err) => {
                            // Cycles are independent and idempotent; the next
                            // tick retries with no backoff.
                            self.metrics.record_scan_failure();
                            warn!("scan cycle aborted: {err:#}");
                        }
                    }
                }
                _ = stop_rx.changed() => break,
            }
        }
        debug!("scan loop exited");
    }

    async fn scan_cycle(
        &self,
        now: DateTime<Utc>,
        alert_tx: &mpsc::Sender<DetectedAnomaly>,
    ) -> anyhow::Result<()> {
        let since = now - self.lookback;
        let mut page = 1u64;
        loop {
            let (users, total) = self
                .user_directory
                .list_active_users(page, self.user_page_size)
                .await?;
            if users.is_empty() {
                break;
            }
            for user in &users {
                self.check_user(user, since, now, alert_tx).await;
            }
            if page.saturating_mul(self.user_page_size) >= total {
                break;
            }
            page += 1;
        }
        Ok(())
    }

    async fn check_user(
        &self,
        user: &UserAccount,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
        alert_tx: &mpsc::Sender<DetectedAnomaly>,
    ) {
        let records = match self.log_store.fetch_for_user_since(user.id, since).await {
            Ok(records) => records,
            Err(err) => {
                warn!(user_id = user.id, "failed to fetch activity: {err:#}");
                return;
            }
        };

        let mut fired = 0usize;
        for rule in &self.rules {
            let Some(description) = rule.evaluate(&records, user, &self.thresholds, now) else {
                continue;
            };
            fired += 1;
            self.flag_user(user.id).await;
            let anomaly = DetectedAnomaly {
                user_id: user.id,
                username: user.username.clone(),
                rule_name: rule.name.to_string(),
                description,
                detected_at: now,
                severity: rule.severity,
            };
            match alert_tx.try_send(anomaly) {
                Ok(()) => {}
                Err(TrySendError::Full(anomaly)) => {
                    self.metrics.record_alert_dropped();
                    warn!(
                        user_id = anomaly.user_id,
                        rule = %anomaly.rule_name,
                        "alert buffer full, dropping alert"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("alert channel closed, discarding alert");
                }
            }
        }
        if fired > 0 {
            self.metrics.record_anomalies(fired);
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::TimeZone;

    use super::*;
    use sitewatch_domain::{ActionKind, ActivityRecord, Role, TargetKind};

    struct StaticDirectory {
        users: Vec<UserAccount>,
    }

    #[async_trait]
    impl UserDirectory for StaticDirectory {
        async fn list_active_users(
            &self,
            page: u64,
            _page_size: u64,
        ) -> anyhow::Result<(Vec<UserAccount>, u64)> {
            if page == 1 {
                Ok((self.users.clone(), self.users.len() as u64))
            } else {
                Ok((Vec::new(), self.users.len() as u64))
            }
        }

        async fn get_user(&self, id: u64) -> anyhow::Result<Option<UserAccount>> {
            Ok(self.users.iter().find(|u| u.id == id).cloned())
        }
    }

    struct FailingDirectory;

    #[async_trait]
    impl UserDirectory for FailingDirectory {
        async fn list_active_users(
            &self,
            _page: u64,
            _page_size: u64,
        ) -> anyhow::Result<(Vec<UserAccount>, u64)> {
            anyhow::bail!("directory unreachable")
        }

        async fn get_user(&self, _id: u64) -> anyhow::Result<Option<UserAccount>> {
            anyhow::bail!("directory unreachable")
        }
    }

    struct StaticLogs {
        records: Vec<ActivityRecord>,
        /// Users whose fetch fails, simulating a degraded log store.
        fail_for: Vec<u64>,
    }

    #[async_trait]
    impl ActivityLogStore for StaticLogs {
        async fn fetch_by_date_range(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
            _page: u64,
            _page_size: u64,
        ) -> anyhow::Result<(Vec<ActivityRecord>, u64)> {
            let records: Vec<_> = self
                .records
                .iter()
                .filter(|r| r.created_at >= start && r.created_at < end)
                .cloned()
                .collect();
            let total = records.len() as u64;
            Ok((records, total))
        }

        async fn fetch_for_user_since(
            &self,
            user_id: u64,
            since: DateTime<Utc>,
        ) -> anyhow::Result<Vec<ActivityRecord>> {
            if self.fail_for.contains(&user_id) {
                anyhow::bail!("log store unreachable")
            }
            Ok(self
                .records
                .iter()
                .filter(|r| r.user_id == user_id && r.created_at >= since)
                .cloned()
                .collect())
        }
    }

    fn midday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 14, 12, 0, 0).unwrap()
    }

    fn user(id: u64, name: &str) -> UserAccount {
        UserAccount {
            id,
            username: name.to_string(),
            email: format!("{name}@example.com"),
            role: Role::User,
            active: true,
            last_login: None,
        }
    }

    fn login(user_id: u64, at: DateTime<Utc>) -> ActivityRecord {
        ActivityRecord {
            id: 0,
            user_id,
            username: String::new(),
            action: ActionKind::Login,
            target: TargetKind::User,
            target_id: None,
            description: String::new(),
            created_at: at,
        }
    }

    fn monitor_with(
        directory: Arc<dyn UserDirectory>,
        logs: Arc<dyn ActivityLogStore>,
        alert_buffer: usize,
    ) -> Arc<ActivityMonitor> {
        let config = RuntimeConfig {
            alert_buffer,
            scan_interval_seconds: 3600,
            ..RuntimeConfig::default()
        };
        Arc::new(ActivityMonitor::new(
            directory,
            logs,
            &config,
            Arc::new(Metrics::default()),
        ))
    }

    async fn run_cycle(monitor: &ActivityMonitor, now: DateTime<Utc>) -> anyhow::Result<()> {
        let tx = monitor
            .alert_tx
            .lock()
            .await
            .clone()
            .expect("alert channel open");
        monitor.scan_cycle(now, &tx).await
    }

    #[tokio::test]
    async fn membership_set_operations() {
        let monitor = monitor_with(
            Arc::new(StaticDirectory { users: vec![] }),
            Arc::new(StaticLogs {
                records: vec![],
                fail_for: vec![],
            }),
            8,
        );

        assert!(!monitor.is_flagged(3).await);
        monitor.flag_user(3).await;
        monitor.flag_user(1).await;
        monitor.flag_user(3).await;
        assert!(monitor.is_flagged(3).await);
        assert_eq!(monitor.flagged_users().await, vec![1, 3]);

        monitor.unflag_user(3).await;
        assert!(!monitor.is_flagged(3).await);
        assert_eq!(monitor.flagged_users().await, vec![1]);
    }

    #[tokio::test]
    async fn detection_flags_user_and_emits_one_anomaly_per_rule() {
        let now = midday();
        let records: Vec<_> = (0..6).map(|i| login(7, now - Duration::minutes(i))).collect();
        let monitor = monitor_with(
            Arc::new(StaticDirectory {
                users: vec![user(7, "alice")],
            }),
            Arc::new(StaticLogs {
                records,
                fail_for: vec![],
            }),
            8,
        );

        let mut rx = monitor.subscribe().await.expect("first subscriber");
        run_cycle(&monitor, now).await.expect("cycle");

        let anomaly = rx.try_recv().expect("one anomaly");
        assert_eq!(anomaly.rule_name, "rapid-login-attempts");
        assert_eq!(anomaly.severity, sitewatch_domain::Severity::Medium);
        assert_eq!(anomaly.user_id, 7);
        assert!(rx.try_recv().is_err(), "only the login rule should fire");
        assert!(monitor.is_flagged(7).await);

        // Condition still holds next cycle: the same rule re-fires.
        run_cycle(&monitor, now).await.expect("cycle");
        assert_eq!(rx.try_recv().expect("re-alert").rule_name, "rapid-login-attempts");
    }

    #[tokio::test]
    async fn overflow_drops_alerts_instead_of_blocking() {
        let now = midday();
        let records: Vec<_> = (0..6).map(|i| login(7, now - Duration::minutes(i))).collect();
        let monitor = monitor_with(
            Arc::new(StaticDirectory {
                users: vec![user(7, "alice")],
            }),
            Arc::new(StaticLogs {
                records,
                fail_for: vec![],
            }),
            2,
        );

        // No consumer attached: the buffer holds 2, everything after drops.
        for _ in 0..5 {
            run_cycle(&monitor, now).await.expect("cycle completes");
        }
        assert_eq!(monitor.metrics.alerts_dropped(), 3);
    }

    #[tokio::test]
    async fn cycle_survives_per_user_fetch_failure() {
        let now = midday();
        let records: Vec<_> = (0..5).map(|i| login(2, now - Duration::minutes(i))).collect();
        let monitor = monitor_with(
            Arc::new(StaticDirectory {
                users: vec![user(1, "bob"), user(2, "carol")],
            }),
            Arc::new(StaticLogs {
                records,
                fail_for: vec![1],
            }),
            8,
        );

        let mut rx = monitor.subscribe().await.expect("subscriber");
        run_cycle(&monitor, now).await.expect("cycle still succeeds");

        let anomaly = rx.try_recv().expect("carol still scanned");
        assert_eq!(anomaly.user_id, 2);
    }

    #[tokio::test]
    async fn directory_failure_aborts_cycle() {
        let monitor = monitor_with(
            Arc::new(FailingDirectory),
            Arc::new(StaticLogs {
                records: vec![],
                fail_for: vec![],
            }),
            8,
        );
        assert!(run_cycle(&monitor, midday()).await.is_err());
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let monitor = monitor_with(
            Arc::new(StaticDirectory { users: vec![] }),
            Arc::new(StaticLogs {
                records: vec![],
                fail_for: vec![],
            }),
            8,
        );

        monitor.start().await;
        monitor.start().await;
        assert!(monitor.running.load(Ordering::SeqCst));

        monitor.stop().await;
        monitor.stop().await;
        assert!(!monitor.running.load(Ordering::SeqCst));
        assert!(monitor.handle.lock().await.is_none());
    }

    #[tokio::test]
    async fn subscribe_is_single_consumer() {
        let monitor = monitor_with(
            Arc::new(StaticDirectory { users: vec![] }),
            Arc::new(StaticLogs {
                records: vec![],
                fail_for: vec![],
            }),
            8,
        );
        assert!(monitor.subscribe().await.is_some());
        assert!(monitor.subscribe().await.is_none());
    }
}
