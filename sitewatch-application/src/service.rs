// Monitoring service: composition root for the monitor, dispatcher, and hub.
// Owns the lifecycle: start wires the pipeline, shutdown tears it down in
// dependency order (scan loop, then alert channel and dispatcher, then hub
// and every live connection).

use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use sitewatch_domain::{
    ActivityLogStore, AlertEnvelope, ConnectionSink, ConnectionStream, RuntimeConfig,
    UserDirectory, WatchListStore,
};

use crate::dispatch::AlertDispatcher;
use crate::hub::ConnectionHub;
use crate::monitor::ActivityMonitor;
use crate::Metrics;

pub struct MonitoringService {
    monitor: Arc<ActivityMonitor>,
    hub: Arc<ConnectionHub>,
    dispatcher_handle: Mutex<Option<JoinHandle<()>>>,
}

impl MonitoringService {
    /// Wires the pipeline and starts all three tasks.
    pub async fn start(
        user_directory: Arc<dyn UserDirectory>,
        log_store: Arc<dyn ActivityLogStore>,
        watch_store: Arc<dyn WatchListStore>,
        config: &RuntimeConfig,
        metrics: Arc<Metrics>,
    ) -> anyhow::Result<Arc<Self>> {
        let hub = Arc::new(ConnectionHub::start(config.hub_buffer, Arc::clone(&metrics)));
        let monitor = Arc::new(ActivityMonitor::new(
            user_directory,
            log_store,
            config,
            Arc::clone(&metrics),
        ));

        let alerts = monitor
            .subscribe()
            .await
            .ok_or_else(|| anyhow!("alert channel already has a consumer"))?;
        let dispatcher = AlertDispatcher::new(watch_store, Arc::clone(&hub), metrics);
        let dispatcher_handle = tokio::spawn(dispatcher.run(alerts));

        monitor.start().await;
        info!("monitoring service started");

        Ok(Arc::new(Self {
            monitor,
            hub,
            dispatcher_handle: Mutex::new(Some(dispatcher_handle)),
        }))
    }

    pub async fn flag_user(&self, user_id: u64) {
        self.monitor.flag_user(user_id).await;
    }

    pub async fn unflag_user(&self, user_id: u64) {
        self.monitor.unflag_user(user_id).await;
    }

    pub async fn is_flagged(&self, user_id: u64) -> bool {
        self.monitor.is_flagged(user_id).await
    }

    pub async fn flagged_users(&self) -> Vec<u64> {
        self.monitor.flagged_users().await
    }

    pub async fn accept_connection(
        &self,
        sink: Box<dyn ConnectionSink>,
        stream: Box<dyn ConnectionStream>,
    ) {
        self.hub.accept_connection(sink, stream).await;
    }

    pub fn broadcast(&self, envelope: AlertEnvelope) {
        self.hub.broadcast(envelope);
    }

    pub fn connection_count(&self) -> usize {
        self.hub.connection_count()
    }

    /// Orderly shutdown: stop producing, drain the dispatcher, then drop
    /// every observer connection. Idempotent.
    pub async fn shutdown(&self) {
        self.monitor.stop().await;
        self.monitor.close_alerts().await;
        if let Some(handle) = self.dispatcher_handle.lock().await.take() {
            let _ = handle.await;
        }
        self.hub.shutdown().await;
        info!("monitoring service stopped");
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use super::*;
    use sitewatch_domain::{ActivityRecord, UserAccount, WatchEntry};

    struct EmptyDirectory;

    #[async_trait]
    impl UserDirectory for EmptyDirectory {
        async fn list_active_users(
            &self,
            _page: u64,
            _page_size: u64,
        ) -> anyhow::Result<(Vec<UserAccount>, u64)> {
            Ok((Vec::new(), 0))
        }

        async fn get_user(&self, _id: u64) -> anyhow::Result<Option<UserAccount>> {
            Ok(None)
        }
    }

    struct EmptyLogs;

    #[async_trait]
    impl ActivityLogStore for EmptyLogs {
        async fn fetch_by_date_range(
            &self,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _page: u64,
            _page_size: u64,
        ) -> anyhow::Result<(Vec<ActivityRecord>, u64)> {
            Ok((Vec::new(), 0))
        }

        async fn fetch_for_user_since(
            &self,
            _user_id: u64,
            _since: DateTime<Utc>,
        ) -> anyhow::Result<Vec<ActivityRecord>> {
            Ok(Vec::new())
        }
    }

    struct NoopWatchStore;

    #[async_trait]
    impl WatchListStore for NoopWatchStore {
        async fn get(&self, _user_id: u64) -> anyhow::Result<Option<WatchEntry>> {
            Ok(None)
        }

        async fn list(
            &self,
            _page: u64,
            _page_size: u64,
        ) -> anyhow::Result<(Vec<WatchEntry>, u64)> {
            Ok((Vec::new(), 0))
        }

        async fn create(&self, _entry: &WatchEntry) -> anyhow::Result<()> {
            Ok(())
        }

        async fn update(&self, _entry: &WatchEntry) -> anyhow::Result<()> {
            Ok(())
        }

        async fn delete(&self, _user_id: u64) -> anyhow::Result<()> {
            Ok(())
        }

        async fn increment_alert(&self, _user_id: u64, _at: DateTime<Utc>) -> anyhow::Result<()> {
            Ok(())
        }

        async fn recent_alerts(&self, _since: DateTime<Utc>) -> anyhow::Result<Vec<WatchEntry>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn full_lifecycle_starts_and_stops_cleanly() {
        let config = RuntimeConfig {
            scan_interval_seconds: 3600,
            ..RuntimeConfig::default()
        };
        let service = MonitoringService::start(
            Arc::new(EmptyDirectory),
            Arc::new(EmptyLogs),
            Arc::new(NoopWatchStore),
            &config,
            Arc::new(Metrics::default()),
        )
        .await
        .expect("service starts");

        service.flag_user(9).await;
        assert!(service.is_flagged(9).await);

        service.shutdown().await;
        // A second shutdown must be harmless.
        service.shutdown().await;
        assert_eq!(service.connection_count(), 0);
    }
}
