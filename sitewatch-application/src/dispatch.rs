// Alert dispatcher.
// The single consumer of the alert channel: folds each detection into the
// watch list, then forwards it to the hub. Persistence failure is logged
// and never blocks delivery; keeping live observers informed matters more
// than the durability of one watch-list row.

use std::sync::Arc;

use tracing::{info, warn};

use sitewatch_domain::{AlertEnvelope, DetectedAnomaly, WatchEntry, WatchListStore};
use tokio::sync::mpsc;

use crate::hub::ConnectionHub;
use crate::Metrics;

pub struct AlertDispatcher {
    watch_store: Arc<dyn WatchListStore>,
    hub: Arc<ConnectionHub>,
    metrics: Arc<Metrics>,
}

impl AlertDispatcher {
    pub fn new(
        watch_store: Arc<dyn WatchListStore>,
        hub: Arc<ConnectionHub>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            watch_store,
            hub,
            metrics,
        }
    }

    /// Runs until the alert channel closes.
    pub async fn run(self, mut alerts: mpsc::Receiver<DetectedAnomaly>) {
        while let Some(anomaly) = alerts.recv().await {
            self.record(&anomaly).await;
            self.hub.broadcast(AlertEnvelope::suspicious_activity(anomaly));
        }
        info!("alert dispatcher stopped");
    }

    /// Upsert keyed by user id: first detection creates the entry, repeats
    /// bump the counter atomically so concurrently-edited fields (notes,
    /// severity) are not clobbered.
    async fn record(&self, anomaly: &DetectedAnomaly) {
        let existing = match self.watch_store.get(anomaly.user_id).await {
            Ok(existing) => existing,
            Err(err) => {
                self.metrics.record_persist_failure();
                warn!(
                    user_id = anomaly.user_id,
                    "failed to look up watch entry: {err:#}"
                );
                return;
            }
        };

        let result = if existing.is_some() {
            self.watch_store
                .increment_alert(anomaly.user_id, anomaly.detected_at)
                .await
        } else {
            self.watch_store
                .create(&WatchEntry::from_anomaly(anomaly))
                .await
        };

        if let Err(err) = result {
            self.metrics.record_persist_failure();
            warn!(
                user_id = anomaly.user_id,
                "failed to persist watch entry: {err:#}"
            );
        }
    }
}
