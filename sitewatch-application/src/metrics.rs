use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    scan_cycles: AtomicU64,
    scan_failures: AtomicU64,
    anomalies: AtomicU64,
    alerts_dropped: AtomicU64,
    persist_failures: AtomicU64,
    broadcasts: AtomicU64,
    connections_opened: AtomicU64,
    connections_evicted: AtomicU64,
}

impl Metrics {
    pub fn record_scan_cycle(&self) {
        self.scan_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scan_failure(&self) {
        self.scan_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_anomalies(&self, count: usize) {
        self.anomalies.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_alert_dropped(&self) {
        self.alerts_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persist_failure(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_evicted(&self) {
        self.connections_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn alerts_dropped(&self) -> u64 {
        self.alerts_dropped.load(Ordering::Relaxed)
    }

    pub fn render_prometheus(&self) -> String {
        let scan_cycles = self.scan_cycles.load(Ordering::Relaxed);
        let scan_failures = self.scan_failures.load(Ordering::Relaxed);
        let anomalies = self.anomalies.load(Ordering::Relaxed);
        let alerts_dropped = self.alerts_dropped.load(Ordering::Relaxed);
        let persist_failures = self.persist_failures.load(Ordering::Relaxed);
        let broadcasts = self.broadcasts.load(Ordering::Relaxed);
        let connections_opened = self.connections_opened.load(Ordering::Relaxed);
        let connections_evicted = self.connections_evicted.load(Ordering::Relaxed);

        format!(
            "# TYPE sitewatch_scan_cycles_total counter\n\
sitewatch_scan_cycles_total {}\n\
# TYPE sitewatch_scan_failures_total counter\n\
sitewatch_scan_failures_total {}\n\
# TYPE sitewatch_anomalies_total counter\n\
sitewatch_anomalies_total {}\n\
# TYPE sitewatch_alerts_dropped_total counter\n\
sitewatch_alerts_dropped_total {}\n\
# TYPE sitewatch_persist_failures_total counter\n\
sitewatch_persist_failures_total {}\n\
# TYPE sitewatch_broadcasts_total counter\n\
sitewatch_broadcasts_total {}\n\
# TYPE sitewatch_connections_opened_total counter\n\
sitewatch_connections_opened_total {}\n\
# TYPE sitewatch_connections_evicted_total counter\n\
sitewatch_connections_evicted_total {}\n",
            scan_cycles,
            scan_failures,
            anomalies,
            alerts_dropped,
            persist_failures,
            broadcasts,
            connections_opened,
            connections_evicted
        )
    }
}
