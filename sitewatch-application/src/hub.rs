// Observer connection hub.
// One event-loop task owns the live connection set; registration,
// de-registration, and broadcast all arrive through queues, so the set is
// never touched from two places. Per-connection read loops exist only for
// liveness: any read error enqueues a de-registration and nothing else.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use sitewatch_domain::{AlertEnvelope, ConnectionSink, ConnectionStream};

use crate::Metrics;

// Registration and de-registration are rare; a small queue suffices.
const CONTROL_QUEUE: usize = 16;

struct Registration {
    id: u64,
    sink: Box<dyn ConnectionSink>,
}

pub struct ConnectionHub {
    register_tx: mpsc::Sender<Registration>,
    deregister_tx: mpsc::Sender<u64>,
    broadcast_tx: mpsc::Sender<AlertEnvelope>,
    next_id: AtomicU64,
    live: Arc<AtomicUsize>,
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<Metrics>,
}

impl ConnectionHub {
    /// Spawns the hub event loop and returns its handle object.
    pub fn start(broadcast_buffer: usize, metrics: Arc<Metrics>) -> Self {
        let (register_tx, register_rx) = mpsc::channel(CONTROL_QUEUE);
        let (deregister_tx, deregister_rx) = mpsc::channel(CONTROL_QUEUE);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(broadcast_buffer.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let live = Arc::new(AtomicUsize::new(0));

        let handle = tokio::spawn(run_event_loop(
            register_rx,
            deregister_rx,
            broadcast_rx,
            shutdown_rx,
            Arc::clone(&live),
            Arc::clone(&metrics),
        ));

        Self {
            register_tx,
            deregister_tx,
            broadcast_tx,
            next_id: AtomicU64::new(1),
            live,
            shutdown_tx,
            handle: Mutex::new(Some(handle)),
            metrics,
        }
    }

    /// Hands an upgraded connection to the hub: the sink joins the live set
    /// and a dedicated read loop watches the stream for disconnection.
    pub async fn accept_connection(
        &self,
        sink: Box<dyn ConnectionSink>,
        stream: Box<dyn ConnectionStream>,
    ) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if self
            .register_tx
            .send(Registration { id, sink })
            .await
            .is_err()
        {
            warn!("hub is shut down, rejecting observer connection");
            return;
        }
        self.metrics.record_connection_opened();

        let deregister_tx = self.deregister_tx.clone();
        tokio::spawn(async move {
            let mut stream = stream;
            // Fan-out only: inbound frames are discarded, the loop exists
            // solely to notice the peer going away.
            while stream.receive().await.is_ok() {}
            let _ = deregister_tx.send(id).await;
        });
    }

    /// Fire-and-forget broadcast. The queue is bounded; a full queue drops
    /// the message rather than blocking the caller.
    pub fn broadcast(&self, envelope: AlertEnvelope) {
        match self.broadcast_tx.try_send(envelope) {
            Ok(()) => self.metrics.record_broadcast(),
            Err(TrySendError::Full(_)) => {
                warn!("broadcast queue full, dropping alert message");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("hub is shut down, discarding broadcast");
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    /// Terminates the event loop and closes every live connection.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.lock().await.take() {
            let _ = handle.await;
        }
        info!("connection hub stopped");
    }
}

async fn run_event_loop(
    mut register_rx: mpsc::Receiver<Registration>,
    mut deregister_rx: mpsc::Receiver<u64>,
    mut broadcast_rx: mpsc::Receiver<AlertEnvelope>,
    mut shutdown_rx: watch::Receiver<bool>,
    live: Arc<AtomicUsize>,
    metrics: Arc<Metrics>,
) {
    let mut connections: HashMap<u64, Box<dyn ConnectionSink>> = HashMap::new();
    loop {
        tokio::select! {
            Some(registration) = register_rx.recv() => {
                connections.insert(registration.id, registration.sink);
                live.store(connections.len(), Ordering::Relaxed);
                info!(conn_id = registration.id, "observer connected");
            }
            Some(id) = deregister_rx.recv() => {
                if let Some(mut sink) = connections.remove(&id) {
                    sink.close().await;
                    live.store(connections.len(), Ordering::Relaxed);
                    info!(conn_id = id, "observer disconnected");
                }
            }
            Some(envelope) = broadcast_rx.recv() => {
                deliver(&mut connections, &envelope, &live, &metrics).await;
            }
            _ = shutdown_rx.changed() => break,
        }
    }

    for (_, mut sink) in connections.drain() {
        sink.close().await;
    }
    live.store(0, Ordering::Relaxed);
    debug!("hub event loop exited");
}

async fn deliver(
    connections: &mut HashMap<u64, Box<dyn ConnectionSink>>,
    envelope: &AlertEnvelope,
    live: &AtomicUsize,
    metrics: &Metrics,
) {
    let payload = match serde_json::to_vec(envelope) {
        Ok(payload) => payload,
        Err(err) => {
            warn!("failed to serialize alert envelope: {err}");
            return;
        }
    };

    let mut dead = Vec::new();
    for (id, sink) in connections.iter_mut() {
        if let Err(err) = sink.send(&payload).await {
            debug!(conn_id = id, "write failed, evicting connection: {err:#}");
            dead.push(*id);
        }
    }
    // Fail-fast eviction: a failed write means the peer is gone, no
    // de-registration message is waited for.
    for id in dead {
        if let Some(mut sink) = connections.remove(&id) {
            sink.close().await;
        }
        metrics.record_connection_evicted();
        warn!(conn_id = id, "evicted dead observer connection");
    }
    live.store(connections.len(), Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex as AsyncMutex;

    use super::*;
    use sitewatch_domain::{DetectedAnomaly, Severity};

    #[derive(Clone, Default)]
    struct RecordingSink {
        sent: Arc<AsyncMutex<Vec<Vec<u8>>>>,
        closed: Arc<AtomicBool>,
        fail_writes: bool,
    }

    #[async_trait]
    impl ConnectionSink for RecordingSink {
        async fn send(&mut self, payload: &[u8]) -> anyhow::Result<()> {
            if self.fail_writes {
                anyhow::bail!("broken pipe")
            }
            self.sent.lock().await.push(payload.to_vec());
            Ok(())
        }

        async fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Stream that stays silent until dropped, like an idle observer.
    struct IdleStream;

    #[async_trait]
    impl ConnectionStream for IdleStream {
        async fn receive(&mut self) -> anyhow::Result<Vec<u8>> {
            std::future::pending().await
        }
    }

    /// Stream whose peer hangs up immediately.
    struct ClosedStream;

    #[async_trait]
    impl ConnectionStream for ClosedStream {
        async fn receive(&mut self) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("connection reset")
        }
    }

    fn envelope() -> AlertEnvelope {
        AlertEnvelope::suspicious_activity(DetectedAnomaly {
            user_id: 7,
            username: "alice".to_string(),
            rule_name: "rapid-login-attempts".to_string(),
            description: "5 or more login attempts within the last hour".to_string(),
            detected_at: chrono::Utc::now(),
            severity: Severity::Medium,
        })
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn broadcast_reaches_every_connection() {
        let hub = ConnectionHub::start(10, Arc::new(Metrics::default()));
        let sinks: Vec<RecordingSink> = (0..3).map(|_| RecordingSink::default()).collect();
        for sink in &sinks {
            hub.accept_connection(Box::new(sink.clone()), Box::new(IdleStream))
                .await;
        }
        wait_until(|| hub.connection_count() == 3).await;

        hub.broadcast(envelope());
        for sink in &sinks {
            let sent = Arc::clone(&sink.sent);
            wait_until(move || sent.try_lock().map(|s| s.len() == 1).unwrap_or(false)).await;
        }

        let payload = sinks[0].sent.lock().await[0].clone();
        let raw: serde_json::Value = serde_json::from_slice(&payload).expect("valid json");
        assert_eq!(raw["type"], "suspicious_activity");
        assert_eq!(raw["activity"]["activity_type"], "rapid-login-attempts");
        assert!(
            raw["activity"].get("rule_name").is_none(),
            "observers key on activity_type, not the field name"
        );

        let parsed: AlertEnvelope = serde_json::from_slice(&payload).expect("valid envelope");
        assert_eq!(parsed.kind, "suspicious_activity");
        assert_eq!(parsed.activity.username, "alice");
    }

    #[tokio::test]
    async fn failed_write_evicts_connection() {
        let metrics = Arc::new(Metrics::default());
        let hub = ConnectionHub::start(10, Arc::clone(&metrics));

        let healthy = RecordingSink::default();
        let broken = RecordingSink {
            fail_writes: true,
            ..RecordingSink::default()
        };
        hub.accept_connection(Box::new(healthy.clone()), Box::new(IdleStream))
            .await;
        hub.accept_connection(Box::new(broken.clone()), Box::new(IdleStream))
            .await;
        wait_until(|| hub.connection_count() == 2).await;

        hub.broadcast(envelope());
        wait_until(|| hub.connection_count() == 1).await;
        assert!(broken.closed.load(Ordering::SeqCst));

        hub.broadcast(envelope());
        let sent = Arc::clone(&healthy.sent);
        wait_until(move || sent.try_lock().map(|s| s.len() == 2).unwrap_or(false)).await;
    }

    #[tokio::test]
    async fn read_error_triggers_deregistration() {
        let hub = ConnectionHub::start(10, Arc::new(Metrics::default()));
        let sink = RecordingSink::default();
        hub.accept_connection(Box::new(sink.clone()), Box::new(ClosedStream))
            .await;

        wait_until(|| hub.connection_count() == 0).await;
        wait_until(|| sink.closed.load(Ordering::SeqCst)).await;
    }

    #[tokio::test]
    async fn shutdown_closes_all_connections() {
        let hub = ConnectionHub::start(10, Arc::new(Metrics::default()));
        let sinks: Vec<RecordingSink> = (0..2).map(|_| RecordingSink::default()).collect();
        for sink in &sinks {
            hub.accept_connection(Box::new(sink.clone()), Box::new(IdleStream))
                .await;
        }
        wait_until(|| hub.connection_count() == 2).await;

        hub.shutdown().await;
        assert_eq!(hub.connection_count(), 0);
        for sink in &sinks {
            assert!(sink.closed.load(Ordering::SeqCst));
        }
    }
}
