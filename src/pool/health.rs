//! Periodic worker liveness evaluation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::trace;

use super::liveness::LivenessMap;
use super::worker::WorkerRecord;
use crate::events::{self, PoolEvent};

/// Evaluates one worker's liveness on a fixed interval.
///
/// A worker is dead once the time since its *last activity* exceeds the
/// staleness threshold. Start time is never consulted, so a long-lived busy
/// worker stays alive.
pub struct HealthMonitor {
    record: Arc<WorkerRecord>,
    liveness: Arc<LivenessMap>,
    events: broadcast::Sender<PoolEvent>,
    interval: Duration,
    stale_threshold: Duration,
    shutdown: watch::Receiver<bool>,
}

impl HealthMonitor {
    pub fn new(
        record: Arc<WorkerRecord>,
        liveness: Arc<LivenessMap>,
        events: broadcast::Sender<PoolEvent>,
        interval: Duration,
        stale_threshold: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            record,
            liveness,
            events,
            interval,
            stale_threshold,
            shutdown,
        }
    }

    /// Classify the worker as of `now` and write the result to the liveness
    /// map. Emits an event only when the classification changes.
    pub async fn evaluate_at(&self, now: DateTime<Utc>) -> bool {
        let worker_id = self.record.id();
        let last_activity_at = self.record.last_activity_at();

        // Negative idle time (clock skew) counts as fresh.
        let alive = now
            .signed_duration_since(last_activity_at)
            .to_std()
            .map_or(true, |idle| idle <= self.stale_threshold);

        match self.liveness.set(worker_id, alive).await {
            Some(previous) if previous != alive => {
                let event = if alive {
                    PoolEvent::WorkerMarkedAlive { worker_id }
                } else {
                    PoolEvent::WorkerMarkedDead {
                        worker_id,
                        last_activity_at,
                    }
                };
                events::emit(&self.events, event);
            }
            _ => trace!(worker_id, alive, "Liveness unchanged"),
        }

        alive
    }

    /// Run the evaluation loop until the coordinator shuts down.
    pub fn start(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // Skip immediate first tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = self.shutdown.changed() => break,
                    _ = ticker.tick() => {
                        self.evaluate_at(Utc::now()).await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::DEFAULT_EVENT_CAPACITY;

    struct Fixture {
        record: Arc<WorkerRecord>,
        liveness: Arc<LivenessMap>,
        events: broadcast::Receiver<PoolEvent>,
        monitor: HealthMonitor,
        shutdown: watch::Sender<bool>,
    }

    fn fixture(start: DateTime<Utc>) -> Fixture {
        let record = Arc::new(WorkerRecord::with_start_time(1, start));
        let liveness = Arc::new(LivenessMap::new(3));
        let (tx, events) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let monitor = HealthMonitor::new(
            Arc::clone(&record),
            Arc::clone(&liveness),
            tx,
            Duration::from_secs(60),
            Duration::from_secs(120),
            shutdown_rx,
        );
        Fixture {
            record,
            liveness,
            events,
            monitor,
            shutdown: shutdown_tx,
        }
    }

    #[tokio::test]
    async fn stale_worker_marked_dead() {
        let start = Utc::now();
        let mut f = fixture(start);

        assert!(f.monitor.evaluate_at(start + chrono::Duration::seconds(120)).await);
        assert!(!f.monitor.evaluate_at(start + chrono::Duration::seconds(121)).await);
        assert!(!f.liveness.is_alive(1).await);

        match f.events.recv().await.unwrap() {
            PoolEvent::WorkerMarkedDead { worker_id, .. } => assert_eq!(worker_id, 1),
            other => panic!("Expected WorkerMarkedDead, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn recent_activity_keeps_long_lived_worker_alive() {
        let start = Utc::now() - chrono::Duration::hours(6);
        let f = fixture(start);

        let now = Utc::now();
        f.record.touch(now - chrono::Duration::seconds(10));

        assert!(f.monitor.evaluate_at(now).await);
        assert!(f.liveness.is_alive(1).await);
    }

    #[tokio::test]
    async fn revived_worker_emits_alive_once() {
        let start = Utc::now();
        let mut f = fixture(start);
        let later = start + chrono::Duration::seconds(600);

        f.monitor.evaluate_at(later).await;
        f.record.touch(later);
        f.monitor.evaluate_at(later).await;
        f.monitor.evaluate_at(later).await;

        assert!(matches!(
            f.events.recv().await.unwrap(),
            PoolEvent::WorkerMarkedDead { .. }
        ));
        assert_eq!(
            f.events.recv().await.unwrap(),
            PoolEvent::WorkerMarkedAlive { worker_id: 1 }
        );
        assert!(f.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn sealed_map_is_not_revived() {
        let start = Utc::now();
        let f = fixture(start);
        f.liveness.seal().await;

        f.monitor.evaluate_at(start).await;
        assert!(!f.liveness.is_alive(1).await);
    }

    #[tokio::test]
    async fn loop_exits_on_shutdown() {
        let f = fixture(Utc::now());
        let join = f.monitor.start();
        f.shutdown.send_replace(true);

        tokio::time::timeout(Duration::from_secs(2), join)
            .await
            .expect("monitor did not stop")
            .unwrap();
    }
}
