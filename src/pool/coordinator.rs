//! Coordinator — owns and wires the worker pool.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::WorkerId;
use super::dispatcher::{Dispatcher, Submission};
use super::health::HealthMonitor;
use super::liveness::LivenessMap;
use super::store::ResultStore;
use super::task::Task;
use super::worker::{Worker, WorkerHandle, WorkerRecord, WorkerStats};
use crate::config::PoolConfig;
use crate::error::{ConfigError, DispatchError};
use crate::events::{DEFAULT_EVENT_CAPACITY, PoolEvent};

/// Entry point for callers: submit tasks, read results and stats, stop.
///
/// Owns `num_workers` workers (IDs `0..num_workers`), one health monitor per
/// worker, the dispatcher and the result store. The worker set never changes
/// after [`Coordinator::start`].
pub struct Coordinator {
    workers: Vec<WorkerHandle>,
    liveness: Arc<LivenessMap>,
    store: Arc<ResultStore>,
    intake: mpsc::Sender<Submission>,
    events: broadcast::Sender<PoolEvent>,
    shutdown: watch::Sender<bool>,
    stopped: AtomicBool,
    /// Worker, monitor and dispatcher tasks, drained by [`Coordinator::join`].
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Coordinator {
    /// Build the pool and start every worker, monitor and the dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: PoolConfig) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;

        let store = Arc::new(ResultStore::new());
        let liveness = Arc::new(LivenessMap::new(config.num_workers));
        let (events, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        let (shutdown, _) = watch::channel(false);
        let (intake_tx, intake_rx) = mpsc::channel(config.intake_capacity);

        let mut tasks = Vec::with_capacity(config.num_workers * 2 + 1);
        let mut workers = Vec::with_capacity(config.num_workers);

        for worker_id in 0..config.num_workers {
            let record = Arc::new(WorkerRecord::new(worker_id));
            let (worker, handle) = Worker::new(
                Arc::clone(&record),
                config.inbox_capacity,
                Arc::clone(&store),
                events.clone(),
                config.heartbeat_interval,
            );
            tasks.push(worker.start());

            let monitor = HealthMonitor::new(
                record,
                Arc::clone(&liveness),
                events.clone(),
                config.health_check_interval,
                config.stale_threshold,
                shutdown.subscribe(),
            );
            tasks.push(monitor.start());

            workers.push(handle);
        }

        let dispatcher = Dispatcher::new(
            intake_rx,
            workers.clone(),
            Arc::clone(&liveness),
            events.clone(),
            shutdown.subscribe(),
        );
        tasks.push(dispatcher.start());

        info!(
            workers = config.num_workers,
            inbox_capacity = config.inbox_capacity,
            stale_threshold_secs = config.stale_threshold.as_secs(),
            "Worker pool started"
        );

        Ok(Arc::new(Self {
            workers,
            liveness,
            store,
            intake: intake_tx,
            events,
            shutdown,
            stopped: AtomicBool::new(false),
            tasks: Mutex::new(tasks),
        }))
    }

    /// Submit a task and wait for its routing outcome.
    ///
    /// `Ok` carries the worker the task was delivered to. Delivery means the
    /// task sits in that worker's inbox; a later [`Coordinator::stop`] may
    /// still abandon it there.
    pub async fn submit(&self, task: Task) -> Result<WorkerId, DispatchError> {
        if self.is_stopped() {
            return Err(DispatchError::Stopped);
        }

        let (reply, outcome) = oneshot::channel();
        self.intake
            .send(Submission { task, reply })
            .await
            .map_err(|_| DispatchError::Stopped)?;

        outcome.await.map_err(|_| DispatchError::Stopped)?
    }

    /// Completed tasks in completion order.
    pub async fn results(&self) -> Vec<Task> {
        self.store.snapshot().await
    }

    /// Per-worker statistics keyed by worker ID.
    pub async fn worker_stats(&self) -> BTreeMap<WorkerId, WorkerStats> {
        let alive = self.liveness.snapshot().await;
        self.workers
            .iter()
            .map(|worker| {
                let id = worker.id();
                (id, worker.record().stats(alive[id]))
            })
            .collect()
    }

    /// Stop the pool.
    ///
    /// Marks every worker dead, rejects further submissions and signals every
    /// worker to quit. Does not wait: a task mid-processing still completes,
    /// tasks queued in inboxes are abandoned. Use [`Coordinator::join`] to wait
    /// for the actors to exit. Calling this more than once is harmless.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        self.liveness.seal().await;
        self.shutdown.send_replace(true);
        for worker in &self.workers {
            worker.stop();
        }

        info!(workers = self.workers.len(), "Worker pool stopping");
    }

    /// Wait for every worker, monitor and the dispatcher to exit.
    pub async fn join(&self) {
        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "Pool task ended abnormally");
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Shared liveness map (read by the dispatcher, written by monitors).
    pub fn liveness(&self) -> &Arc<LivenessMap> {
        &self.liveness
    }

    /// Subscribe to pool events.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }
}
