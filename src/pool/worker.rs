//! Worker actor and its progress record.
//!
//! Each worker is one tokio task draining a private bounded inbox:
//!
//! ```text
//! Idle ──task──▶ Processing ──done──▶ Idle
//!  │
//!  └──quit──▶ Stopped
//! ```
//!
//! A task being processed always finishes before the quit signal is observed.
//! Tasks still queued in the inbox when quit arrives are abandoned: they are
//! neither processed nor handed back. Callers that need durability must not
//! rely on the pool for it.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, trace};

use super::WorkerId;
use super::store::ResultStore;
use super::task::Task;
use crate::events::{self, PoolEvent};

/// Counters and timestamps for one worker.
///
/// Counters are written by the dispatcher (`total_dispatched`) and by the
/// worker itself (`total_completed`, last activity); everyone else reads.
#[derive(Debug)]
pub struct WorkerRecord {
    id: WorkerId,
    started_at: DateTime<Utc>,
    /// Nanoseconds since the Unix epoch, same precision as `started_at`.
    /// Only ever raised.
    last_activity_ns: AtomicI64,
    total_dispatched: AtomicU64,
    total_completed: AtomicU64,
}

impl WorkerRecord {
    pub fn new(id: WorkerId) -> Self {
        Self::with_start_time(id, Utc::now())
    }

    /// Create a record with an explicit start time.
    pub fn with_start_time(id: WorkerId, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            started_at,
            last_activity_ns: AtomicI64::new(started_at.timestamp_nanos_opt().unwrap_or(0)),
            total_dispatched: AtomicU64::new(0),
            total_completed: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Never earlier than the start time.
    pub fn last_activity_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.last_activity_ns.load(Ordering::Acquire))
            .max(self.started_at)
    }

    /// Advance the activity timestamp. Earlier timestamps, and times outside
    /// the nanosecond-representable range, are ignored.
    pub fn touch(&self, at: DateTime<Utc>) {
        if let Some(nanos) = at.timestamp_nanos_opt() {
            self.last_activity_ns.fetch_max(nanos, Ordering::AcqRel);
        }
    }

    pub fn total_dispatched(&self) -> u64 {
        self.total_dispatched.load(Ordering::Relaxed)
    }

    pub fn total_completed(&self) -> u64 {
        self.total_completed.load(Ordering::Relaxed)
    }

    pub(crate) fn record_dispatch(&self) {
        self.total_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    fn record_completion(&self, at: DateTime<Utc>) {
        self.total_completed.fetch_add(1, Ordering::Relaxed);
        self.touch(at);
    }

    /// Read-only snapshot. `alive` comes from the liveness map.
    pub fn stats(&self, alive: bool) -> WorkerStats {
        WorkerStats {
            id: self.id,
            total_dispatched: self.total_dispatched(),
            total_completed: self.total_completed(),
            started_at: self.started_at,
            last_activity_at: self.last_activity_at(),
            alive,
        }
    }
}

/// Point-in-time view of a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub id: WorkerId,
    pub total_dispatched: u64,
    pub total_completed: u64,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub alive: bool,
}

/// Coordinator-side handle to a running worker.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    record: Arc<WorkerRecord>,
    inbox: mpsc::Sender<Task>,
    quit: Arc<watch::Sender<bool>>,
}

impl WorkerHandle {
    pub fn id(&self) -> WorkerId {
        self.record.id
    }

    pub fn record(&self) -> &Arc<WorkerRecord> {
        &self.record
    }

    pub fn inbox(&self) -> &mpsc::Sender<Task> {
        &self.inbox
    }

    /// Signal the worker to quit. Safe to call more than once.
    pub fn stop(&self) {
        self.quit.send_replace(true);
    }

}

/// The worker actor. Consumed by [`Worker::start`].
pub struct Worker {
    record: Arc<WorkerRecord>,
    inbox: mpsc::Receiver<Task>,
    quit: watch::Receiver<bool>,
    store: Arc<ResultStore>,
    events: broadcast::Sender<PoolEvent>,
    heartbeat: Option<Duration>,
}

impl Worker {
    /// Create a worker and the handle used to feed and stop it.
    pub fn new(
        record: Arc<WorkerRecord>,
        inbox_capacity: usize,
        store: Arc<ResultStore>,
        events: broadcast::Sender<PoolEvent>,
        heartbeat: Option<Duration>,
    ) -> (Self, WorkerHandle) {
        let (inbox_tx, inbox_rx) = mpsc::channel(inbox_capacity);
        let (quit_tx, quit_rx) = watch::channel(false);

        let handle = WorkerHandle {
            record: Arc::clone(&record),
            inbox: inbox_tx,
            quit: Arc::new(quit_tx),
        };
        let worker = Self {
            record,
            inbox: inbox_rx,
            quit: quit_rx,
            store,
            events,
            heartbeat,
        };
        (worker, handle)
    }

    /// Begin consuming the inbox on a new tokio task.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let worker_id = self.record.id;
        debug!(worker_id, "Worker started");

        let mut heartbeat = self.heartbeat.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                // Quit wins over anything still queued in the inbox.
                biased;

                // Only `true` is ever sent; a dropped sender also means quit.
                _ = self.quit.changed() => break,

                task = self.inbox.recv() => match task {
                    Some(task) => self.process(task).await,
                    // Every sender is gone: the coordinator was dropped.
                    None => break,
                },

                _ = next_beat(&mut heartbeat) => {
                    self.record.touch(Utc::now());
                    trace!(worker_id, "Idle heartbeat");
                }
            }
        }

        events::emit(&self.events, PoolEvent::WorkerStopped { worker_id });
    }

    async fn process(&self, task: Task) {
        let task_id = task.id;
        let completed = task.complete(self.record.id);
        // Counted before it becomes visible, so a results snapshot never runs
        // ahead of the counters.
        self.record.record_completion(Utc::now());
        self.store.append(completed).await;
        trace!(worker_id = self.record.id, task_id, "Task completed");
    }
}

async fn next_beat(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
