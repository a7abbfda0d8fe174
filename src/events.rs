//! Pool lifecycle events.
//!
//! Events are fire-and-forget: each one is logged through `tracing` and fanned
//! out on a broadcast channel for live subscribers (e.g. the `/ws/events`
//! WebSocket). Nothing in the pool waits on, or observes the outcome of, an
//! emission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::pool::WorkerId;

/// Default broadcast channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Something observable happened in the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolEvent {
    /// A task was forwarded to its primary worker.
    TaskDispatched { task_id: i64, worker_id: WorkerId },
    /// The primary worker was dead; the task went to the next live one.
    TaskRerouted {
        task_id: i64,
        from_worker: WorkerId,
        to_worker: WorkerId,
    },
    /// The health monitor classified a worker as dead.
    WorkerMarkedDead {
        worker_id: WorkerId,
        last_activity_at: DateTime<Utc>,
    },
    /// The health monitor classified a previously dead worker as alive again.
    WorkerMarkedAlive { worker_id: WorkerId },
    /// A worker observed its quit signal and exited.
    WorkerStopped { worker_id: WorkerId },
}

/// Log an event and broadcast it. Having no subscribers is not an error.
pub(crate) fn emit(tx: &broadcast::Sender<PoolEvent>, event: PoolEvent) {
    match &event {
        PoolEvent::TaskDispatched { task_id, worker_id } => {
            debug!(task_id, worker_id, "Task dispatched");
        }
        PoolEvent::TaskRerouted {
            task_id,
            from_worker,
            to_worker,
        } => {
            info!(task_id, from_worker, to_worker, "Task rerouted");
        }
        PoolEvent::WorkerMarkedDead {
            worker_id,
            last_activity_at,
        } => {
            warn!(worker_id, last_activity_at = %last_activity_at, "Worker marked dead");
        }
        PoolEvent::WorkerMarkedAlive { worker_id } => {
            info!(worker_id, "Worker marked alive");
        }
        PoolEvent::WorkerStopped { worker_id } => {
            info!(worker_id, "Worker stopped");
        }
    }

    let _ = tx.send(event);
}
