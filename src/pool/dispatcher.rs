//! Task routing.
//!
//! A single dispatcher task drains the intake queue and forwards each task to
//! one worker inbox. Routing decisions are therefore serial; no two tasks are
//! ever routed concurrently.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::WorkerId;
use super::liveness::LivenessMap;
use super::task::Task;
use super::worker::WorkerHandle;
use crate::error::DispatchError;
use crate::events::{self, PoolEvent};

/// A task waiting in the intake queue, with the channel its submitter awaits.
#[derive(Debug)]
pub(crate) struct Submission {
    pub task: Task,
    pub reply: oneshot::Sender<Result<WorkerId, DispatchError>>,
}

/// Where a task was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The primary worker (`id mod N`) was alive.
    Primary(WorkerId),
    /// The primary was dead; `to` is the next live worker in ascending order.
    Rerouted { from: WorkerId, to: WorkerId },
}

impl Route {
    pub fn target(&self) -> WorkerId {
        match *self {
            Route::Primary(worker_id) => worker_id,
            Route::Rerouted { to, .. } => to,
        }
    }
}

/// Primary worker for a task: `task_id mod num_workers`, always in `0..num_workers`.
pub fn primary_target(task_id: i64, num_workers: usize) -> WorkerId {
    debug_assert!(num_workers > 0);
    task_id.rem_euclid(num_workers as i64) as WorkerId
}

/// Pick a live worker for `task_id`.
///
/// Tries the primary first, then scans upward from `primary + 1`, wrapping at
/// most once. `None` means every worker is dead.
pub fn select_route(task_id: i64, alive: &[bool]) -> Option<Route> {
    let n = alive.len();
    if n == 0 {
        return None;
    }

    let primary = primary_target(task_id, n);
    if alive[primary] {
        return Some(Route::Primary(primary));
    }

    (1..n)
        .map(|offset| (primary + offset) % n)
        .find(|&candidate| alive[candidate])
        .map(|to| Route::Rerouted { from: primary, to })
}

/// Serial router between the intake queue and the worker inboxes.
///
/// Inboxes are bounded. When the chosen inbox is full the dispatcher waits for
/// room, and every task behind it in the intake waits too, including tasks
/// bound for idle workers. This head-of-line coupling is accepted in exchange
/// for bounded memory; size `inbox_capacity` accordingly.
pub struct Dispatcher {
    intake: mpsc::Receiver<Submission>,
    workers: Vec<WorkerHandle>,
    liveness: Arc<LivenessMap>,
    events: broadcast::Sender<PoolEvent>,
    shutdown: watch::Receiver<bool>,
}

impl Dispatcher {
    pub(crate) fn new(
        intake: mpsc::Receiver<Submission>,
        workers: Vec<WorkerHandle>,
        liveness: Arc<LivenessMap>,
        events: broadcast::Sender<PoolEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            intake,
            workers,
            liveness,
            events,
            shutdown,
        }
    }

    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                submission = self.intake.recv() => match submission {
                    Some(submission) => self.dispatch(submission).await,
                    None => break,
                },
            }
        }

        // Nothing queued is left unanswered.
        self.intake.close();
        let mut rejected = 0usize;
        while let Ok(submission) = self.intake.try_recv() {
            let _ = submission.reply.send(Err(DispatchError::Stopped));
            rejected += 1;
        }
        debug!(rejected, "Dispatcher stopped");
    }

    async fn dispatch(&self, submission: Submission) {
        let Submission { task, reply } = submission;
        let outcome = self.forward(task).await;
        // The submitter may have given up waiting; the outcome still stands.
        let _ = reply.send(outcome);
    }

    async fn forward(&self, task: Task) -> Result<WorkerId, DispatchError> {
        let task_id = task.id;

        // Decide and count under the liveness read lock so a concurrent stop
        // (which seals the map under the write lock) either precedes the
        // decision entirely or sees its counter increment.
        let route = {
            let liveness = self.liveness.read().await;
            if liveness.is_sealed() {
                return Err(DispatchError::Stopped);
            }
            let route = select_route(task_id, liveness.as_slice());
            if let Some(route) = route {
                self.workers[route.target()].record().record_dispatch();
            }
            route
        };

        let Some(route) = route else {
            warn!(task_id, "No live worker, rejecting task");
            return Err(DispatchError::AllWorkersDown { task_id });
        };

        let target = route.target();
        self.workers[target]
            .inbox()
            .send(task)
            .await
            .map_err(|_| DispatchError::Stopped)?;

        let event = match route {
            Route::Primary(worker_id) => PoolEvent::TaskDispatched { task_id, worker_id },
            Route::Rerouted { from, to } => PoolEvent::TaskRerouted {
                task_id,
                from_worker: from,
                to_worker: to,
            },
        };
        events::emit(&self.events, event);

        Ok(target)
    }
}
