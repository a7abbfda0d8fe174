//! Worker pool — task routing, worker lifecycle and result collection.
//!
//! Core components:
//! - `task` — Task type and the processing transform
//! - `store` — append-only ResultStore
//! - `liveness` — shared WorkerID → alive map
//! - `worker` — Worker actor, its record and stats
//! - `health` — periodic liveness evaluation per worker
//! - `dispatcher` — serial router with reroute-on-dead-worker
//! - `coordinator` — wires everything and exposes submit/results/stats/stop

pub mod coordinator;
pub mod dispatcher;
pub mod health;
pub mod liveness;
pub mod store;
pub mod task;
pub mod worker;

/// Worker identifier, `0..num_workers`.
pub type WorkerId = usize;

pub use coordinator::Coordinator;
pub use dispatcher::{Route, primary_target, select_route};
pub use health::HealthMonitor;
pub use liveness::LivenessMap;
pub use store::ResultStore;
pub use task::Task;
pub use worker::{WorkerRecord, WorkerStats};
