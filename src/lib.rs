//! Task dispatch — a fixed-size worker pool with deterministic routing,
//! liveness monitoring and an append-only result store.

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod pool;

pub use config::{LogConfig, PoolConfig, ServerConfig};
pub use error::{DispatchError, Error, Result};
pub use events::PoolEvent;
pub use pool::{Coordinator, Task, WorkerStats};
