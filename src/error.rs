//! Error types for the task dispatch service.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a submission was not accepted.
///
/// A task is either delivered to exactly one worker's inbox or rejected with
/// one of these; it is never dropped silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The coordinator has begun stopping. The task was not queued.
    #[error("Coordinator is stopped")]
    Stopped,

    /// No live worker was found after a full reroute scan.
    #[error("All workers are down, task {task_id} not accepted")]
    AllWorkersDown { task_id: i64 },
}

impl DispatchError {
    /// Stable machine-readable tag, used by the transport layer.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::AllWorkersDown { .. } => "all_workers_down",
        }
    }
}

/// HTTP transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),

    #[error("Graceful shutdown exceeded {timeout_secs}s")]
    ShutdownTimeout { timeout_secs: u64 },
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
