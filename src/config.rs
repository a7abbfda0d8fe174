//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of workers. Fixed for the lifetime of the coordinator.
    pub num_workers: usize,
    /// Capacity of each worker inbox. A full inbox blocks the dispatcher.
    pub inbox_capacity: usize,
    /// Capacity of the intake queue between Submit and the dispatcher.
    pub intake_capacity: usize,
    /// How often each worker's liveness is evaluated.
    pub health_check_interval: Duration,
    /// A worker idle for longer than this is marked dead.
    pub stale_threshold: Duration,
    /// Idle workers refresh their activity timestamp this often (`None` disables).
    pub heartbeat_interval: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 5,
            inbox_capacity: 64,
            intake_capacity: 1024,
            health_check_interval: Duration::from_secs(60), // 1 minute
            stale_threshold: Duration::from_secs(120),      // 2 minutes
            heartbeat_interval: Some(Duration::from_secs(30)),
        }
    }
}

impl PoolConfig {
    /// Create a default configuration with the given pool size.
    pub fn with_workers(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Self::default()
        }
    }

    /// Build config from `TASK_POOL_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let heartbeat_secs: u64 = env_or(
            "TASK_POOL_HEARTBEAT_SECS",
            defaults.heartbeat_interval.map_or(0, |d| d.as_secs()),
        )?;

        let config = Self {
            num_workers: env_or("TASK_POOL_WORKERS", defaults.num_workers)?,
            inbox_capacity: env_or("TASK_POOL_INBOX_CAPACITY", defaults.inbox_capacity)?,
            intake_capacity: env_or("TASK_POOL_INTAKE_CAPACITY", defaults.intake_capacity)?,
            health_check_interval: Duration::from_secs(env_or(
                "TASK_POOL_HEALTH_INTERVAL_SECS",
                defaults.health_check_interval.as_secs(),
            )?),
            stale_threshold: Duration::from_secs(env_or(
                "TASK_POOL_STALE_SECS",
                defaults.stale_threshold.as_secs(),
            )?),
            heartbeat_interval: (heartbeat_secs > 0).then(|| Duration::from_secs(heartbeat_secs)),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pool cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers == 0 {
            return Err(invalid("num_workers", "must be at least 1"));
        }
        if self.inbox_capacity == 0 {
            return Err(invalid("inbox_capacity", "must be at least 1"));
        }
        if self.intake_capacity == 0 {
            return Err(invalid("intake_capacity", "must be at least 1"));
        }
        if self.health_check_interval.is_zero() {
            return Err(invalid("health_check_interval", "must be non-zero"));
        }
        if let Some(heartbeat) = self.heartbeat_interval {
            if heartbeat.is_zero() || heartbeat >= self.stale_threshold {
                return Err(invalid(
                    "heartbeat_interval",
                    "must be non-zero and shorter than stale_threshold",
                ));
            }
        }
        Ok(())
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Deadline for draining connections after a shutdown signal.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            bind_addr: std::env::var("TASK_POOL_BIND").unwrap_or(defaults.bind_addr),
            shutdown_timeout: Duration::from_secs(env_or(
                "TASK_POOL_SHUTDOWN_TIMEOUT_SECS",
                defaults.shutdown_timeout.as_secs(),
            )?),
        })
    }
}

/// Log file configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Directory that receives the rolling log files.
    pub dir: PathBuf,
    /// File name prefix; the rotation date is appended.
    pub file_prefix: String,
    /// Number of rotated files kept on disk.
    pub max_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./logs"),
            file_prefix: "task-dispatch.log".to_string(),
            max_files: 7,
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let max_files = env_or("TASK_POOL_LOG_MAX_FILES", defaults.max_files)?;
        if max_files == 0 {
            return Err(invalid("TASK_POOL_LOG_MAX_FILES", "must be at least 1"));
        }
        Ok(Self {
            dir: std::env::var("TASK_POOL_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.dir),
            file_prefix: defaults.file_prefix,
            max_files,
        })
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

/// Read and parse an env var, using `default` when it is unset.
fn env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
        Err(std::env::VarError::NotPresent) => Ok(default),
        Err(e) => Err(ConfigError::ParseError(format!("{key}: {e}"))),
    }
}
