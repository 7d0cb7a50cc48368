//! Runtime configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls
//! 2. Environment variables (`from_env()` only)
//! 3. Library defaults (`config::defaults`)
//!
//! # Example
//!
//! ```rust,ignore
//! use tasklet_runtime::config::{ExecutionMode, ExecutorConfig};
//!
//! let config = ExecutorConfig::from_env()
//!     .num_workers(8)
//!     .mode(ExecutionMode::Processes);
//! ```

pub mod defaults;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tasklet_core::env::{env_get, env_get_bool, env_get_ms};
use tasklet_core::{kprintln, Error};

/// How pool workers execute tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Worker threads sharing the submitter's address space
    Threads,
    /// One forked child process per worker; tasks must be registered by name
    Processes,
}

impl FromStr for ExecutionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "threads" | "thread" => Ok(ExecutionMode::Threads),
            "processes" | "process" => Ok(ExecutionMode::Processes),
            _ => Err(ConfigError::InvalidValue("mode must be `threads` or `processes`")),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Threads => f.write_str("threads"),
            ExecutionMode::Processes => f.write_str("processes"),
        }
    }
}

/// Worker pool configuration with builder pattern
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Number of workers (K)
    pub num_workers: usize,
    /// Thread- or process-backed workers
    pub mode: ExecutionMode,
    /// Task queue bound; `None` for unbounded
    pub queue_capacity: Option<usize>,
    /// Worker thread name prefix
    pub thread_name_prefix: String,
    /// Log pool lifecycle at debug level
    pub debug_logging: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ExecutorConfig {
    /// Library defaults with environment overrides
    ///
    /// Environment variables (all optional):
    /// - `TASKLET_NUM_WORKERS` - Number of workers
    /// - `TASKLET_MODE` - `threads` or `processes`
    /// - `TASKLET_QUEUE_CAPACITY` - Queue bound, 0 for unbounded
    /// - `TASKLET_THREAD_PREFIX` - Worker thread name prefix
    /// - `TASKLET_DEBUG` - Enable debug logging (0/1)
    pub fn from_env() -> Self {
        let default_mode = defaults::MODE.parse().unwrap_or(ExecutionMode::Threads);
        let capacity = env_get("TASKLET_QUEUE_CAPACITY", defaults::QUEUE_CAPACITY);
        Self {
            num_workers: env_get("TASKLET_NUM_WORKERS", defaults::num_workers()),
            mode: env_get("TASKLET_MODE", default_mode),
            queue_capacity: (capacity > 0).then_some(capacity),
            thread_name_prefix: env_get(
                "TASKLET_THREAD_PREFIX",
                defaults::THREAD_NAME_PREFIX.to_string(),
            ),
            debug_logging: env_get_bool("TASKLET_DEBUG", defaults::DEBUG_LOGGING),
        }
    }

    /// Library defaults only, ignoring the environment
    pub fn new() -> Self {
        Self {
            num_workers: defaults::num_workers(),
            mode: ExecutionMode::Threads,
            queue_capacity: None,
            thread_name_prefix: defaults::THREAD_NAME_PREFIX.to_string(),
            debug_logging: defaults::DEBUG_LOGGING,
        }
    }

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn queue_capacity(mut self, capacity: Option<usize>) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers == 0 {
            return Err(ConfigError::InvalidValue("num_workers must be > 0"));
        }
        if self.num_workers > defaults::MAX_WORKERS {
            return Err(ConfigError::InvalidValue("num_workers must be <= 256"));
        }
        if self.queue_capacity == Some(0) {
            return Err(ConfigError::InvalidValue("queue_capacity must be > 0 when bounded"));
        }
        if self.thread_name_prefix.is_empty() {
            return Err(ConfigError::InvalidValue("thread_name_prefix must not be empty"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        kprintln!("Executor Configuration:");
        kprintln!("  num_workers:         {}", self.num_workers);
        kprintln!("  mode:                {}", self.mode);
        match self.queue_capacity {
            Some(cap) => kprintln!("  queue_capacity:      {}", cap),
            None => kprintln!("  queue_capacity:      unbounded"),
        }
        kprintln!("  thread_name_prefix:  {}", self.thread_name_prefix);
        kprintln!("  debug_logging:       {}", self.debug_logging);
    }
}

/// Cooperative scheduler configuration with builder pattern
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Longest idle park of the run loop
    pub park_timeout: Duration,
    /// Threads backing `to_background`
    pub blocking_workers: usize,
    /// Log loop lifecycle at debug level
    pub debug_logging: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl SchedulerConfig {
    /// Library defaults with environment overrides
    ///
    /// Environment variables (all optional):
    /// - `TASKLET_PARK_TIMEOUT_MS` - Idle park timeout in milliseconds
    /// - `TASKLET_BLOCKING_WORKERS` - Threads for blocking offload
    /// - `TASKLET_DEBUG` - Enable debug logging (0/1)
    pub fn from_env() -> Self {
        Self {
            park_timeout: env_get_ms(
                "TASKLET_PARK_TIMEOUT_MS",
                Duration::from_millis(defaults::PARK_TIMEOUT_MS),
            ),
            blocking_workers: env_get("TASKLET_BLOCKING_WORKERS", defaults::BLOCKING_WORKERS),
            debug_logging: env_get_bool("TASKLET_DEBUG", defaults::DEBUG_LOGGING),
        }
    }

    /// Library defaults only, ignoring the environment
    pub fn new() -> Self {
        Self {
            park_timeout: Duration::from_millis(defaults::PARK_TIMEOUT_MS),
            blocking_workers: defaults::BLOCKING_WORKERS,
            debug_logging: defaults::DEBUG_LOGGING,
        }
    }

    pub fn park_timeout(mut self, d: Duration) -> Self {
        self.park_timeout = d;
        self
    }

    pub fn blocking_workers(mut self, n: usize) -> Self {
        self.blocking_workers = n;
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.park_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("park_timeout must be > 0"));
        }
        if self.blocking_workers == 0 {
            return Err(ConfigError::InvalidValue("blocking_workers must be > 0"));
        }
        if self.blocking_workers > defaults::MAX_WORKERS {
            return Err(ConfigError::InvalidValue("blocking_workers must be <= 256"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        kprintln!("Scheduler Configuration:");
        kprintln!("  park_timeout:        {:?}", self.park_timeout);
        kprintln!("  blocking_workers:    {}", self.blocking_workers);
        kprintln!("  debug_logging:       {}", self.debug_logging);
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    InvalidValue(&'static str),
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::InvalidValue(msg) => Error::Config(msg.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_valid() {
        assert!(ExecutorConfig::new().validate().is_ok());
        assert!(SchedulerConfig::new().validate().is_ok());
        assert!(ExecutorConfig::new().num_workers >= 1);
    }

    #[test]
    fn test_builder() {
        let config = ExecutorConfig::new()
            .num_workers(8)
            .mode(ExecutionMode::Processes)
            .queue_capacity(Some(16))
            .thread_name_prefix("crunch");

        assert_eq!(config.num_workers, 8);
        assert_eq!(config.mode, ExecutionMode::Processes);
        assert_eq!(config.queue_capacity, Some(16));
        assert_eq!(config.thread_name_prefix, "crunch");
    }

    #[test]
    fn test_validate_rejects() {
        assert_eq!(
            ExecutorConfig::new().num_workers(0).validate(),
            Err(ConfigError::InvalidValue("num_workers must be > 0"))
        );
        assert!(ExecutorConfig::new().num_workers(1000).validate().is_err());
        assert!(ExecutorConfig::new().queue_capacity(Some(0)).validate().is_err());
        assert!(ExecutorConfig::new().thread_name_prefix("").validate().is_err());
        assert!(SchedulerConfig::new().park_timeout(Duration::ZERO).validate().is_err());
        assert!(SchedulerConfig::new().blocking_workers(0).validate().is_err());
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("Processes".parse::<ExecutionMode>(), Ok(ExecutionMode::Processes));
        assert_eq!("threads".parse::<ExecutionMode>(), Ok(ExecutionMode::Threads));
        assert!("fibers".parse::<ExecutionMode>().is_err());
    }

    #[test]
    fn test_config_error_converts() {
        let err: Error = ConfigError::InvalidValue("num_workers must be > 0").into();
        assert_eq!(err, Error::Config("num_workers must be > 0".to_string()));
    }
}
