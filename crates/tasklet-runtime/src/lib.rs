//! # tasklet-runtime
//!
//! Execution engines for the tasklet task runtime.
//!
//! This crate provides:
//! - `executor` - Fixed-size worker pool with thread- or process-backed workers
//! - `process` - Task registry, pipe codec and shared memory for process workers
//! - `coop` - Single-threaded cooperative scheduler for `async` tasks
//! - `config` - Environment-driven configuration
//! - `parking` - Idle parking of the cooperative loop (futex on Linux)
//!
//! The worker pool and the cooperative scheduler are independent. The
//! bridges between them are [`coop::to_background`], which runs a blocking
//! call on a pool, and `TaskFuture::wait_async`, which lets a cooperative
//! task await a pool future.

pub mod config;
pub mod parking;
pub mod process;
pub mod executor;
pub mod coop;

// Re-exports
pub use config::{ConfigError, ExecutionMode, ExecutorConfig, SchedulerConfig};
pub use executor::{current_worker_id, Executor, ExecutorBuilder, Initializer};
pub use process::TaskRegistry;
#[cfg(unix)]
pub use process::SharedValue;
pub use coop::{
    gather, join_all, sleep, spawn, timeout, to_background, wait_for, yield_now, JoinHandle,
    Scheduler, TaskGroup,
};
pub use parking::{new_parking, LoopParking};
