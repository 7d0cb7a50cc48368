//! # tasklet - minimal concurrent task-execution runtime
//!
//! Two execution models behind one crate:
//!
//! - **Worker pool** ([`Executor`]): K threads or K forked processes pull
//!   tasks from a FIFO queue and resolve a [`TaskFuture`] per task. Supports
//!   `map`, callbacks, cancellation of queued tasks and graceful or
//!   immediate shutdown.
//! - **Cooperative scheduler** ([`Scheduler`]): one thread interleaves
//!   `async` tasks at their `.await` points, with timers, `gather`,
//!   structured [`TaskGroup`]s, timeouts and [`to_background`] for blocking
//!   calls.
//!
//! Plus the synchronization primitives both rely on: locks (plain,
//! reentrant, readers-writer), semaphores, barrier, condition, event, once,
//! wait groups and cancellation tokens. Futures chain with `map`,
//! `and_then`, `recover` and race with [`any_of`].
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::time::Duration;
//! use tasklet::{gather, sleep, spawn, thread_pool};
//!
//! let pool = thread_pool(4)?;
//! let squares = pool.map(|x: u64| Ok(x * x), 1..=5)?;
//! assert_eq!(squares[4].get(None)?, 25);
//!
//! let total = tasklet::run(async {
//!     let a = spawn(async { sleep(Duration::from_millis(10)).await; Ok(1) })?;
//!     let b = spawn(async { Ok(2) })?;
//!     Ok(gather(vec![a, b]).await?.into_iter().sum::<i32>())
//! })?;
//! assert_eq!(total, 3);
//! ```
//!
//! ## Architecture
//!
//! ```text
//!   submit / map                   run / spawn
//!        │                              │
//!        ▼                              ▼
//!  ┌───────────┐                ┌──────────────┐
//!  │ TaskQueue │                │   injector   │◀── wakers
//!  └───────────┘                └──────────────┘
//!        │                              │
//!   ┌────┴────┐                         ▼
//!   ▼         ▼                 ┌──────────────┐
//! worker    worker ◀────────────│   run loop   │  (to_background)
//!   │         │                 └──────────────┘
//!   ▼         ▼                         ▲
//!  TaskFuture ─────── wait_async ───────┘
//! ```
//!
//! In process mode each worker forwards named tasks to a forked child over
//! a pipe pair, one JSON document per line.

use std::future::Future;

// Re-export core types
pub use tasklet_core::{
    any_of, as_completed, wait_all, AsCompleted, CancellationToken, ChildFailure, Error, FnTask,
    FutureState, GroupError, Outcome, Result, Task, TaskContext, TaskError, TaskFuture, TaskId,
    TaskQueue, TaskState, TryPutError, TryTake, WaitAsync, WorkerState,
};

// Synchronization primitives
pub use tasklet_core::{
    Barrier, BarrierWaitResult, BoundedSemaphore, Condition, Event, Lock, LockGuard, Once,
    ReadGuard, ReentrantGuard, ReentrantLock, RwLock, Semaphore, SemaphorePermit, WaitGroup,
    WriteGuard,
};

// Re-export kprint macros for logging
pub use tasklet_core::kprint::{init as init_logging, set_flush_enabled, set_log_level, LogLevel};
pub use tasklet_core::{kdebug, kerror, kinfo, kprint, kprintln, ktrace, kwarn};

// Re-export env utilities
pub use tasklet_core::{env_get, env_get_bool, env_get_ms, env_get_opt};

// Re-export runtime types
pub use tasklet_runtime::{
    current_worker_id, gather, join_all, sleep, spawn, timeout, to_background, wait_for,
    yield_now, ExecutionMode, Executor, ExecutorBuilder, ExecutorConfig, JoinHandle, Scheduler,
    SchedulerConfig, TaskGroup, TaskRegistry,
};
#[cfg(unix)]
pub use tasklet_runtime::SharedValue;

/// Drive `future` on a cooperative scheduler configured from the environment
///
/// Shorthand for `Scheduler::new(SchedulerConfig::from_env())?.run(future)`.
pub fn run<F, T>(future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    Scheduler::new(SchedulerConfig::from_env())?.run(future)
}

/// Thread-backed pool of `num_workers` workers, other settings from the
/// environment
pub fn thread_pool(num_workers: usize) -> Result<Executor> {
    Executor::new(
        ExecutorConfig::from_env()
            .num_workers(num_workers)
            .mode(ExecutionMode::Threads),
    )
}

/// Process-backed pool running the tasks in `registry`
#[cfg(unix)]
pub fn process_pool(num_workers: usize, registry: TaskRegistry) -> Result<Executor> {
    Executor::builder(
        ExecutorConfig::from_env()
            .num_workers(num_workers)
            .mode(ExecutionMode::Processes),
    )
    .registry(registry)
    .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_thread_pool_map() {
        let pool = thread_pool(3).unwrap();
        let futures = pool.map(|x: u64| Ok(x * x), [1, 2, 3, 4, 5]).unwrap();
        let values: Vec<u64> = futures.iter().map(|f| f.get(None).unwrap()).collect();
        assert_eq!(values, vec![1, 4, 9, 16, 25]);
    }

    #[test]
    fn test_run_with_pool_bridge() {
        let pool = thread_pool(1).unwrap();
        let value = run(async {
            let pooled = pool.submit(|_| Ok(20u32))?;
            let offloaded = to_background(|| 22u32).await?;
            Ok(pooled.wait_async().await? + offloaded)
        });
        assert_eq!(value, Ok(42));
    }

    #[test]
    fn test_run_timeout_error_kind() {
        let result = run(timeout(Duration::from_millis(10), async {
            sleep(Duration::from_secs(5)).await;
            Ok(())
        }));
        assert!(result.unwrap_err().is_timeout());
    }
}
