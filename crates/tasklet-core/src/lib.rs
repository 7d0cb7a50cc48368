//! # tasklet-core
//!
//! Core types for the tasklet task-execution runtime.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! Worker pools, process workers and the cooperative scheduler live in
//! `tasklet-runtime`.
//!
//! ## Modules
//!
//! - `id` - Task identifier type
//! - `state` - Future, worker and cooperative task states
//! - `error` - Error types
//! - `future` - Single-assignment result cell with callbacks
//! - `queue` - Blocking FIFO task queue
//! - `task` - Task trait and execution context
//! - `sync` - Locks, rwlock, semaphores, barrier, condition, event, once, wait group
//! - `cancel` - Cancellation token for cooperative cancellation
//! - `spinlock` - Spinlock for short critical sections
//! - `kprint` - Kernel-style logging macros
//! - `env` - Environment variable utilities

pub mod id;
pub mod state;
pub mod error;
pub mod future;
pub mod queue;
pub mod task;
pub mod sync;
pub mod cancel;
pub mod spinlock;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use id::TaskId;
pub use state::{FutureState, TaskState, WorkerState};
pub use error::{ChildFailure, Error, GroupError, Result, TaskError};
pub use future::{any_of, as_completed, wait_all, AsCompleted, Outcome, TaskFuture, WaitAsync};
pub use queue::{TaskQueue, TryPutError, TryTake};
pub use task::{FnTask, Task, TaskContext};
pub use sync::{
    Barrier, BarrierWaitResult, BoundedSemaphore, Condition, Event, Lock, LockGuard, Once,
    ReadGuard, ReentrantGuard, ReentrantLock, RwLock, Semaphore, SemaphorePermit, WaitGroup,
    WriteGuard,
};
pub use cancel::CancellationToken;
pub use spinlock::{SpinLock, SpinLockGuard};
pub use env::{env_get, env_get_bool, env_get_ms, env_get_opt};
