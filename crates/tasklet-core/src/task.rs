//! Units of work for pool workers

use crate::cancel::CancellationToken;
use crate::error::{Result, TaskError};
use crate::id::TaskId;

/// Per-execution context handed to a running task
///
/// Carries the task's identity, the worker running it, and the token
/// cancelled by `TaskFuture::cancel` or `Executor::shutdown_now`.
#[derive(Debug, Clone)]
pub struct TaskContext {
    task_id: TaskId,
    worker_id: usize,
    token: CancellationToken,
}

impl TaskContext {
    pub fn new(task_id: TaskId, worker_id: usize, token: CancellationToken) -> Self {
        Self {
            task_id,
            worker_id,
            token,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Index of the worker executing the task
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// True once cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// `Err(Cancelled)` once cancellation was requested
    pub fn check(&self) -> Result<()> {
        self.token.check()
    }
}

/// A unit of work with a single execute capability
///
/// The output type is fixed when the task is submitted.
pub trait Task: Send + 'static {
    type Output: Send + Sync + 'static;

    fn execute(self, ctx: &TaskContext) -> core::result::Result<Self::Output, TaskError>;
}

/// Adapter running a closure as a [`Task`]
pub struct FnTask<F>(pub F);

impl<F, T> Task for FnTask<F>
where
    F: FnOnce(&TaskContext) -> core::result::Result<T, TaskError> + Send + 'static,
    T: Send + Sync + 'static,
{
    type Output = T;

    fn execute(self, ctx: &TaskContext) -> core::result::Result<T, TaskError> {
        (self.0)(ctx)
    }
}
