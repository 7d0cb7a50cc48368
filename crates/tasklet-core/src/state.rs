//! Lifecycle states for futures, pool workers and cooperative tasks

use core::fmt;

use crate::id::TaskId;

/// State of a [`TaskFuture`](crate::future::TaskFuture)
///
/// `Running` is the started sub-state of pending: the future has no result
/// yet but can no longer be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FutureState {
    /// Submitted, not yet picked up by a worker
    Pending = 0,

    /// A worker started executing the task
    Running = 1,

    /// Finished with a value
    Fulfilled = 2,

    /// Finished with an error
    Failed = 3,

    /// Cancelled before it started
    Cancelled = 4,
}

impl FutureState {
    /// Check if the future holds an outcome
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            FutureState::Fulfilled | FutureState::Failed | FutureState::Cancelled
        )
    }
}

impl fmt::Display for FutureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FutureState::Pending => "pending",
            FutureState::Running => "running",
            FutureState::Fulfilled => "fulfilled",
            FutureState::Failed => "failed",
            FutureState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// State of a cooperative scheduler task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    /// Spawned, never polled
    Created = 0,

    /// Queued for (or currently in) a poll
    Runnable = 1,

    /// Waiting at a suspension point
    Suspended = 2,

    /// Ran to completion (successfully or with an error)
    Completed = 3,

    /// Dropped before completion
    Cancelled = 4,
}

impl TaskState {
    /// Check if this task has terminated (completed or cancelled)
    #[inline]
    pub const fn is_terminated(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Cancelled)
    }
}

impl From<u8> for TaskState {
    fn from(v: u8) -> Self {
        match v {
            0 => TaskState::Created,
            1 => TaskState::Runnable,
            2 => TaskState::Suspended,
            3 => TaskState::Completed,
            4 => TaskState::Cancelled,
            _ => TaskState::Created,
        }
    }
}

impl From<TaskState> for u8 {
    fn from(state: TaskState) -> u8 {
        state as u8
    }
}

/// State of a pool worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    /// Waiting for a task
    #[default]
    Idle,

    /// Executing the given task
    Running(TaskId),

    /// Worker loop exited
    Stopped,
}

impl WorkerState {
    /// Check if the worker is executing a task
    #[inline]
    pub const fn is_busy(&self) -> bool {
        matches!(self, WorkerState::Running(_))
    }
}
