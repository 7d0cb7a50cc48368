//! Error types for the tasklet runtime

use core::fmt;
use std::any::Any;

use crate::id::TaskId;

/// Result type for runtime operations
pub type Result<T> = core::result::Result<T, Error>;

/// Errors surfaced by futures, queues, pools, schedulers and primitives
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// `put` on a closed queue
    #[error("task queue is closed")]
    QueueClosed,

    /// Submission after the executor began shutting down
    #[error("executor has been shut down")]
    ExecutorShutdown,

    /// Operation not valid in the current state
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// Attempt to complete an already-terminal future
    #[error("future already resolved")]
    AlreadyResolved,

    /// Bounded semaphore released past its initial capacity
    #[error("semaphore released too many times (capacity {capacity})")]
    OverRelease { capacity: usize },

    /// Reentrant lock released by a thread that does not hold it
    #[error("cannot release a lock that is not held by the current thread")]
    NotOwner,

    /// Operation timed out
    #[error("operation timed out")]
    Timeout,

    /// Task or future was cancelled
    #[error("task was cancelled")]
    Cancelled,

    /// Error raised by user task code
    #[error(transparent)]
    Task(#[from] TaskError),

    /// One or more children of a task group failed
    #[error(transparent)]
    Group(#[from] GroupError),

    /// Payload could not be encoded or decoded across the process boundary
    #[error("codec error: {0}")]
    Codec(String),

    /// Worker thread or process failure
    #[error("worker error: {0}")]
    Worker(String),

    /// Rejected configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// True if this error reports a cancellation
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// True if this error reports a timeout
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }
}

/// An error raised (or a panic) inside task code
///
/// Task errors are stored in the task's future and re-raised to whoever
/// retrieves the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskError {
    message: String,
    panicked: bool,
}

impl TaskError {
    /// Create a task error from a message
    pub fn new(message: impl Into<String>) -> Self {
        TaskError {
            message: message.into(),
            panicked: false,
        }
    }

    /// Build a task error from a panic payload caught at the task boundary
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        TaskError {
            message,
            panicked: true,
        }
    }

    /// Rebuild a task error that crossed a process boundary
    pub fn remote(message: String, panicked: bool) -> Self {
        TaskError { message, panicked }
    }

    /// The error message
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// True if the task panicked rather than returning an error
    #[inline]
    pub fn is_panic(&self) -> bool {
        self.panicked
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.panicked {
            write!(f, "task panicked: {}", self.message)
        } else {
            write!(f, "task failed: {}", self.message)
        }
    }
}

impl std::error::Error for TaskError {}

impl From<&str> for TaskError {
    fn from(message: &str) -> Self {
        TaskError::new(message)
    }
}

impl From<String> for TaskError {
    fn from(message: String) -> Self {
        TaskError::new(message)
    }
}

/// A failed child of a task group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildFailure {
    /// Spawn position within the group
    pub index: usize,
    /// Scheduler id of the child task
    pub task: TaskId,
    /// The error the child finished with
    pub error: Box<Error>,
}

/// Aggregate error of a task group, one entry per failed child
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupError {
    failures: Vec<ChildFailure>,
}

impl GroupError {
    /// Create a group error; failures are ordered by spawn index
    pub fn new(mut failures: Vec<ChildFailure>) -> Self {
        failures.sort_by_key(|f| f.index);
        GroupError { failures }
    }

    /// Failed children, ordered by spawn index
    pub fn failures(&self) -> &[ChildFailure] {
        &self.failures
    }

    /// Number of failed children
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// True if no child failed
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for GroupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} task(s) in group failed", self.failures.len())?;
        for failure in &self.failures {
            write!(
                f,
                "; child #{} ({}): {}",
                failure.index, failure.task, failure.error
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for GroupError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_error_from_panic_payloads() {
        let e = TaskError::from_panic(&"boom");
        assert!(e.is_panic());
        assert_eq!(e.message(), "boom");

        let e = TaskError::from_panic(&String::from("owned boom"));
        assert_eq!(e.message(), "owned boom");

        let e = TaskError::from_panic(&42u32);
        assert_eq!(e.message(), "unknown panic payload");
    }

    #[test]
    fn test_task_error_display() {
        assert_eq!(TaskError::new("bad input").to_string(), "task failed: bad input");
        assert_eq!(
            Error::from(TaskError::new("bad input")).to_string(),
            "task failed: bad input"
        );
    }

    #[test]
    fn test_group_error_orders_by_index() {
        let err = GroupError::new(vec![
            ChildFailure {
                index: 2,
                task: TaskId::new(9),
                error: Box::new(Error::Timeout),
            },
            ChildFailure {
                index: 0,
                task: TaskId::new(7),
                error: Box::new(Error::Task("nope".into())),
            },
        ]);
        assert_eq!(err.len(), 2);
        assert_eq!(err.failures()[0].index, 0);
        let text = err.to_string();
        assert!(text.starts_with("2 task(s) in group failed"));
        assert!(text.contains("child #2 (task-9): operation timed out"));
    }

    #[test]
    fn test_error_predicates() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(Error::Timeout.is_timeout());
        assert!(!Error::QueueClosed.is_timeout());
    }
}
