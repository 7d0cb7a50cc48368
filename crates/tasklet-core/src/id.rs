//! Task identifier type

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

/// Process-wide id source; ids start at 1
static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a submitted or spawned task
///
/// Ids are allocated from a single process-wide counter, so they are
/// unique across executors and schedulers and increase with submission
/// order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct TaskId(u64);

impl TaskId {
    /// Allocate the next id
    #[inline]
    pub fn next() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a raw value
    #[inline]
    pub const fn new(id: u64) -> Self {
        TaskId(id)
    }

    /// Raw value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    #[inline]
    fn from(id: u64) -> Self {
        TaskId(id)
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}
