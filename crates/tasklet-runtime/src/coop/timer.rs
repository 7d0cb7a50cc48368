//! BinaryHeap timer queue for the cooperative loop
//!
//! - Insert: O(log n)
//! - Cancel: O(1) amortized (lazy cancellation)
//! - Fire expired: O(k log n) for k expired timers
//! - Next deadline: O(1) after skipping cancelled entries
//!
//! Handles of pending timers are kept in a set. Cancelling removes the
//! handle; the heap entry stays until it reaches the top and is skipped.
//! Cancelling a timer that already fired is a no-op, so the set never holds
//! more handles than the heap holds entries.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::task::Waker;
use std::time::Instant;

/// Unique handle of a registered timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TimerHandle(u64);

impl TimerHandle {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        TimerHandle(COUNTER.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

struct HeapEntry {
    deadline: Instant,
    handle: TimerHandle,
    waker: Waker,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.handle == other.handle
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: earliest deadline on top, ties by registration order
        match other.deadline.cmp(&self.deadline) {
            Ordering::Equal => other.handle.0.cmp(&self.handle.0),
            ord => ord,
        }
    }
}

/// Min-heap of deadlines, each waking one task
#[derive(Default)]
pub(crate) struct TimerHeap {
    heap: BinaryHeap<HeapEntry>,
    pending: HashSet<TimerHandle>,
}

impl TimerHeap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wake `waker` once `deadline` passes
    pub(crate) fn insert(&mut self, deadline: Instant, waker: Waker) -> TimerHandle {
        let handle = TimerHandle::next();
        self.pending.insert(handle);
        self.heap.push(HeapEntry {
            deadline,
            handle,
            waker,
        });
        handle
    }

    /// Returns false if the timer already fired or was cancelled
    pub(crate) fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.pending.remove(&handle)
    }

    /// Remove every timer due at `now` and return their wakers
    pub(crate) fn expire(&mut self, now: Instant) -> Vec<Waker> {
        let mut due = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.deadline > now {
                break;
            }
            if let Some(entry) = self.heap.pop() {
                if self.pending.remove(&entry.handle) {
                    due.push(entry.waker);
                }
            }
        }
        due
    }

    /// Earliest live deadline
    pub(crate) fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(top) = self.heap.peek() {
            if self.pending.contains(&top.handle) {
                return Some(top.deadline);
            }
            self.heap.pop();
        }
        None
    }

    /// Registered timers, including cancelled ones not yet skipped
    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn clear(&mut self) {
        self.heap.clear();
        self.pending.clear();
    }
}
