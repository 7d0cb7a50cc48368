//! Blocking FIFO queue between submitters and pool workers
//!
//! Bounded or unbounded. Closing the queue stops producers immediately;
//! consumers keep draining what is left and then see end-of-stream as
//! `None`.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::sync::{deadline_after, lock_state, wait_deadline, wait_on};

/// Error returned by [`TaskQueue::try_put`], handing the item back
#[derive(Debug, PartialEq, Eq)]
pub enum TryPutError<T> {
    /// Bounded queue at capacity
    Full(T),
    /// Queue closed
    Closed(T),
}

impl<T> TryPutError<T> {
    pub fn into_inner(self) -> T {
        match self {
            TryPutError::Full(item) | TryPutError::Closed(item) => item,
        }
    }
}

/// Result of [`TaskQueue::try_take`]
#[derive(Debug, PartialEq, Eq)]
pub enum TryTake<T> {
    Item(T),
    /// Open but currently empty
    Empty,
    /// Closed and drained; no item will ever arrive
    Exhausted,
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Multi-producer multi-consumer FIFO with optional capacity
pub struct TaskQueue<T> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: Option<usize>,
}

impl<T> TaskQueue<T> {
    /// `Some(n)` bounds the queue at `n` items (at least one)
    pub fn new(capacity: Option<usize>) -> Self {
        let capacity = capacity.map(|n| n.max(1));
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.unwrap_or(16).min(1024)),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    pub fn bounded(capacity: usize) -> Self {
        Self::new(Some(capacity))
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Append `item`, blocking while a bounded queue is full
    ///
    /// Fails with [`Error::QueueClosed`] if the queue is closed, including
    /// when it closes while this call waits for room.
    pub fn put(&self, item: T) -> Result<()> {
        let mut state = lock_state(&self.state);
        loop {
            if state.closed {
                return Err(Error::QueueClosed);
            }
            if !self.is_full(&state) {
                break;
            }
            state = wait_on(&self.not_full, state);
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Append without blocking
    pub fn try_put(&self, item: T) -> core::result::Result<(), TryPutError<T>> {
        let mut state = lock_state(&self.state);
        if state.closed {
            return Err(TryPutError::Closed(item));
        }
        if self.is_full(&state) {
            return Err(TryPutError::Full(item));
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the oldest item, blocking while the queue is open and empty
    ///
    /// `None` means end-of-stream: closed and fully drained.
    pub fn take(&self) -> Option<T> {
        let mut state = lock_state(&self.state);
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Some(item);
            }
            if state.closed {
                return None;
            }
            state = wait_on(&self.not_empty, state);
        }
    }

    /// Like [`take`](Self::take), giving up with `Err(Timeout)` after `timeout`
    pub fn take_timeout(&self, timeout: Duration) -> Result<Option<T>> {
        let deadline = deadline_after(Some(timeout));
        let mut state = lock_state(&self.state);
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Ok(Some(item));
            }
            if state.closed {
                return Ok(None);
            }
            let (guard, timed_out) = wait_deadline(&self.not_empty, state, deadline);
            state = guard;
            if timed_out && state.items.is_empty() && !state.closed {
                return Err(Error::Timeout);
            }
        }
    }

    /// Remove the oldest item without blocking
    pub fn try_take(&self) -> TryTake<T> {
        let mut state = lock_state(&self.state);
        match state.items.pop_front() {
            Some(item) => {
                drop(state);
                self.not_full.notify_one();
                TryTake::Item(item)
            }
            None if state.closed => TryTake::Exhausted,
            None => TryTake::Empty,
        }
    }

    /// Remove the first queued item matching `predicate`
    pub fn remove_where<P>(&self, mut predicate: P) -> Option<T>
    where
        P: FnMut(&T) -> bool,
    {
        let mut state = lock_state(&self.state);
        let position = state.items.iter().position(|item| predicate(item))?;
        let item = state.items.remove(position);
        drop(state);
        self.not_full.notify_one();
        item
    }

    /// Remove and return every queued item
    pub fn drain(&self) -> Vec<T> {
        let mut state = lock_state(&self.state);
        let items: Vec<T> = state.items.drain(..).collect();
        drop(state);
        self.not_full.notify_all();
        items
    }

    /// Stop accepting items and wake every blocked producer and consumer
    ///
    /// Idempotent.
    pub fn close(&self) {
        lock_state(&self.state).closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        lock_state(&self.state).closed
    }

    pub fn len(&self) -> usize {
        lock_state(&self.state).items.len()
    }

    pub fn is_empty(&self) -> bool {
        lock_state(&self.state).items.is_empty()
    }

    /// `None` for an unbounded queue
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    #[inline]
    fn is_full(&self, state: &QueueState<T>) -> bool {
        self.capacity.is_some_and(|cap| state.items.len() >= cap)
    }
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}
