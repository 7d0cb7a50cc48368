//! Reentrant lock with holder identity and recursion depth

use core::marker::PhantomData;
use core::ops::Deref;
use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

use super::{deadline_after, lock_state, wait_deadline, wait_on};
use crate::error::{Error, Result};
use crate::kerror;

struct Holder {
    thread: Option<ThreadId>,
    depth: usize,
}

/// A lock the holding thread may acquire repeatedly
///
/// Each `acquire` by the holder increments the depth; the lock becomes free
/// once `release` was called as many times. Only shared access to the value
/// is handed out, since the holder may have several guards alive at once.
pub struct ReentrantLock<T = ()> {
    holder: Mutex<Holder>,
    released: Condvar,
    data: T,
}

impl<T> ReentrantLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            holder: Mutex::new(Holder {
                thread: None,
                depth: 0,
            }),
            released: Condvar::new(),
            data: value,
        }
    }

    /// Acquire, blocking while another thread holds the lock
    pub fn acquire(&self) {
        let me = thread::current().id();
        let mut holder = lock_state(&self.holder);
        while holder.thread.is_some_and(|t| t != me) {
            holder = wait_on(&self.released, holder);
        }
        holder.thread = Some(me);
        holder.depth += 1;
    }

    /// Acquire if free or already held by this thread
    pub fn try_acquire(&self) -> bool {
        let me = thread::current().id();
        let mut holder = lock_state(&self.holder);
        match holder.thread {
            Some(t) if t != me => false,
            _ => {
                holder.thread = Some(me);
                holder.depth += 1;
                true
            }
        }
    }

    /// Acquire, giving up after `timeout`
    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        let me = thread::current().id();
        let deadline = deadline_after(Some(timeout));
        let mut holder = lock_state(&self.holder);
        while holder.thread.is_some_and(|t| t != me) {
            let (guard, timed_out) = wait_deadline(&self.released, holder, deadline);
            holder = guard;
            if timed_out && holder.thread.is_some_and(|t| t != me) {
                return false;
            }
        }
        holder.thread = Some(me);
        holder.depth += 1;
        true
    }

    /// Undo one `acquire`
    ///
    /// Fails with [`Error::NotOwner`] when the calling thread does not hold
    /// the lock; the lock state is left untouched in that case.
    pub fn release(&self) -> Result<()> {
        let me = thread::current().id();
        let mut holder = lock_state(&self.holder);
        if holder.thread != Some(me) {
            return Err(Error::NotOwner);
        }
        holder.depth -= 1;
        if holder.depth == 0 {
            holder.thread = None;
            drop(holder);
            self.released.notify_one();
        }
        Ok(())
    }

    /// Acquire and return a guard that releases on drop
    pub fn lock(&self) -> ReentrantGuard<'_, T> {
        self.acquire();
        ReentrantGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// Current recursion depth (0 when free)
    pub fn depth(&self) -> usize {
        lock_state(&self.holder).depth
    }

    /// True if the calling thread holds the lock
    pub fn is_held_by_current_thread(&self) -> bool {
        lock_state(&self.holder).thread == Some(thread::current().id())
    }
}

impl<T: Default> Default for ReentrantLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// RAII guard for one level of a [`ReentrantLock`]
///
/// Not `Send`: ownership is per thread, so the guard must be dropped on the
/// thread that acquired it.
pub struct ReentrantGuard<'a, T> {
    lock: &'a ReentrantLock<T>,
    _not_send: PhantomData<*const ()>,
}

// Safety: sharing `&ReentrantGuard` only hands out `&T`
unsafe impl<T: Sync> Sync for ReentrantGuard<'_, T> {}

impl<'a, T> Deref for ReentrantGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.lock.data
    }
}

impl<'a, T> Drop for ReentrantGuard<'a, T> {
    fn drop(&mut self) {
        if let Err(err) = self.lock.release() {
            kerror!("reentrant guard dropped without owning the lock: {}", err);
        }
    }
}
