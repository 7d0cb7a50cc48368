//! Non-reentrant mutual exclusion lock
//!
//! The holder parks on a condition variable instead of spinning. Locking
//! again from the thread that already holds the lock never returns; use
//! [`ReentrantLock`](super::ReentrantLock) when a thread must re-enter.

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use super::{deadline_after, lock_state, wait_deadline, wait_on};

/// A blocking lock protecting a value of type `T`
///
/// ```ignore
/// let counter = Lock::new(0u64);
/// *counter.lock() += 1;
/// ```
pub struct Lock<T> {
    held: Mutex<bool>,
    released: Condvar,
    data: UnsafeCell<T>,
}

// Safety: `data` is only reachable through a guard, and `held` admits one guard at a time
unsafe impl<T: Send> Send for Lock<T> {}
unsafe impl<T: Send> Sync for Lock<T> {}

impl<T> Lock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            held: Mutex::new(false),
            released: Condvar::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Block until the lock is free, then take it
    pub fn lock(&self) -> LockGuard<'_, T> {
        let mut held = lock_state(&self.held);
        while *held {
            held = wait_on(&self.released, held);
        }
        *held = true;
        LockGuard::new(self)
    }

    /// Take the lock if it is free
    pub fn try_lock(&self) -> Option<LockGuard<'_, T>> {
        let mut held = lock_state(&self.held);
        if *held {
            return None;
        }
        *held = true;
        Some(LockGuard::new(self))
    }

    /// Take the lock, giving up after `timeout`
    pub fn lock_timeout(&self, timeout: Duration) -> Option<LockGuard<'_, T>> {
        let deadline = deadline_after(Some(timeout));
        let mut held = lock_state(&self.held);
        while *held {
            let (guard, timed_out) = wait_deadline(&self.released, held, deadline);
            held = guard;
            if timed_out && *held {
                return None;
            }
        }
        *held = true;
        Some(LockGuard::new(self))
    }

    /// Check if some thread holds the lock
    pub fn is_locked(&self) -> bool {
        *lock_state(&self.held)
    }

    /// Mutable access through an exclusive borrow
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Consume the lock and return the inner value
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    fn unlock(&self) {
        *lock_state(&self.held) = false;
        self.released.notify_one();
    }
}

impl<T: Default> Default for Lock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Lock<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.try_lock() {
            Some(guard) => f.debug_struct("Lock").field("data", &*guard).finish(),
            None => f.debug_struct("Lock").field("data", &"<locked>").finish(),
        }
    }
}

/// RAII guard; the lock is released when it drops
///
/// Shares like `&mut T`: the guard is `Sync` only when `T` is.
pub struct LockGuard<'a, T> {
    lock: &'a Lock<T>,
    _data: PhantomData<&'a mut T>,
}

impl<'a, T> LockGuard<'a, T> {
    fn new(lock: &'a Lock<T>) -> Self {
        Self {
            lock,
            _data: PhantomData,
        }
    }
}

impl<'a, T> Deref for LockGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: we hold the lock
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for LockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: we hold the lock
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for LockGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}
