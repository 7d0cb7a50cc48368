//! Condition variable bundled with the lock it waits on

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use super::{deadline_after, lock_state, wait_on, wait_until};

/// A lock around `T` plus a condition variable tied to it
///
/// ```ignore
/// let ready = Condition::new(Vec::new());
/// // consumer
/// let (mut items, ok) = ready.wait_for(ready.lock(), |v| !v.is_empty(), Some(timeout));
/// // producer
/// ready.lock().push(job);
/// ready.notify_one();
/// ```
pub struct Condition<T> {
    value: Mutex<T>,
    cond: Condvar,
}

impl<T> Condition<T> {
    pub const fn new(value: T) -> Self {
        Self {
            value: Mutex::new(value),
            cond: Condvar::new(),
        }
    }

    /// Take the associated lock
    pub fn lock(&self) -> MutexGuard<'_, T> {
        lock_state(&self.value)
    }

    /// Release `guard`, wait for a notification, re-acquire
    ///
    /// Returns the re-acquired guard and `false` if `timeout` elapsed
    /// without a notification. Spurious wakeups report `true`; callers that
    /// need a condition should use [`wait_for`](Self::wait_for).
    pub fn wait<'a>(
        &self,
        guard: MutexGuard<'a, T>,
        timeout: Option<Duration>,
    ) -> (MutexGuard<'a, T>, bool) {
        match deadline_after(timeout) {
            None => (wait_on(&self.cond, guard), true),
            Some(deadline) => {
                let (guard, timed_out) = wait_until(&self.cond, guard, deadline);
                (guard, !timed_out)
            }
        }
    }

    /// Wait until `predicate` holds or `timeout` elapses
    ///
    /// The predicate is evaluated under the lock before every wait. The
    /// returned flag is its last result.
    pub fn wait_for<'a, P>(
        &self,
        mut guard: MutexGuard<'a, T>,
        mut predicate: P,
        timeout: Option<Duration>,
    ) -> (MutexGuard<'a, T>, bool)
    where
        P: FnMut(&mut T) -> bool,
    {
        let deadline = deadline_after(timeout);
        loop {
            if predicate(&mut *guard) {
                return (guard, true);
            }
            match deadline {
                None => guard = wait_on(&self.cond, guard),
                Some(deadline) => {
                    let (next, timed_out) = wait_until(&self.cond, guard, deadline);
                    guard = next;
                    if timed_out {
                        let satisfied = predicate(&mut *guard);
                        return (guard, satisfied);
                    }
                }
            }
        }
    }

    /// Wake one waiter
    pub fn notify_one(&self) {
        self.cond.notify_one();
    }

    /// Wake every waiter
    pub fn notify_all(&self) {
        self.cond.notify_all();
    }
}

impl<T: Default> Default for Condition<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
