//! Blocking synchronization primitives for pool workers and client threads
//!
//! - `lock` - non-reentrant mutual exclusion lock carrying data
//! - `reentrant` - lock the holder may re-acquire
//! - `semaphore` - counting and bounded semaphores
//! - `barrier` - reusable N-party rendezvous
//! - `condition` - lock + condition variable pair
//! - `event` - one-bit latch
//! - `rwlock` - readers-writer lock, writer-preferring
//! - `once` - one-time initialization
//! - `wait_group` - wait for a counted set of workers, collecting errors
//!
//! Every blocking call has a timed variant. Timeouts are reported as a
//! `false`/`None`/`Err(Timeout)` return, never by panicking.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Fails to compile when `$ty` implements `$trait`: both blanket impls
/// apply and the `_` cannot be inferred.
#[cfg(test)]
macro_rules! assert_not_impl {
    ($ty:ty: $trait:path) => {{
        trait AmbiguousIfImpl<A> {
            fn check() {}
        }
        impl<T: ?Sized> AmbiguousIfImpl<()> for T {}
        struct Invalid;
        impl<T: ?Sized + $trait> AmbiguousIfImpl<Invalid> for T {}
        let _ = <$ty as AmbiguousIfImpl<_>>::check;
    }};
}
#[cfg(test)]
pub(crate) use assert_not_impl;

pub mod barrier;
pub mod condition;
pub mod event;
pub mod lock;
pub mod once;
pub mod reentrant;
pub mod rwlock;
pub mod semaphore;
pub mod wait_group;

pub use barrier::{Barrier, BarrierWaitResult};
pub use condition::Condition;
pub use event::Event;
pub use lock::{Lock, LockGuard};
pub use once::Once;
pub use reentrant::{ReentrantGuard, ReentrantLock};
pub use rwlock::{ReadGuard, RwLock, WriteGuard};
pub use semaphore::{BoundedSemaphore, Semaphore, SemaphorePermit};
pub use wait_group::WaitGroup;

// Internal state guarded by these mutexes is updated in single steps, so a
// panic elsewhere never leaves it inconsistent; poisoning is ignored.

#[inline]
pub(crate) fn lock_state<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[inline]
pub(crate) fn wait_on<'a, T>(cond: &Condvar, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
    cond.wait(guard).unwrap_or_else(PoisonError::into_inner)
}

/// Wait until notified or `deadline`; the flag is true on timeout
#[inline]
pub(crate) fn wait_until<'a, T>(
    cond: &Condvar,
    guard: MutexGuard<'a, T>,
    deadline: Instant,
) -> (MutexGuard<'a, T>, bool) {
    let now = Instant::now();
    if now >= deadline {
        return (guard, true);
    }
    let (guard, result) = cond
        .wait_timeout(guard, deadline - now)
        .unwrap_or_else(PoisonError::into_inner);
    (guard, result.timed_out())
}

/// Deadline for an optional timeout
///
/// `None` waits forever, and so does a timeout too large to represent as
/// an `Instant` (e.g. `Duration::MAX`).
#[inline]
pub(crate) fn deadline_after(timeout: Option<Duration>) -> Option<Instant> {
    timeout.and_then(|t| Instant::now().checked_add(t))
}

/// [`wait_until`] with an optional deadline; never times out on `None`
#[inline]
pub(crate) fn wait_deadline<'a, T>(
    cond: &Condvar,
    guard: MutexGuard<'a, T>,
    deadline: Option<Instant>,
) -> (MutexGuard<'a, T>, bool) {
    match deadline {
        Some(deadline) => wait_until(cond, guard, deadline),
        None => (wait_on(cond, guard), false),
    }
}
