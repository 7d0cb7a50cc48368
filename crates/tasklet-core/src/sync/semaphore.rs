//! Counting semaphores
//!
//! [`Semaphore`] lets `release` raise the count without limit.
//! [`BoundedSemaphore`] rejects a release that would push the count past
//! its initial value, which catches unbalanced acquire/release pairs.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use super::{deadline_after, lock_state, wait_deadline, wait_on};
use crate::error::{Error, Result};

struct Permits {
    available: Mutex<usize>,
    changed: Condvar,
    bound: Option<usize>,
}

impl Permits {
    fn new(initial: usize, bound: Option<usize>) -> Self {
        Self {
            available: Mutex::new(initial),
            changed: Condvar::new(),
            bound,
        }
    }

    fn acquire(&self) {
        let mut available = lock_state(&self.available);
        while *available == 0 {
            available = wait_on(&self.changed, available);
        }
        *available -= 1;
    }

    fn try_acquire(&self) -> bool {
        let mut available = lock_state(&self.available);
        if *available == 0 {
            return false;
        }
        *available -= 1;
        true
    }

    fn acquire_timeout(&self, timeout: Duration) -> bool {
        let deadline = deadline_after(Some(timeout));
        let mut available = lock_state(&self.available);
        while *available == 0 {
            let (guard, timed_out) = wait_deadline(&self.changed, available, deadline);
            available = guard;
            if timed_out && *available == 0 {
                return false;
            }
        }
        *available -= 1;
        true
    }

    fn release(&self) -> Result<()> {
        let mut available = lock_state(&self.available);
        if let Some(capacity) = self.bound {
            if *available >= capacity {
                return Err(Error::OverRelease { capacity });
            }
        }
        *available += 1;
        drop(available);
        self.changed.notify_one();
        Ok(())
    }

    fn available(&self) -> usize {
        *lock_state(&self.available)
    }
}

/// Counting semaphore
pub struct Semaphore {
    permits: Permits,
}

impl Semaphore {
    /// Create a semaphore holding `permits` permits
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Permits::new(permits, None),
        }
    }

    /// Take a permit, blocking while none is available
    pub fn acquire(&self) {
        self.permits.acquire()
    }

    /// Take a permit if one is available
    pub fn try_acquire(&self) -> bool {
        self.permits.try_acquire()
    }

    /// Take a permit, giving up after `timeout`
    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        self.permits.acquire_timeout(timeout)
    }

    /// Return a permit and wake one waiter
    pub fn release(&self) {
        // Unbounded: cannot fail
        let _ = self.permits.release();
    }

    /// Take a permit that is returned when the guard drops
    pub fn permit(&self) -> SemaphorePermit<'_> {
        self.acquire();
        SemaphorePermit {
            permits: &self.permits,
        }
    }

    /// Permits currently available
    pub fn available(&self) -> usize {
        self.permits.available()
    }
}

/// Semaphore whose count may never exceed its initial value
pub struct BoundedSemaphore {
    permits: Permits,
}

impl BoundedSemaphore {
    /// Create a semaphore with `capacity` permits, all available
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Permits::new(capacity, Some(capacity)),
        }
    }

    pub fn acquire(&self) {
        self.permits.acquire()
    }

    pub fn try_acquire(&self) -> bool {
        self.permits.try_acquire()
    }

    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        self.permits.acquire_timeout(timeout)
    }

    /// Return a permit
    ///
    /// Fails with [`Error::OverRelease`] if all permits are already available.
    pub fn release(&self) -> Result<()> {
        self.permits.release()
    }

    /// Take a permit that is returned when the guard drops
    pub fn permit(&self) -> SemaphorePermit<'_> {
        self.acquire();
        SemaphorePermit {
            permits: &self.permits,
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available()
    }

    /// The initial (and maximum) number of permits
    pub fn capacity(&self) -> usize {
        self.permits.bound.unwrap_or(0)
    }
}

/// RAII permit; released on drop
pub struct SemaphorePermit<'a> {
    permits: &'a Permits,
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        // The permit was taken from this semaphore, so the bound holds
        let _ = self.permits.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_at_most_n_holders() {
        let sem = Arc::new(Semaphore::new(2));
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let sem = Arc::clone(&sem);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    let _permit = sem.permit();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(10));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert!(max_seen.load(Ordering::SeqCst) <= 2);
        assert_eq!(sem.available(), 2);
    }

    #[test]
    fn test_unbounded_release_grows() {
        let sem = Semaphore::new(0);
        assert!(!sem.try_acquire());
        sem.release();
        sem.release();
        assert_eq!(sem.available(), 2);
    }

    #[test]
    fn test_bounded_over_release() {
        let sem = BoundedSemaphore::new(2);
        assert_eq!(sem.release(), Err(Error::OverRelease { capacity: 2 }));

        sem.acquire();
        assert_eq!(sem.release(), Ok(()));
        assert_eq!(sem.available(), 2);
        assert_eq!(sem.capacity(), 2);
    }

    #[test]
    fn test_bounded_two_acquires_three_releases() {
        let sem = BoundedSemaphore::new(2);
        sem.acquire();
        sem.acquire();
        assert_eq!(sem.release(), Ok(()));
        assert_eq!(sem.release(), Ok(()));
        assert_eq!(sem.release(), Err(Error::OverRelease { capacity: 2 }));
        assert_eq!(sem.available(), 2);
    }

    #[test]
    fn test_huge_timeout_does_not_overflow() {
        let sem = Semaphore::new(1);
        assert!(sem.acquire_timeout(Duration::MAX));

        let sem = Arc::new(sem);
        let other = Arc::clone(&sem);
        let waiter = thread::spawn(move || other.acquire_timeout(Duration::MAX));
        thread::sleep(Duration::from_millis(20));
        sem.release();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_acquire_timeout() {
        let sem = Arc::new(BoundedSemaphore::new(1));
        sem.acquire();
        assert!(!sem.acquire_timeout(Duration::from_millis(20)));

        let other = Arc::clone(&sem);
        let waiter = thread::spawn(move || other.acquire_timeout(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        sem.release().unwrap();
        assert!(waiter.join().unwrap());
    }
}
