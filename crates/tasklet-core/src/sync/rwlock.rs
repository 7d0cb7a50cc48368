//! Readers-writer lock
//!
//! Any number of readers, or one writer. A waiting writer holds back new
//! readers, so a steady stream of reads cannot starve it; readers already
//! inside finish first.

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use super::{deadline_after, lock_state, wait_deadline, wait_on};

#[derive(Debug)]
struct Holders {
    readers: usize,
    writer: bool,
    writers_waiting: usize,
}

impl Holders {
    fn can_read(&self) -> bool {
        !self.writer && self.writers_waiting == 0
    }

    fn can_write(&self) -> bool {
        !self.writer && self.readers == 0
    }
}

/// A blocking readers-writer lock protecting a value of type `T`
///
/// ```ignore
/// let config = RwLock::new(Settings::default());
/// let limit = config.read().limit;
/// config.write().limit = 10;
/// ```
pub struct RwLock<T> {
    holders: Mutex<Holders>,
    readable: Condvar,
    writable: Condvar,
    data: UnsafeCell<T>,
}

// Safety: readers get `&T` concurrently, a writer gets `&mut T` alone
unsafe impl<T: Send> Send for RwLock<T> {}
unsafe impl<T: Send + Sync> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            holders: Mutex::new(Holders {
                readers: 0,
                writer: false,
                writers_waiting: 0,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Block until no writer holds or waits for the lock, then share it
    pub fn read(&self) -> ReadGuard<'_, T> {
        let mut holders = lock_state(&self.holders);
        while !holders.can_read() {
            holders = wait_on(&self.readable, holders);
        }
        holders.readers += 1;
        ReadGuard { lock: self }
    }

    pub fn try_read(&self) -> Option<ReadGuard<'_, T>> {
        let mut holders = lock_state(&self.holders);
        if !holders.can_read() {
            return None;
        }
        holders.readers += 1;
        Some(ReadGuard { lock: self })
    }

    /// Share the lock, giving up after `timeout`
    pub fn read_timeout(&self, timeout: Duration) -> Option<ReadGuard<'_, T>> {
        let deadline = deadline_after(Some(timeout));
        let mut holders = lock_state(&self.holders);
        while !holders.can_read() {
            let (guard, timed_out) = wait_deadline(&self.readable, holders, deadline);
            holders = guard;
            if timed_out && !holders.can_read() {
                return None;
            }
        }
        holders.readers += 1;
        Some(ReadGuard { lock: self })
    }

    /// Block until the lock is free, then take it exclusively
    pub fn write(&self) -> WriteGuard<'_, T> {
        let mut holders = lock_state(&self.holders);
        holders.writers_waiting += 1;
        while !holders.can_write() {
            holders = wait_on(&self.writable, holders);
        }
        holders.writers_waiting -= 1;
        holders.writer = true;
        WriteGuard::new(self)
    }

    pub fn try_write(&self) -> Option<WriteGuard<'_, T>> {
        let mut holders = lock_state(&self.holders);
        if !holders.can_write() {
            return None;
        }
        holders.writer = true;
        Some(WriteGuard::new(self))
    }

    /// Take the lock exclusively, giving up after `timeout`
    pub fn write_timeout(&self, timeout: Duration) -> Option<WriteGuard<'_, T>> {
        let deadline = deadline_after(Some(timeout));
        let mut holders = lock_state(&self.holders);
        holders.writers_waiting += 1;
        while !holders.can_write() {
            let (guard, timed_out) = wait_deadline(&self.writable, holders, deadline);
            holders = guard;
            if timed_out && !holders.can_write() {
                holders.writers_waiting -= 1;
                if holders.writers_waiting == 0 {
                    // Readers held back by this writer may go
                    self.readable.notify_all();
                }
                return None;
            }
        }
        holders.writers_waiting -= 1;
        holders.writer = true;
        Some(WriteGuard::new(self))
    }

    /// Readers currently inside
    pub fn reader_count(&self) -> usize {
        lock_state(&self.holders).readers
    }

    pub fn is_write_locked(&self) -> bool {
        lock_state(&self.holders).writer
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    fn release_read(&self) {
        let mut holders = lock_state(&self.holders);
        holders.readers -= 1;
        if holders.readers == 0 && holders.writers_waiting > 0 {
            self.writable.notify_one();
        }
    }

    fn release_write(&self) {
        let mut holders = lock_state(&self.holders);
        holders.writer = false;
        if holders.writers_waiting > 0 {
            self.writable.notify_one();
        } else {
            self.readable.notify_all();
        }
    }
}

impl<T: Default> Default for RwLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for RwLock<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.try_read() {
            Some(guard) => f.debug_struct("RwLock").field("data", &*guard).finish(),
            None => f.debug_struct("RwLock").field("data", &"<locked>").finish(),
        }
    }
}

/// Shared access; released on drop
pub struct ReadGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: no writer while a reader is inside
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_read();
    }
}

/// Exclusive access; released on drop
pub struct WriteGuard<'a, T> {
    lock: &'a RwLock<T>,
    _data: PhantomData<&'a mut T>,
}

impl<'a, T> WriteGuard<'a, T> {
    fn new(lock: &'a RwLock<T>) -> Self {
        Self {
            lock,
            _data: PhantomData,
        }
    }
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: we are the only holder
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: we are the only holder
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_write();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_readers_share() {
        let lock = RwLock::new(3u32);
        let a = lock.read();
        let b = lock.read();
        assert_eq!(*a + *b, 6);
        assert_eq!(lock.reader_count(), 2);
        assert!(lock.try_write().is_none());
        drop((a, b));
        assert_eq!(lock.reader_count(), 0);
        *lock.write() += 1;
        assert_eq!(*lock.read(), 4);
    }

    #[test]
    fn test_writer_excludes_everyone() {
        let lock = RwLock::new(Vec::<u8>::new());
        let mut w = lock.write();
        w.push(1);
        assert!(lock.is_write_locked());
        assert!(lock.try_read().is_none());
        assert!(lock.read_timeout(Duration::from_millis(10)).is_none());
        assert!(lock.write_timeout(Duration::from_millis(10)).is_none());
        drop(w);
        assert_eq!(lock.read().len(), 1);
    }

    #[test]
    fn test_concurrent_readers_overlap() {
        let lock = Arc::new(RwLock::new(0u8));
        let inside = Arc::new(Barrier::new(3));
        let readers: Vec<_> = (0..3)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let inside = Arc::clone(&inside);
                thread::spawn(move || {
                    let _guard = lock.read();
                    // All three must be inside together to get past this
                    inside.wait();
                })
            })
            .collect();
        for r in readers {
            r.join().unwrap();
        }
    }

    #[test]
    fn test_waiting_writer_holds_back_new_readers() {
        let lock = Arc::new(RwLock::new(0u32));
        let first = lock.read();

        let writer = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || *lock.write() = 7)
        };
        while lock_state(&lock.holders).writers_waiting == 0 {
            thread::yield_now();
        }
        assert!(lock.try_read().is_none());
        assert!(lock.read_timeout(Duration::from_millis(10)).is_none());

        drop(first);
        writer.join().unwrap();
        assert_eq!(*lock.read(), 7);
    }

    #[test]
    fn test_timed_out_writer_lets_readers_in() {
        let lock = Arc::new(RwLock::new(()));
        let held = lock.read();
        let writer = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || lock.write_timeout(Duration::from_millis(200)).is_some())
        };
        while lock_state(&lock.holders).writers_waiting == 0 {
            thread::yield_now();
        }
        // Blocked behind the writer until it gives up
        assert!(lock.read_timeout(Duration::from_secs(5)).is_some());
        assert!(!writer.join().unwrap());
        drop(held);
        assert!(lock.try_write().is_some());
    }

    #[test]
    fn test_writes_are_serialized() {
        let lock = Arc::new(RwLock::new(0u64));
        let reads = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..6)
            .map(|i| {
                let lock = Arc::clone(&lock);
                let reads = Arc::clone(&reads);
                thread::spawn(move || {
                    for _ in 0..500 {
                        if i % 2 == 0 {
                            let mut w = lock.write();
                            let v = *w;
                            thread::yield_now();
                            *w = v + 1;
                        } else {
                            let _ = *lock.read();
                            reads.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock.read(), 1500);
        assert_eq!(reads.load(Ordering::Relaxed), 1500);
    }

    #[test]
    fn test_huge_timeouts_do_not_overflow() {
        let lock = RwLock::new(1u8);
        assert_eq!(lock.read_timeout(Duration::MAX).map(|g| *g), Some(1));
        assert_eq!(lock.write_timeout(Duration::MAX).map(|g| *g), Some(1));
    }

    #[test]
    fn test_guards_follow_data_auto_traits() {
        fn assert_sync<T: Sync>() {}
        assert_sync::<RwLock<u32>>();
        assert_sync::<WriteGuard<'static, u32>>();
        crate::sync::assert_not_impl!(RwLock<std::cell::Cell<u8>>: Sync);
        crate::sync::assert_not_impl!(WriteGuard<'static, std::cell::Cell<u8>>: Sync);
        crate::sync::assert_not_impl!(ReadGuard<'static, std::cell::Cell<u8>>: Sync);
    }
}
