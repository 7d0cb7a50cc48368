//! Values shared between the pool and its forked children
//!
//! A [`SharedValue`] lives in an anonymous `MAP_SHARED` mapping, so a child
//! forked after its creation sees the same memory as the parent. Access goes
//! through a [`SpinLock`] stored in the mapping; its atomic flag works across
//! processes as well as threads.
//!
//! Create shared values *before* building a process-mode executor; children
//! forked earlier do not have the mapping.

use core::fmt;
use core::ptr::{self, NonNull};
use std::io;

use tasklet_core::{Error, Result, SpinLock, SpinLockGuard};

/// A `T` in memory shared across `fork`
///
/// `T: Copy` keeps the payload free of heap pointers, which would not be
/// meaningful in another address space. A process killed while holding the
/// lock leaves it held.
pub struct SharedValue<T: Copy + Send> {
    slot: NonNull<SpinLock<T>>,
}

// Safety: the payload is only reached through the embedded spinlock
unsafe impl<T: Copy + Send> Send for SharedValue<T> {}
unsafe impl<T: Copy + Send> Sync for SharedValue<T> {}

impl<T: Copy + Send> SharedValue<T> {
    /// Map a fresh shared region holding `value`
    pub fn new(value: T) -> Result<Self> {
        // Safety: anonymous mapping, no file descriptor involved
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                Self::region_len(),
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(Error::Worker(format!(
                "mmap shared region: {}",
                io::Error::last_os_error()
            )));
        }
        let slot = NonNull::new(addr.cast::<SpinLock<T>>())
            .ok_or_else(|| Error::Worker("mmap returned null".to_string()))?;
        // Safety: the mapping is page aligned, writable and large enough
        unsafe { slot.as_ptr().write(SpinLock::new(value)) };
        Ok(Self { slot })
    }

    /// Lock the value for a read-modify-write
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        self.cell().lock()
    }

    pub fn get(&self) -> T {
        *self.lock()
    }

    pub fn set(&self, value: T) {
        *self.lock() = value;
    }

    /// Apply `f` under the lock and return the new value
    pub fn update<F>(&self, f: F) -> T
    where
        F: FnOnce(T) -> T,
    {
        self.cell().with(|value| {
            *value = f(*value);
            *value
        })
    }

    fn cell(&self) -> &SpinLock<T> {
        // Safety: initialized in `new`, unmapped only in `drop`
        unsafe { self.slot.as_ref() }
    }

    fn region_len() -> usize {
        core::mem::size_of::<SpinLock<T>>().max(1)
    }
}

impl<T: Copy + Send> Drop for SharedValue<T> {
    fn drop(&mut self) {
        // Safety: `slot` is the start of a mapping of `region_len()` bytes
        unsafe {
            libc::munmap(self.slot.as_ptr().cast(), Self::region_len());
        }
    }
}

impl<T: Copy + Send + fmt::Debug> fmt::Debug for SharedValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedValue").field(&self.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::wait::{waitpid, WaitStatus};
    use nix::unistd::{fork, ForkResult};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_get_set_update() {
        let value = SharedValue::new(1u64).unwrap();
        value.set(5);
        assert_eq!(value.update(|v| v * 3), 15);
        assert_eq!(value.get(), 15);
    }

    #[test]
    fn test_threads_share_value() {
        let value = Arc::new(SharedValue::new(0u32).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let value = Arc::clone(&value);
                thread::spawn(move || {
                    for _ in 0..500 {
                        value.update(|v| v + 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(value.get(), 2000);
    }

    #[test]
    fn test_child_write_visible_to_parent() {
        let value = SharedValue::new((0u32, false)).unwrap();
        // Safety: the child only touches the mapping and exits immediately
        match unsafe { fork() }.unwrap() {
            ForkResult::Child => {
                value.set((42, true));
                unsafe { libc::_exit(0) }
            }
            ForkResult::Parent { child } => {
                assert_eq!(waitpid(child, None).unwrap(), WaitStatus::Exited(child, 0));
                assert_eq!(value.get(), (42, true));
            }
        }
    }
}
