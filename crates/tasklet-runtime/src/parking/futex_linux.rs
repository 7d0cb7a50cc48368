//! Futex parking for the cooperative loop on Linux
//!
//! The futex word is a one-shot wake token: 1 means an unpark is pending.
//! `park` consumes a pending token without sleeping, otherwise waits while
//! the word is 0. Only the `unpark` that moves the word 0 -> 1 issues a
//! FUTEX_WAKE.

use super::LoopParking;
use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

const IDLE: u32 = 0;
const NOTIFIED: u32 = 1;

#[derive(Default)]
pub struct FutexParking {
    word: AtomicU32,
}

impl FutexParking {
    pub fn new() -> Self {
        Self::default()
    }

    fn take_token(&self) -> bool {
        self.word.swap(IDLE, Ordering::Acquire) == NOTIFIED
    }

    /// Raw futex call on `word`; the result is ignored because every
    /// return (wake, timeout, EINTR, EAGAIN) is followed by a token check
    fn futex(&self, op: libc::c_int, val: u32, timeout: Option<&libc::timespec>) {
        let timeout = timeout.map_or(ptr::null(), |ts| ts as *const libc::timespec);
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.word.as_ptr(),
                op | libc::FUTEX_PRIVATE_FLAG,
                val,
                timeout,
                ptr::null::<u32>(),
                0u32,
            );
        }
    }
}

impl LoopParking for FutexParking {
    fn park(&self, timeout: Option<Duration>) -> bool {
        if self.take_token() {
            return true;
        }
        let timespec = timeout.map(|d| libc::timespec {
            tv_sec: libc::time_t::try_from(d.as_secs()).unwrap_or(libc::time_t::MAX),
            tv_nsec: d.subsec_nanos() as libc::c_long,
        });
        self.futex(libc::FUTEX_WAIT, IDLE, timespec.as_ref());
        self.take_token()
    }

    fn unpark(&self) {
        if self.word.swap(NOTIFIED, Ordering::Release) == IDLE {
            self.futex(libc::FUTEX_WAKE, 1, None);
        }
    }
}
