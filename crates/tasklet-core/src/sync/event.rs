//! One-bit latch threads can wait on

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use super::{deadline_after, lock_state, wait_on, wait_until};

/// A flag that wakes every waiter when set
#[derive(Default)]
pub struct Event {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake all waiters
    pub fn set(&self) {
        *lock_state(&self.flag) = true;
        self.cond.notify_all();
    }

    /// Reset the flag
    pub fn clear(&self) {
        *lock_state(&self.flag) = false;
    }

    pub fn is_set(&self) -> bool {
        *lock_state(&self.flag)
    }

    /// Block until the flag is set; returns the flag (false on timeout)
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = deadline_after(timeout);
        let mut flag = lock_state(&self.flag);
        while !*flag {
            match deadline {
                None => flag = wait_on(&self.cond, flag),
                Some(deadline) => {
                    let (guard, timed_out) = wait_until(&self.cond, flag, deadline);
                    flag = guard;
                    if timed_out {
                        break;
                    }
                }
            }
        }
        *flag
    }
}
