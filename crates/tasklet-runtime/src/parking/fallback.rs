//! Fallback parking using std::sync::Condvar
//!
//! Used on platforms without futex support.

use super::LoopParking;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Condvar-based parking (fallback)
pub struct FallbackParking {
    /// true = unpark pending
    pending: Mutex<bool>,
    condvar: Condvar,
}

impl FallbackParking {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }
}

impl Default for FallbackParking {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopParking for FallbackParking {
    fn park(&self, timeout: Option<Duration>) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if !*pending {
            pending = match timeout {
                Some(t) => {
                    self.condvar
                        .wait_timeout(pending, t)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .condvar
                    .wait(pending)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
        std::mem::replace(&mut *pending, false)
    }

    fn unpark(&self) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.condvar.notify_one();
    }
}
