//! Run-loop parking
//!
//! The cooperative scheduler's loop parks here when nothing is runnable.
//! Wakers fire from any thread (timers, blocking-pool completions, other
//! tasks) and call `unpark()`. An unpark that arrives while the loop is
//! busy is remembered, so the next `park()` returns at once.

use std::time::Duration;

/// Single-consumer park/unpark token
pub trait LoopParking: Send + Sync {
    /// Block until unparked or `timeout` elapses
    ///
    /// Returns `true` if an unpark was consumed. Callers re-check for work
    /// either way.
    fn park(&self, timeout: Option<Duration>) -> bool;

    /// Make the current or next `park()` return
    fn unpark(&self);
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod futex_linux;
        pub use futex_linux::FutexParking as PlatformParking;
    } else {
        mod fallback;
        pub use fallback::FallbackParking as PlatformParking;
    }
}

/// Create a new platform-appropriate parking instance
pub fn new_parking() -> Box<dyn LoopParking> {
    Box::new(PlatformParking::new())
}
