//! One-time initialization shared by many threads

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use super::{deadline_after, lock_state, wait_deadline, wait_on};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Done,
}

/// Runs a closure at most once across all callers
///
/// Callers arriving while the closure runs block until it returns. A
/// closure that panics still counts as the one run: later calls return
/// without running theirs.
///
/// ```ignore
/// static SETUP: Once = Once::new();
/// SETUP.call_once(|| load_tables());
/// ```
pub struct Once {
    phase: Mutex<Phase>,
    finished: Condvar,
}

impl Once {
    pub const fn new() -> Self {
        Self {
            phase: Mutex::new(Phase::Idle),
            finished: Condvar::new(),
        }
    }

    /// Run `init` unless some call already did
    ///
    /// Returns true if this call ran it. Calling back into the same `Once`
    /// from inside `init` never returns.
    pub fn call_once<F: FnOnce()>(&self, init: F) -> bool {
        {
            let mut phase = lock_state(&self.phase);
            loop {
                match *phase {
                    Phase::Done => return false,
                    Phase::Running => phase = wait_on(&self.finished, phase),
                    Phase::Idle => break,
                }
            }
            *phase = Phase::Running;
        }
        let _finish = Finish(self);
        init();
        true
    }

    pub fn is_completed(&self) -> bool {
        *lock_state(&self.phase) == Phase::Done
    }

    /// Block until some call finished running its closure
    ///
    /// Returns false if `timeout` elapsed first.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = deadline_after(timeout);
        let mut phase = lock_state(&self.phase);
        while *phase != Phase::Done {
            let (guard, timed_out) = wait_deadline(&self.finished, phase, deadline);
            phase = guard;
            if timed_out {
                break;
            }
        }
        *phase == Phase::Done
    }
}

impl Default for Once {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Once {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Once")
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// Marks the `Once` done on the way out, unwinding included
struct Finish<'a>(&'a Once);

impl Drop for Finish<'_> {
    fn drop(&mut self) {
        *lock_state(&self.0.phase) = Phase::Done;
        self.0.finished.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_runs_once_across_threads() {
        let once = Arc::new(Once::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let value = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..5)
            .map(|_| {
                let (once, runs, value) = (Arc::clone(&once), Arc::clone(&runs), Arc::clone(&value));
                thread::spawn(move || {
                    once.call_once(|| {
                        thread::sleep(Duration::from_millis(20));
                        runs.fetch_add(1, Ordering::SeqCst);
                        value.store(42, Ordering::SeqCst);
                    });
                    // Every caller sees the initialized value
                    value.load(Ordering::SeqCst)
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 42);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(once.is_completed());
    }

    #[test]
    fn test_reports_which_call_ran() {
        let once = Once::new();
        assert!(!once.is_completed());
        assert!(once.call_once(|| {}));
        assert!(!once.call_once(|| panic!("must not run")));
    }

    #[test]
    fn test_panicking_init_counts_as_done() {
        let once = Once::new();
        let result = catch_unwind(AssertUnwindSafe(|| once.call_once(|| panic!("init boom"))));
        assert!(result.is_err());
        assert!(once.is_completed());
        assert!(!once.call_once(|| panic!("must not run")));
    }

    #[test]
    fn test_wait_for_completion() {
        let once = Arc::new(Once::new());
        assert!(!once.wait(Some(Duration::from_millis(10))));
        let runner = {
            let once = Arc::clone(&once);
            thread::spawn(move || once.call_once(|| thread::sleep(Duration::from_millis(20))))
        };
        assert!(once.wait(Some(Duration::from_secs(5))));
        assert!(runner.join().unwrap());
        assert!(once.wait(Some(Duration::MAX)));
    }
}
