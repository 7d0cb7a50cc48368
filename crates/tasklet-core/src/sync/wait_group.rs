//! Counter that blocks waiters until outstanding work reaches zero
//!
//! Workers report through [`WaitGroup::done`] or, to hand back a failure,
//! [`WaitGroup::done_with`]; failures are kept in report order and drained
//! by [`WaitGroup::take_errors`].

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use super::{deadline_after, lock_state, wait_deadline};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct Tally {
    pending: usize,
    errors: Vec<Error>,
}

/// Wait for a dynamic number of workers to finish
///
/// ```ignore
/// let group = Arc::new(WaitGroup::new());
/// for job in jobs {
///     group.add(1);
///     let group = Arc::clone(&group);
///     pool.submit(move || group.done_with(job.run()))?;
/// }
/// if !group.wait(Some(Duration::from_secs(1))) {
///     kwarn!("workers still running");
/// }
/// ```
#[derive(Debug, Default)]
pub struct WaitGroup {
    tally: Mutex<Tally>,
    idle: Condvar,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect `n` more completions
    pub fn add(&self, n: usize) {
        lock_state(&self.tally).pending += n;
    }

    /// Report one completion
    ///
    /// Fails with `InvalidState` if nothing is outstanding.
    pub fn done(&self) -> Result<()> {
        self.finish(None)
    }

    /// Report one completion, keeping its error if it failed
    pub fn done_with(&self, outcome: Result<()>) -> Result<()> {
        self.finish(outcome.err())
    }

    /// Completions still outstanding
    pub fn pending(&self) -> usize {
        lock_state(&self.tally).pending
    }

    /// Block until nothing is outstanding; false if `timeout` elapsed first
    ///
    /// A timeout leaves the workers running and the count untouched.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = deadline_after(timeout);
        let mut tally = lock_state(&self.tally);
        while tally.pending > 0 {
            let (guard, timed_out) = wait_deadline(&self.idle, tally, deadline);
            tally = guard;
            if timed_out {
                break;
            }
        }
        tally.pending == 0
    }

    /// Wait, then fail with the first reported error
    ///
    /// `Err(Timeout)` if work is still outstanding at the deadline. Reported
    /// errors are drained either way except on timeout.
    pub fn wait_result(&self, timeout: Option<Duration>) -> Result<()> {
        if !self.wait(timeout) {
            return Err(Error::Timeout);
        }
        match self.take_errors().into_iter().next() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Drain the errors reported so far, in report order
    pub fn take_errors(&self) -> Vec<Error> {
        std::mem::take(&mut lock_state(&self.tally).errors)
    }

    fn finish(&self, error: Option<Error>) -> Result<()> {
        let mut tally = lock_state(&self.tally);
        if tally.pending == 0 {
            return Err(Error::InvalidState("wait group counter would go negative"));
        }
        tally.pending -= 1;
        tally.errors.extend(error);
        if tally.pending == 0 {
            self.idle.notify_all();
        }
        Ok(())
    }
}
