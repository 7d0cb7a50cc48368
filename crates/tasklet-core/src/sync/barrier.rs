//! Reusable N-party barrier

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use super::{deadline_after, lock_state, wait_deadline, wait_on};
use crate::error::{Error, Result};

struct Round {
    /// Callers blocked in the open round
    arrived: usize,
    /// Arrival tickets handed out in the open round; never reused, so a
    /// withdrawn waiter leaves a gap instead of a duplicate index
    issued: usize,
    generation: u64,
}

/// Blocks callers until `parties` of them have arrived, then releases all
///
/// The barrier resets after each release, so the next arrival starts a
/// new round.
pub struct Barrier {
    parties: usize,
    round: Mutex<Round>,
    released: Condvar,
}

/// Returned to every caller released from a round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierWaitResult {
    index: usize,
    leader: bool,
}

impl BarrierWaitResult {
    /// 0-based arrival position within the round
    ///
    /// Distinct for every caller released together. Without timeouts the
    /// indices are exactly `0..parties`; a `wait_timeout` caller that gave
    /// up leaves its index unused.
    pub fn index(&self) -> usize {
        self.index
    }

    /// True for the arrival that completed the round
    pub fn is_leader(&self) -> bool {
        self.leader
    }
}

impl Barrier {
    /// A barrier for `parties` callers; zero is treated as one
    pub fn new(parties: usize) -> Self {
        Self {
            parties: parties.max(1),
            round: Mutex::new(Round {
                arrived: 0,
                issued: 0,
                generation: 0,
            }),
            released: Condvar::new(),
        }
    }

    /// Arrive and block until the round is complete
    pub fn wait(&self) -> BarrierWaitResult {
        let mut round = lock_state(&self.round);
        let generation = round.generation;
        let index = round.issued;
        if self.arrive(&mut round) {
            return BarrierWaitResult { index, leader: true };
        }
        while round.generation == generation {
            round = wait_on(&self.released, round);
        }
        BarrierWaitResult { index, leader: false }
    }

    /// Arrive and wait at most `timeout`
    ///
    /// On timeout the caller's arrival is withdrawn and `Err(Timeout)` is
    /// returned; the other waiters keep waiting for a full round.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<BarrierWaitResult> {
        let deadline = deadline_after(Some(timeout));
        let mut round = lock_state(&self.round);
        let generation = round.generation;
        let index = round.issued;
        if self.arrive(&mut round) {
            return Ok(BarrierWaitResult { index, leader: true });
        }
        while round.generation == generation {
            let (guard, timed_out) = wait_deadline(&self.released, round, deadline);
            round = guard;
            if timed_out && round.generation == generation {
                round.arrived -= 1;
                return Err(Error::Timeout);
            }
        }
        Ok(BarrierWaitResult { index, leader: false })
    }

    /// Number of parties per round
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Callers currently blocked in the open round
    pub fn n_waiting(&self) -> usize {
        lock_state(&self.round).arrived
    }

    /// Record an arrival; true if it completed the round
    fn arrive(&self, round: &mut Round) -> bool {
        round.arrived += 1;
        round.issued += 1;
        if round.arrived < self.parties {
            return false;
        }
        round.arrived = 0;
        round.issued = 0;
        round.generation = round.generation.wrapping_add(1);
        self.released.notify_all();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_releases_all_with_distinct_indices() {
        let barrier = Arc::new(Barrier::new(3));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || barrier.wait())
            })
            .collect();

        let mut indices: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect();
        assert_eq!(indices.iter().filter(|r| r.is_leader()).count(), 1);
        indices.sort_by_key(|r| r.index());
        let indices: Vec<_> = indices.iter().map(|r| r.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_nobody_passes_before_last_arrival() {
        let barrier = Arc::new(Barrier::new(3));
        let passed = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                let passed = Arc::clone(&passed);
                thread::spawn(move || {
                    barrier.wait();
                    passed.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        assert_eq!(passed.load(Ordering::SeqCst), 0);
        assert_eq!(barrier.n_waiting(), 2);

        barrier.wait();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(passed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_fourth_waiter_starts_new_round() {
        let barrier = Arc::new(Barrier::new(3));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(barrier.n_waiting(), 0);
        assert_eq!(
            barrier.wait_timeout(Duration::from_millis(30)),
            Err(Error::Timeout)
        );
        assert_eq!(barrier.n_waiting(), 0);
    }

    #[test]
    fn test_single_party_never_blocks() {
        let barrier = Barrier::new(0);
        assert_eq!(barrier.parties(), 1);
        assert!(barrier.wait().is_leader());
        let result = barrier.wait_timeout(Duration::MAX).unwrap();
        assert!(result.is_leader());
        assert_eq!(result.index(), 0);
    }

    #[test]
    fn test_huge_timeout_waits_like_wait() {
        let barrier = Arc::new(Barrier::new(2));
        let other = Arc::clone(&barrier);
        let waiter = thread::spawn(move || other.wait_timeout(Duration::MAX));
        thread::sleep(Duration::from_millis(20));
        barrier.wait();
        assert!(waiter.join().unwrap().is_ok());
    }

    #[test]
    fn test_withdrawn_index_is_not_reused() {
        let barrier = Arc::new(Barrier::new(3));

        // ticket 0 stays, ticket 1 withdraws
        let first = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || barrier.wait())
        };
        while barrier.n_waiting() < 1 {
            thread::yield_now();
        }
        assert_eq!(
            barrier.wait_timeout(Duration::from_millis(10)),
            Err(Error::Timeout)
        );
        assert_eq!(barrier.n_waiting(), 1);

        let second = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || barrier.wait())
        };
        while barrier.n_waiting() < 2 {
            thread::yield_now();
        }
        let last = barrier.wait();

        let mut indices = vec![
            first.join().unwrap().index(),
            second.join().unwrap().index(),
            last.index(),
        ];
        assert!(last.is_leader());
        indices.sort_unstable();
        indices.dedup();
        assert_eq!(indices.len(), 3);
        assert_eq!(indices, vec![0, 2, 3]);
    }
}
