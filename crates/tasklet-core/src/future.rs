//! Single-assignment result cell shared between a submitter and a worker
//!
//! A [`TaskFuture`] starts pending, may be moved to running by the worker
//! that picks its task up, and is completed exactly once: fulfilled with a
//! value, failed with an error, or cancelled. Waiters block on a condition
//! variable; callbacks run once the outcome is stored.

use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::time::{Duration, Instant};

use crate::cancel::CancellationToken;
use crate::error::{Error, Result, TaskError};
use crate::id::TaskId;
use crate::kwarn;
use crate::state::FutureState;
use crate::sync::{lock_state, wait_on, wait_until};

/// Terminal result stored in a future
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Fulfilled(T),
    Failed(Error),
    Cancelled,
}

impl<T> Outcome<T> {
    /// The value, if fulfilled
    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Fulfilled(v) => Some(v),
            _ => None,
        }
    }

    /// The error, if failed
    pub fn error(&self) -> Option<&Error> {
        match self {
            Outcome::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Outcome::Fulfilled(_))
    }

    pub fn state(&self) -> FutureState {
        match self {
            Outcome::Fulfilled(_) => FutureState::Fulfilled,
            Outcome::Failed(_) => FutureState::Failed,
            Outcome::Cancelled => FutureState::Cancelled,
        }
    }

    /// Clone the outcome into a `Result`
    pub fn to_result(&self) -> Result<T>
    where
        T: Clone,
    {
        match self {
            Outcome::Fulfilled(v) => Ok(v.clone()),
            Outcome::Failed(e) => Err(e.clone()),
            Outcome::Cancelled => Err(Error::Cancelled),
        }
    }
}

type Callback<T> = Box<dyn FnOnce(&Outcome<T>) + Send>;
type CancelHook = Box<dyn FnOnce() + Send>;

struct Progress<T> {
    running: bool,
    callbacks: Vec<Callback<T>>,
    cancel_hook: Option<CancelHook>,
}

struct Inner<T> {
    id: TaskId,
    // Written once, under `progress`; read lock-free afterwards
    outcome: OnceLock<Outcome<T>>,
    progress: Mutex<Progress<T>>,
    done: Condvar,
    token: CancellationToken,
}

/// Handle to the eventual outcome of a task
///
/// Clones share the same cell.
pub struct TaskFuture<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for TaskFuture<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> TaskFuture<T> {
    /// A pending future with a fresh id and no cancellation token
    pub fn new() -> Self {
        Self::with_token(TaskId::next(), CancellationToken::never())
    }

    /// A pending future for task `id`
    ///
    /// `token` is cancelled when a cancel request arrives after the task
    /// started; tasks may poll it to stop early.
    pub fn with_token(id: TaskId, token: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                outcome: OnceLock::new(),
                progress: Mutex::new(Progress {
                    running: false,
                    callbacks: Vec::new(),
                    cancel_hook: None,
                }),
                done: Condvar::new(),
                token,
            }),
        }
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    /// The task's cancellation token
    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    pub fn state(&self) -> FutureState {
        if let Some(outcome) = self.inner.outcome.get() {
            return outcome.state();
        }
        let progress = lock_state(&self.inner.progress);
        match self.inner.outcome.get() {
            Some(outcome) => outcome.state(),
            None if progress.running => FutureState::Running,
            None => FutureState::Pending,
        }
    }

    /// True once an outcome is stored
    pub fn is_done(&self) -> bool {
        self.inner.outcome.get().is_some()
    }

    pub fn is_running(&self) -> bool {
        self.state() == FutureState::Running
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.inner.outcome.get(), Some(Outcome::Cancelled))
    }

    /// The stored outcome, if any
    pub fn outcome(&self) -> Option<&Outcome<T>> {
        self.inner.outcome.get()
    }

    /// Move from pending to running
    ///
    /// Returns `Ok(false)` if the future was cancelled before the worker got
    /// to it; the task must then be skipped.
    pub fn start(&self) -> Result<bool> {
        let mut progress = lock_state(&self.inner.progress);
        match self.inner.outcome.get() {
            Some(Outcome::Cancelled) => Ok(false),
            Some(_) => Err(Error::InvalidState("future already completed")),
            None if progress.running => Err(Error::InvalidState("future already running")),
            None => {
                progress.running = true;
                progress.cancel_hook = None;
                Ok(true)
            }
        }
    }

    /// Complete with a value
    pub fn resolve(&self, value: T) -> Result<()> {
        self.complete(Outcome::Fulfilled(value))
    }

    /// Complete with an error
    pub fn fail(&self, error: Error) -> Result<()> {
        self.complete(Outcome::Failed(error))
    }

    /// Request cancellation
    ///
    /// Succeeds only before the task started: the future becomes cancelled,
    /// the queued task is withdrawn and callbacks fire. Once running, the
    /// task's token is cancelled and `false` is returned; whether the task
    /// stops early is up to the task.
    pub fn cancel(&self) -> bool {
        let (callbacks, hook) = {
            let mut progress = lock_state(&self.inner.progress);
            match self.inner.outcome.get() {
                Some(Outcome::Cancelled) => return true,
                Some(_) => return false,
                None if progress.running => {
                    drop(progress);
                    self.inner.token.cancel();
                    return false;
                }
                None => {
                    let _ = self.inner.outcome.set(Outcome::Cancelled);
                    (
                        std::mem::take(&mut progress.callbacks),
                        progress.cancel_hook.take(),
                    )
                }
            }
        };
        self.inner.done.notify_all();
        if let Some(hook) = hook {
            hook();
        }
        self.run_callbacks(callbacks);
        true
    }

    /// Install the hook that withdraws the queued task on cancellation
    ///
    /// Dropped without running once the task starts.
    pub fn set_cancel_hook(&self, hook: impl FnOnce() + Send + 'static) {
        let mut progress = lock_state(&self.inner.progress);
        if self.inner.outcome.get().is_none() && !progress.running {
            progress.cancel_hook = Some(Box::new(hook));
        }
    }

    /// Block until the future is done or `timeout` elapses
    ///
    /// Returns true if the future is done.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        if self.is_done() {
            return true;
        }
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut progress = lock_state(&self.inner.progress);
        while self.inner.outcome.get().is_none() {
            match deadline {
                None => progress = wait_on(&self.inner.done, progress),
                Some(deadline) => {
                    let (guard, timed_out) = wait_until(&self.inner.done, progress, deadline);
                    progress = guard;
                    if timed_out {
                        break;
                    }
                }
            }
        }
        self.inner.outcome.get().is_some()
    }

    /// Block for the outcome
    ///
    /// Returns the value, the stored error, `Cancelled`, or `Timeout` if
    /// `timeout` elapsed first. A timeout leaves the future untouched.
    pub fn get(&self, timeout: Option<Duration>) -> Result<T>
    where
        T: Clone,
    {
        if !self.wait(timeout) {
            return Err(Error::Timeout);
        }
        match self.inner.outcome.get() {
            Some(outcome) => outcome.to_result(),
            None => Err(Error::Timeout),
        }
    }

    /// Register `callback` to run with the outcome
    ///
    /// Runs immediately on the calling thread if the future is already
    /// done; otherwise exactly once on the completing thread, in
    /// registration order.
    pub fn add_callback<F>(&self, callback: F)
    where
        F: FnOnce(&Outcome<T>) + Send + 'static,
    {
        {
            let mut progress = lock_state(&self.inner.progress);
            if self.inner.outcome.get().is_none() {
                progress.callbacks.push(Box::new(callback));
                return;
            }
        }
        if let Some(outcome) = self.inner.outcome.get() {
            invoke(self.inner.id, Box::new(callback), outcome);
        }
    }

    /// A `std::future::Future` resolving to this future's result
    pub fn wait_async(&self) -> WaitAsync<T> {
        WaitAsync {
            future: self.clone(),
            waker: None,
        }
    }

    /// A future settled with `f` applied to this one's result
    ///
    /// `f` runs on the completing thread and sees every outcome, with
    /// cancellation as `Err(Cancelled)`. Returning `Err(Cancelled)` cancels
    /// the derived future; a panic in `f` fails it.
    pub fn handle<U, F>(&self, f: F) -> TaskFuture<U>
    where
        T: Clone,
        U: Send + Sync + 'static,
        F: FnOnce(Result<T>) -> Result<U> + Send + 'static,
    {
        let derived = TaskFuture::new();
        let target = derived.clone();
        self.add_callback(move |outcome| {
            let result = catch_unwind(AssertUnwindSafe(|| f(outcome.to_result())))
                .unwrap_or_else(|payload| Err(TaskError::from_panic(payload.as_ref()).into()));
            target.settle(result);
        });
        derived
    }

    /// A future holding `f(value)`; errors and cancellation pass through
    pub fn map<U, F>(&self, f: F) -> TaskFuture<U>
    where
        T: Clone,
        U: Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.handle(move |result| result.map(f))
    }

    /// Chain a dependent computation that itself produces a future
    ///
    /// The derived future follows the one `f` returns.
    pub fn and_then<U, F>(&self, f: F) -> TaskFuture<U>
    where
        T: Clone,
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> TaskFuture<U> + Send + 'static,
    {
        let derived = TaskFuture::new();
        let target = derived.clone();
        self.add_callback(move |outcome| match outcome.to_result() {
            Ok(value) => match catch_unwind(AssertUnwindSafe(|| f(value))) {
                Ok(next) => next.add_callback(move |outcome| target.settle(outcome.to_result())),
                Err(payload) => target.settle(Err(TaskError::from_panic(payload.as_ref()).into())),
            },
            Err(error) => target.settle(Err(error)),
        });
        derived
    }

    /// Replace a failure (or cancellation) with `f(error)`
    pub fn recover<F>(&self, f: F) -> TaskFuture<T>
    where
        T: Clone + Sync,
        F: FnOnce(Error) -> Result<T> + Send + 'static,
    {
        self.handle(move |result| result.or_else(f))
    }

    /// Store `result`; a derived future already cancelled by its holder stays so
    fn settle(&self, result: Result<T>) {
        let _ = match result {
            Ok(value) => self.resolve(value),
            Err(Error::Cancelled) => {
                self.cancel();
                Ok(())
            }
            Err(error) => self.fail(error),
        };
    }

    fn complete(&self, outcome: Outcome<T>) -> Result<()> {
        let callbacks = {
            let mut progress = lock_state(&self.inner.progress);
            if self.inner.outcome.set(outcome).is_err() {
                return Err(Error::AlreadyResolved);
            }
            progress.cancel_hook = None;
            std::mem::take(&mut progress.callbacks)
        };
        self.inner.done.notify_all();
        self.run_callbacks(callbacks);
        Ok(())
    }

    fn run_callbacks(&self, callbacks: Vec<Callback<T>>) {
        if callbacks.is_empty() {
            return;
        }
        if let Some(outcome) = self.inner.outcome.get() {
            for callback in callbacks {
                invoke(self.inner.id, callback, outcome);
            }
        }
    }
}

/// Run one callback, containing a panic so later callbacks still run
fn invoke<T>(id: TaskId, callback: Callback<T>, outcome: &Outcome<T>) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(outcome))) {
        kwarn!(
            "callback for {} panicked: {}",
            id,
            TaskError::from_panic(payload.as_ref()).message()
        );
    }
}

impl<T: Send + 'static> Default for TaskFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> fmt::Debug for TaskFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFuture")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Awaitable view of a [`TaskFuture`], see [`TaskFuture::wait_async`]
pub struct WaitAsync<T> {
    future: TaskFuture<T>,
    waker: Option<Arc<Mutex<Waker>>>,
}

impl<T: Clone + Send + 'static> Future for WaitAsync<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<T>> {
        if let Some(outcome) = self.future.outcome() {
            return Poll::Ready(outcome.to_result());
        }
        if let Some(slot) = self.waker.clone() {
            let mut waker = lock_state(&slot);
            if !waker.will_wake(cx.waker()) {
                *waker = cx.waker().clone();
            }
        } else {
            let slot = Arc::new(Mutex::new(cx.waker().clone()));
            let notify = Arc::clone(&slot);
            self.waker = Some(slot);
            self.future
                .add_callback(move |_| lock_state(&notify).wake_by_ref());
        }
        // The outcome may have landed between the check and the registration
        match self.future.outcome() {
            Some(outcome) => Poll::Ready(outcome.to_result()),
            None => Poll::Pending,
        }
    }
}

/// Iterator over futures in completion order, see [`as_completed`]
pub struct AsCompleted<T> {
    futures: Vec<TaskFuture<T>>,
    done: crossbeam_channel::Receiver<usize>,
    remaining: usize,
}

/// Yield each future as it completes, regardless of submission order
pub fn as_completed<T: Send + 'static>(futures: &[TaskFuture<T>]) -> AsCompleted<T> {
    let (tx, rx) = crossbeam_channel::unbounded();
    for (index, future) in futures.iter().enumerate() {
        let tx = tx.clone();
        future.add_callback(move |_| {
            let _ = tx.send(index);
        });
    }
    AsCompleted {
        futures: futures.to_vec(),
        done: rx,
        remaining: futures.len(),
    }
}

impl<T> AsCompleted<T> {
    /// Next completed future, or `Err(Timeout)` if none completes in time
    ///
    /// `Ok(None)` once every future was yielded.
    pub fn next_timeout(&mut self, timeout: Duration) -> Result<Option<TaskFuture<T>>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        match self.done.recv_timeout(timeout) {
            Ok(index) => {
                self.remaining -= 1;
                Ok(Some(self.futures[index].clone()))
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => Err(Error::Timeout),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Ok(None),
        }
    }

    /// Futures not yet yielded
    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

impl<T> Iterator for AsCompleted<T> {
    type Item = TaskFuture<T>;

    fn next(&mut self) -> Option<TaskFuture<T>> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.done.recv().ok()?;
        self.remaining -= 1;
        Some(self.futures[index].clone())
    }
}

/// A future settled by whichever of `futures` completes first
///
/// Later completions are ignored. Fails with `InvalidState` when `futures`
/// is empty.
pub fn any_of<T: Clone + Send + Sync + 'static>(futures: &[TaskFuture<T>]) -> TaskFuture<T> {
    let first = TaskFuture::new();
    if futures.is_empty() {
        let _ = first.fail(Error::InvalidState("any_of needs at least one future"));
        return first;
    }
    for future in futures {
        let target = first.clone();
        future.add_callback(move |outcome| {
            if !target.is_done() {
                target.settle(outcome.to_result());
            }
        });
    }
    first
}

/// Block until every future is done; false if `timeout` elapsed first
pub fn wait_all<T: Send + 'static>(futures: &[TaskFuture<T>], timeout: Option<Duration>) -> bool {
    let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
    futures.iter().all(|future| {
        let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
        future.wait(remaining)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_resolve_then_get() {
        let future = TaskFuture::new();
        assert_eq!(future.state(), FutureState::Pending);
        future.resolve(5u32).unwrap();
        assert_eq!(future.state(), FutureState::Fulfilled);
        assert_eq!(future.get(None), Ok(5));
        assert_eq!(future.get(Some(Duration::ZERO)), Ok(5));
    }

    #[test]
    fn test_get_blocks_until_resolved_from_other_thread() {
        let future = TaskFuture::new();
        let producer = future.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.resolve(String::from("done")).unwrap();
        });
        assert_eq!(future.get(Some(Duration::from_secs(5))), Ok("done".to_string()));
        handle.join().unwrap();
    }

    #[test]
    fn test_get_timeout_leaves_future_pending() {
        let future: TaskFuture<u32> = TaskFuture::new();
        assert_eq!(future.get(Some(Duration::from_millis(10))), Err(Error::Timeout));
        assert_eq!(future.state(), FutureState::Pending);
        future.resolve(1).unwrap();
        assert_eq!(future.get(None), Ok(1));
    }

    #[test]
    fn test_second_completion_rejected() {
        let future = TaskFuture::new();
        future.resolve(1u8).unwrap();
        assert_eq!(future.resolve(2), Err(Error::AlreadyResolved));
        assert_eq!(future.fail(Error::Timeout), Err(Error::AlreadyResolved));
        assert_eq!(future.get(None), Ok(1));
    }

    #[test]
    fn test_failure_is_reraised() {
        let future: TaskFuture<u8> = TaskFuture::new();
        future.fail(Error::Task("bad".into())).unwrap();
        assert_eq!(future.state(), FutureState::Failed);
        assert_eq!(future.get(None), Err(Error::Task("bad".into())));
    }

    #[test]
    fn test_cancel_pending_only() {
        let pending: TaskFuture<u8> = TaskFuture::new();
        assert!(pending.cancel());
        assert!(pending.cancel());
        assert!(pending.is_cancelled());
        assert_eq!(pending.get(None), Err(Error::Cancelled));
        assert_eq!(pending.start(), Ok(false));

        let running: TaskFuture<u8> =
            TaskFuture::with_token(TaskId::next(), CancellationToken::new());
        assert_eq!(running.start(), Ok(true));
        assert!(!running.cancel());
        assert!(running.token().is_cancelled());
        assert_eq!(running.state(), FutureState::Running);
        running.resolve(9).unwrap();
        assert_eq!(running.get(None), Ok(9));

        assert!(!running.cancel());
    }

    #[test]
    fn test_start_twice_is_invalid() {
        let future: TaskFuture<u8> = TaskFuture::new();
        assert_eq!(future.start(), Ok(true));
        assert!(matches!(future.start(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_cancel_hook_runs_only_when_withdrawn() {
        let hits = Arc::new(AtomicUsize::new(0));

        let cancelled: TaskFuture<u8> = TaskFuture::new();
        let h = Arc::clone(&hits);
        cancelled.set_cancel_hook(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        cancelled.cancel();

        let started: TaskFuture<u8> = TaskFuture::new();
        let h = Arc::clone(&hits);
        started.set_cancel_hook(move || {
            h.fetch_add(10, Ordering::SeqCst);
        });
        started.start().unwrap();
        started.cancel();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callbacks_fire_once_in_order() {
        let future = TaskFuture::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = Arc::clone(&order);
            future.add_callback(move |outcome: &Outcome<u32>| {
                order.lock().unwrap().push((i, outcome.value().copied()));
            });
        }
        future.resolve(7).unwrap();
        let _ = future.resolve(8);
        assert_eq!(
            *order.lock().unwrap(),
            vec![(0, Some(7)), (1, Some(7)), (2, Some(7))]
        );
    }

    #[test]
    fn test_callback_after_completion_runs_immediately() {
        let future = TaskFuture::new();
        future.resolve(3u32).unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&seen);
        future.add_callback(move |outcome| {
            s.store(*outcome.value().unwrap() as usize, Ordering::SeqCst);
        });
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_panicking_callback_does_not_block_others() {
        crate::kprint::set_log_level(crate::kprint::LogLevel::Off);
        let future = TaskFuture::new();
        let seen = Arc::new(AtomicUsize::new(0));
        future.add_callback(|_: &Outcome<u32>| panic!("callback boom"));
        let s = Arc::clone(&seen);
        future.add_callback(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });
        future.resolve(1).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_as_completed_yields_in_completion_order() {
        let futures: Vec<TaskFuture<usize>> = (0..3).map(|_| TaskFuture::new()).collect();
        let completion = futures.clone();
        let handle = thread::spawn(move || {
            for index in [2, 0, 1] {
                thread::sleep(Duration::from_millis(10));
                completion[index].resolve(index).unwrap();
            }
        });

        let order: Vec<usize> = as_completed(&futures)
            .map(|f| f.get(None).unwrap())
            .collect();
        assert_eq!(order, vec![2, 0, 1]);
        handle.join().unwrap();
    }

    #[test]
    fn test_as_completed_next_timeout() {
        let futures: Vec<TaskFuture<u8>> = vec![TaskFuture::new()];
        let mut iter = as_completed(&futures);
        assert_eq!(
            iter.next_timeout(Duration::from_millis(10)).map(|f| f.is_some()),
            Err(Error::Timeout)
        );
        futures[0].resolve(1).unwrap();
        assert!(iter.next_timeout(Duration::from_secs(1)).unwrap().is_some());
        assert!(iter.next_timeout(Duration::from_secs(1)).unwrap().is_none());
        assert_eq!(iter.remaining(), 0);
    }

    #[test]
    fn test_map_and_recover_chain() {
        let source: TaskFuture<u32> = TaskFuture::new();
        let doubled = source.map(|v| v * 2);
        let text = doubled.map(|v| format!("={v}"));
        source.resolve(21).unwrap();
        assert_eq!(doubled.get(None), Ok(42));
        assert_eq!(text.get(None), Ok("=42".to_string()));

        let failing: TaskFuture<u32> = TaskFuture::new();
        let mapped = failing.map(|v| v + 1);
        let recovered = mapped.recover(|e| match e {
            Error::Task(_) => Ok(0),
            other => Err(other),
        });
        failing.fail(Error::Task("db down".into())).unwrap();
        assert_eq!(mapped.get(None), Err(Error::Task("db down".into())));
        assert_eq!(recovered.get(None), Ok(0));
    }

    #[test]
    fn test_cancellation_passes_through_map() {
        let source: TaskFuture<u8> = TaskFuture::new();
        let mapped = source.map(|v| v + 1);
        source.cancel();
        assert!(mapped.is_cancelled());

        let source: TaskFuture<u8> = TaskFuture::new();
        let recovered = source.recover(|e| if e.is_cancelled() { Ok(9) } else { Err(e) });
        source.cancel();
        assert_eq!(recovered.get(None), Ok(9));
    }

    #[test]
    fn test_handle_sees_both_outcomes_and_contains_panic() {
        crate::kprint::set_log_level(crate::kprint::LogLevel::Off);
        let ok: TaskFuture<u8> = TaskFuture::new();
        let described = ok.handle(|r| Ok(format!("{r:?}")));
        ok.resolve(1).unwrap();
        assert_eq!(described.get(None), Ok("Ok(1)".to_string()));

        let source: TaskFuture<u8> = TaskFuture::new();
        let exploded: TaskFuture<u8> = source.handle(|_| panic!("handler boom"));
        source.resolve(1).unwrap();
        match exploded.get(Some(Duration::from_secs(1))) {
            Err(Error::Task(e)) => {
                assert!(e.is_panic());
                assert_eq!(e.message(), "handler boom");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_and_then_follows_inner_future() {
        let user: TaskFuture<u32> = TaskFuture::new();
        let inner: TaskFuture<String> = TaskFuture::new();
        let hand_out = inner.clone();
        let profile = user.and_then(move |id| {
            assert_eq!(id, 7);
            hand_out
        });
        user.resolve(7).unwrap();
        assert_eq!(profile.state(), FutureState::Pending);

        let completer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            inner.resolve("profile-7".to_string()).unwrap();
        });
        assert_eq!(profile.get(Some(Duration::from_secs(5))), Ok("profile-7".to_string()));
        completer.join().unwrap();

        let missing: TaskFuture<u32> = TaskFuture::new();
        let never_called = missing.and_then(|_| -> TaskFuture<u8> { panic!("must not run") });
        missing.fail(Error::Timeout).unwrap();
        assert_eq!(never_called.get(None), Err(Error::Timeout));
    }

    #[test]
    fn test_any_of_takes_first_completion() {
        let futures: Vec<TaskFuture<&str>> = (0..3).map(|_| TaskFuture::new()).collect();
        let first = any_of(&futures);
        assert!(!first.is_done());
        let late = futures.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            late[1].resolve("second").unwrap();
            late[0].fail(Error::Timeout).unwrap();
        });
        assert_eq!(first.get(Some(Duration::from_secs(5))), Ok("second"));
        handle.join().unwrap();
        assert_eq!(first.get(None), Ok("second"));

        let failed: Vec<TaskFuture<u8>> = vec![TaskFuture::new(), TaskFuture::new()];
        let first = any_of(&failed);
        failed[1].fail(Error::Task("nope".into())).unwrap();
        assert_eq!(first.get(None), Err(Error::Task("nope".into())));

        assert!(matches!(
            any_of::<u8>(&[]).get(None),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_wait_all() {
        let futures: Vec<TaskFuture<u8>> = (0..2).map(|_| TaskFuture::new()).collect();
        futures[0].resolve(1).unwrap();
        assert!(!wait_all(&futures, Some(Duration::from_millis(10))));
        futures[1].cancel();
        assert!(wait_all(&futures, Some(Duration::from_millis(10))));
    }
}
