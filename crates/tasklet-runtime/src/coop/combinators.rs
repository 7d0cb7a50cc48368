//! Suspension points and combinators for cooperative tasks

use core::future::{poll_fn, Future};
use core::pin::Pin;
use core::task::{Context, Poll, Waker};
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use tasklet_core::{Error, Result};

use super::task::{track_awaited, TaskControl};
use super::timer::TimerHandle;
use super::{current, JoinHandle};

/// Future returned by [`sleep`]
#[derive(Debug)]
pub struct Sleep {
    deadline: Instant,
    timer: Option<(TimerHandle, Waker)>,
}

/// Suspend the calling task for `duration`
///
/// Outside a running scheduler the returned future blocks the polling
/// thread instead.
pub fn sleep(duration: Duration) -> Sleep {
    let now = Instant::now();
    Sleep {
        deadline: now.checked_add(duration).unwrap_or(now + Duration::from_secs(u32::MAX as u64)),
        timer: None,
    }
}

impl Sleep {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_elapsed(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let now = Instant::now();
        if now >= this.deadline {
            this.timer = None;
            return Poll::Ready(());
        }
        let Some(core) = current() else {
            thread::sleep(this.deadline - now);
            return Poll::Ready(());
        };
        match &this.timer {
            Some((_, waker)) if waker.will_wake(cx.waker()) => {}
            _ => {
                if let Some((handle, _)) = this.timer.take() {
                    core.cancel_timer(handle);
                }
                let handle = core.add_timer(this.deadline, cx.waker().clone());
                this.timer = Some((handle, cx.waker().clone()));
            }
        }
        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some((handle, _)) = self.timer.take() {
            if let Some(core) = current() {
                core.cancel_timer(handle);
            }
        }
    }
}

/// Future returned by [`yield_now`]
#[derive(Debug, Default)]
pub struct YieldNow {
    yielded: bool,
}

/// Let every other runnable task take a turn
pub fn yield_now() -> YieldNow {
    YieldNow::default()
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// Future returned by [`timeout`]
pub struct Timeout<F> {
    future: Option<Pin<Box<F>>>,
    sleep: Sleep,
    /// Spawned tasks the inner future has been waiting on
    awaited: Vec<Rc<dyn TaskControl>>,
}

/// Run `future` for at most `duration`
///
/// On expiry the inner future is dropped, which runs its destructors, and
/// every spawned task it was awaiting through a [`JoinHandle`] (directly,
/// or inside `gather`/`join_all`) is cancelled. The caller then sees
/// `Err(Timeout)`.
///
/// ```rust,ignore
/// let slow = spawn(async { sleep(Duration::from_secs(5)).await; Ok(()) })?;
/// assert!(timeout(Duration::from_millis(10), slow).await.unwrap_err().is_timeout());
/// ```
pub fn timeout<F, T>(duration: Duration, future: F) -> Timeout<F>
where
    F: Future<Output = Result<T>>,
{
    Timeout {
        future: Some(Box::pin(future)),
        sleep: sleep(duration),
        awaited: Vec::new(),
    }
}

impl<F, T> Future for Timeout<F>
where
    F: Future<Output = Result<T>>,
{
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<T>> {
        let this = &mut *self;
        let Some(future) = this.future.as_mut() else {
            return Poll::Ready(Err(Error::Timeout));
        };
        if let Poll::Ready(result) = track_awaited(&mut this.awaited, || future.as_mut().poll(cx)) {
            this.future = None;
            this.awaited.clear();
            return Poll::Ready(result);
        }
        if Pin::new(&mut this.sleep).poll(cx).is_ready() {
            this.future = None;
            for task in this.awaited.drain(..) {
                task.request_cancel();
            }
            return Poll::Ready(Err(Error::Timeout));
        }
        Poll::Pending
    }
}

/// Wait up to `duration` for a spawned task
///
/// On expiry the task is cancelled and awaited, so its cleanup has run
/// when `Err(Timeout)` comes back. A task that finished in the meantime
/// reports its own result.
pub async fn wait_for<T: 'static>(duration: Duration, mut handle: JoinHandle<T>) -> Result<T> {
    let mut timer = sleep(duration);
    let finished = poll_fn(|cx| {
        if let Poll::Ready(result) = Pin::new(&mut handle).poll(cx) {
            return Poll::Ready(Some(result));
        }
        if Pin::new(&mut timer).poll(cx).is_ready() {
            return Poll::Ready(None);
        }
        Poll::Pending
    })
    .await;
    match finished {
        Some(result) => result,
        None if handle.cancel() => {
            let _ = handle.await;
            Err(Error::Timeout)
        }
        None => handle.await,
    }
}

/// Wait for every task and collect results in input order
///
/// Fails with the first error by input order, but only after all tasks
/// reached a terminal state.
pub async fn gather<T: 'static>(handles: Vec<JoinHandle<T>>) -> Result<Vec<T>> {
    join_all(handles).await.into_iter().collect()
}

/// Wait for every task and keep each outcome, in input order
///
/// Every unfinished handle is polled on each wake, so all of them are
/// registered with the scheduler (and with an enclosing [`timeout`]) from
/// the first poll on.
pub async fn join_all<T: 'static>(handles: Vec<JoinHandle<T>>) -> Vec<Result<T>> {
    let mut pending: Vec<Option<JoinHandle<T>>> = handles.into_iter().map(Some).collect();
    let mut results: Vec<Option<Result<T>>> = pending.iter().map(|_| None).collect();
    poll_fn(|cx| {
        let mut done = true;
        for (slot, result) in pending.iter_mut().zip(results.iter_mut()) {
            let Some(handle) = slot else {
                continue;
            };
            match Pin::new(handle).poll(cx) {
                Poll::Ready(outcome) => {
                    *result = Some(outcome);
                    *slot = None;
                }
                Poll::Pending => done = false,
            }
        }
        if done {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    })
    .await;
    results
        .into_iter()
        .map(|result| result.unwrap_or(Err(Error::InvalidState("task result missing"))))
        .collect()
}
