//! Cooperative task bookkeeping: wakers, result cells and join handles

use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};
use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::Wake;

use crossbeam_queue::SegQueue;
use tasklet_core::{Error, Result, TaskError, TaskId, TaskState};

use crate::parking::LoopParking;

thread_local! {
    /// Tasks awaited under each active `timeout`, innermost scope last
    static AWAIT_SCOPES: RefCell<Vec<Vec<Rc<dyn TaskControl>>>> =
        const { RefCell::new(Vec::new()) };
}

/// Run `poll`, adding to `awaited` every task a `JoinHandle` waits on
/// meanwhile
///
/// Scopes nest: a task awaited under an inner scope is recorded in every
/// enclosing one as well.
pub(crate) fn track_awaited<R>(
    awaited: &mut Vec<Rc<dyn TaskControl>>,
    poll: impl FnOnce() -> R,
) -> R {
    struct PopScope<'a>(&'a mut Vec<Rc<dyn TaskControl>>);

    impl Drop for PopScope<'_> {
        fn drop(&mut self) {
            if let Some(scope) = AWAIT_SCOPES.with(|scopes| scopes.borrow_mut().pop()) {
                *self.0 = scope;
            }
        }
    }

    AWAIT_SCOPES.with(|scopes| scopes.borrow_mut().push(std::mem::take(awaited)));
    let _scope = PopScope(awaited);
    poll()
}

fn note_awaited(task: Rc<dyn TaskControl>) {
    let _ = AWAIT_SCOPES.try_with(|scopes| {
        for scope in scopes.borrow_mut().iter_mut() {
            if !scope.iter().any(|seen| seen.id() == task.id()) {
                scope.push(Rc::clone(&task));
            }
        }
    });
}

/// Run queue fed by wakers, possibly from other threads
pub(crate) struct Injector {
    pub(crate) ready: SegQueue<TaskId>,
    pub(crate) parking: Box<dyn LoopParking>,
}

/// Waker of one cooperative task
///
/// `queued` keeps a task in the run queue at most once.
pub(crate) struct TaskWaker {
    id: TaskId,
    queued: AtomicBool,
    injector: Arc<Injector>,
}

impl TaskWaker {
    pub(crate) fn new(id: TaskId, injector: Arc<Injector>) -> Self {
        Self {
            id,
            queued: AtomicBool::new(false),
            injector,
        }
    }

    /// Called by the loop right before polling, so wakes during the poll
    /// requeue the task
    pub(crate) fn dequeued(&self) {
        self.queued.store(false, Ordering::Release);
    }
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        if !self.queued.swap(true, Ordering::AcqRel) {
            self.injector.ready.push(self.id);
            self.injector.parking.unpark();
        }
    }
}

/// Type-erased view of a task cell, used by the loop and by task groups
pub(crate) trait TaskControl {
    fn id(&self) -> TaskId;
    fn state(&self) -> TaskState;
    fn set_state(&self, state: TaskState);
    fn cancel_requested(&self) -> bool;
    /// Ask the loop to drop the task at its next turn
    fn request_cancel(&self) -> bool;
    /// Finish without a value
    fn abort(&self, error: Error);
    /// Wake `waker` once the task reaches a terminal state
    fn on_finish(&self, waker: &Waker);
}

/// Result slot shared by a task and its [`JoinHandle`]
pub(crate) struct TaskCell<T> {
    id: TaskId,
    state: Cell<TaskState>,
    cancel_requested: Cell<bool>,
    result: RefCell<Option<Result<T>>>,
    joiners: RefCell<Vec<Waker>>,
    waker: Waker,
}

impl<T> TaskCell<T> {
    pub(crate) fn new(id: TaskId, waker: Waker) -> Self {
        Self {
            id,
            state: Cell::new(TaskState::Created),
            cancel_requested: Cell::new(false),
            result: RefCell::new(None),
            joiners: RefCell::new(Vec::new()),
            waker,
        }
    }

    /// Store the task's result; later calls are ignored
    pub(crate) fn complete(&self, result: Result<T>) {
        if self.state.get().is_terminated() {
            return;
        }
        let state = match &result {
            Err(Error::Cancelled) => TaskState::Cancelled,
            _ => TaskState::Completed,
        };
        *self.result.borrow_mut() = Some(result);
        self.state.set(state);
        let joiners = std::mem::take(&mut *self.joiners.borrow_mut());
        joiners.into_iter().for_each(Waker::wake);
    }
}

impl<T> TaskControl for TaskCell<T> {
    fn id(&self) -> TaskId {
        self.id
    }

    fn state(&self) -> TaskState {
        self.state.get()
    }

    fn set_state(&self, state: TaskState) {
        if !self.state.get().is_terminated() {
            self.state.set(state);
        }
    }

    fn cancel_requested(&self) -> bool {
        self.cancel_requested.get()
    }

    fn request_cancel(&self) -> bool {
        if self.state.get().is_terminated() {
            return self.state.get() == TaskState::Cancelled;
        }
        if !self.cancel_requested.replace(true) {
            self.waker.wake_by_ref();
        }
        true
    }

    fn abort(&self, error: Error) {
        self.complete(Err(error));
    }

    fn on_finish(&self, waker: &Waker) {
        let mut joiners = self.joiners.borrow_mut();
        if !joiners.iter().any(|w| w.will_wake(waker)) {
            joiners.push(waker.clone());
        }
    }
}

/// Owned handle to a spawned cooperative task
///
/// Awaiting it yields the task's result; dropping it detaches the task,
/// which keeps running until the scheduler's `run` returns.
pub struct JoinHandle<T> {
    cell: Rc<TaskCell<T>>,
}

impl<T> JoinHandle<T> {
    pub(crate) fn new(cell: Rc<TaskCell<T>>) -> Self {
        Self { cell }
    }

    pub fn id(&self) -> TaskId {
        self.cell.id
    }

    pub fn state(&self) -> TaskState {
        self.cell.state.get()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminated()
    }

    /// Request cancellation
    ///
    /// The task is dropped at its next turn, running its destructors, and
    /// its result becomes `Cancelled`. Returns false if it already finished.
    pub fn cancel(&self) -> bool {
        self.cell.request_cancel()
    }

    pub(crate) fn control(&self) -> Rc<dyn TaskControl>
    where
        T: 'static,
    {
        Rc::clone(&self.cell) as Rc<dyn TaskControl>
    }
}

impl<T: 'static> Future for JoinHandle<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<T>> {
        if let Some(result) = self.cell.result.borrow_mut().take() {
            return Poll::Ready(result);
        }
        if self.is_finished() {
            return Poll::Ready(Err(Error::InvalidState("task result already taken")));
        }
        self.cell.on_finish(cx.waker());
        note_awaited(self.control());
        Poll::Pending
    }
}

impl<T> fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinHandle")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

/// Resolves once a task reaches a terminal state, without taking its result
pub(crate) struct Finished {
    control: Rc<dyn TaskControl>,
}

impl Finished {
    pub(crate) fn new(control: Rc<dyn TaskControl>) -> Self {
        Self { control }
    }
}

impl Future for Finished {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.control.state().is_terminated() {
            return Poll::Ready(());
        }
        self.control.on_finish(cx.waker());
        Poll::Pending
    }
}

/// Turns a panic while polling into `Error::Task`
pub(crate) struct CatchUnwind<F> {
    inner: Pin<Box<F>>,
}

impl<F> CatchUnwind<F> {
    pub(crate) fn new(inner: F) -> Self {
        Self {
            inner: Box::pin(inner),
        }
    }
}

impl<F, T> Future for CatchUnwind<F>
where
    F: Future<Output = Result<T>>,
{
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<T>> {
        let inner = self.inner.as_mut();
        match catch_unwind(AssertUnwindSafe(|| inner.poll(cx))) {
            Ok(poll) => poll,
            Err(payload) => Poll::Ready(Err(Error::Task(TaskError::from_panic(payload.as_ref())))),
        }
    }
}
