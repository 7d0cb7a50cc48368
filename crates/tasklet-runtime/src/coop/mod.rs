//! Single-threaded cooperative scheduler
//!
//! Tasks are `async` blocks driven by one run loop on the calling thread.
//! Exactly one task runs at a time and control changes hands only at
//! `.await` points, so state touched only by cooperative tasks needs no
//! locking.
//!
//! # Loop
//!
//! ```text
//! loop:
//!   fire due timers            (wakers push task ids into the injector)
//!   poll each task queued at the start of this turn
//!   nothing ran? park until the next deadline, a wake, or park_timeout
//! ```
//!
//! Wakers are `Send + Sync` and may fire from other threads, e.g. from a
//! worker pool completing a [`TaskFuture`](tasklet_core::TaskFuture); they
//! push into a lock-free queue and unpark the loop.
//!
//! # Task states
//!
//! `Created` until first polled, `Runnable` while being polled,
//! `Suspended` between polls, then `Completed` or `Cancelled`.

mod blocking;
mod combinators;
mod group;
mod task;
mod timer;

pub use blocking::to_background;
pub use combinators::{
    gather, join_all, sleep, timeout, wait_for, yield_now, Sleep, Timeout, YieldNow,
};
pub use group::TaskGroup;
pub use task::JoinHandle;

use core::future::Future;
use core::pin::{pin, Pin};
use core::task::{Context, Poll, Waker};
use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;
use std::task::Wake;
use std::time::Instant;

use crossbeam_queue::SegQueue;
use tasklet_core::{kdebug, kwarn, Error, Result, TaskError, TaskFuture, TaskId, TaskState};

use crate::config::{ExecutorConfig, SchedulerConfig};
use crate::executor::Executor;
use crate::parking::new_parking;
use task::{CatchUnwind, Injector, TaskCell, TaskControl, TaskWaker};
use timer::{TimerHandle, TimerHeap};

thread_local! {
    static CURRENT: RefCell<Option<Rc<Core>>> = const { RefCell::new(None) };
}

/// The scheduler running on this thread, if any
fn current() -> Option<Rc<Core>> {
    CURRENT.try_with(|cell| cell.borrow().clone()).ok().flatten()
}

fn require_current() -> Result<Rc<Core>> {
    current().ok_or(Error::InvalidState("no scheduler running on this thread"))
}

struct Entry {
    /// `None` while the loop is polling it
    future: Option<Pin<Box<dyn Future<Output = ()>>>>,
    control: Rc<dyn TaskControl>,
    waker: Arc<TaskWaker>,
}

/// Per-scheduler state, reachable from tasks through the thread-local
pub(crate) struct Core {
    tasks: RefCell<HashMap<TaskId, Entry>>,
    injector: Arc<Injector>,
    timers: RefCell<TimerHeap>,
    blocking: RefCell<Option<Executor>>,
    config: SchedulerConfig,
}

impl Core {
    fn spawn<F, T>(&self, future: F) -> JoinHandle<T>
    where
        F: Future<Output = Result<T>> + 'static,
        T: 'static,
    {
        let id = TaskId::next();
        let waker = Arc::new(TaskWaker::new(id, Arc::clone(&self.injector)));
        let cell = Rc::new(TaskCell::new(id, Waker::from(Arc::clone(&waker))));
        let completion = Rc::clone(&cell);
        let body = async move {
            let result = CatchUnwind::new(future).await;
            completion.complete(result);
        };
        self.tasks.borrow_mut().insert(
            id,
            Entry {
                future: Some(Box::pin(body)),
                control: Rc::clone(&cell) as Rc<dyn TaskControl>,
                waker: Arc::clone(&waker),
            },
        );
        Wake::wake_by_ref(&waker);
        JoinHandle::new(cell)
    }

    /// Poll one queued task
    fn poll_task(&self, id: TaskId) {
        let (mut future, control, waker) = {
            let mut tasks = self.tasks.borrow_mut();
            let Some(entry) = tasks.get_mut(&id) else {
                return;
            };
            entry.waker.dequeued();
            if entry.control.cancel_requested() {
                let removed = tasks.remove(&id);
                drop(tasks);
                if let Some(entry) = removed {
                    self.discard(entry);
                }
                return;
            }
            let Some(future) = entry.future.take() else {
                return;
            };
            (future, Rc::clone(&entry.control), Arc::clone(&entry.waker))
        };

        control.set_state(TaskState::Runnable);
        let waker = Waker::from(waker);
        let mut cx = Context::from_waker(&waker);
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(()) => {
                self.tasks.borrow_mut().remove(&id);
            }
            Poll::Pending => {
                control.set_state(TaskState::Suspended);
                if let Some(entry) = self.tasks.borrow_mut().get_mut(&id) {
                    entry.future = Some(future);
                }
            }
        }
    }

    /// Drop a task's future and mark it cancelled
    fn discard(&self, entry: Entry) {
        let Entry {
            future, control, ..
        } = entry;
        if let Err(payload) = catch_unwind(AssertUnwindSafe(move || drop(future))) {
            kwarn!(
                "{} panicked while cancelling: {}",
                control.id(),
                TaskError::from_panic(payload.as_ref()).message()
            );
        }
        control.abort(Error::Cancelled);
    }

    /// Wake every task whose timer is due; returns how many fired
    fn fire_timers(&self) -> usize {
        let due = self.timers.borrow_mut().expire(Instant::now());
        let fired = due.len();
        due.into_iter().for_each(Waker::wake);
        fired
    }

    pub(crate) fn add_timer(&self, deadline: Instant, waker: Waker) -> TimerHandle {
        self.timers.borrow_mut().insert(deadline, waker)
    }

    pub(crate) fn cancel_timer(&self, handle: TimerHandle) {
        if let Ok(mut timers) = self.timers.try_borrow_mut() {
            timers.cancel(handle);
        }
    }

    /// Queue `f` on the blocking pool, creating the pool on first use
    pub(crate) fn submit_blocking<F>(&self, f: F) -> Result<TaskFuture<()>>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut blocking = self.blocking.borrow_mut();
        if blocking.is_none() {
            let config = ExecutorConfig::new()
                .num_workers(self.config.blocking_workers)
                .thread_name_prefix("tasklet-blocking")
                .debug_logging(self.config.debug_logging);
            *blocking = Some(Executor::new(config)?);
        }
        match blocking.as_ref() {
            Some(pool) => pool.submit(move |_| {
                f();
                Ok::<(), TaskError>(())
            }),
            None => Err(Error::InvalidState("blocking pool unavailable")),
        }
    }

    /// Drop every remaining task, repeating while destructors spawn more
    fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        loop {
            let entries: Vec<Entry> = self
                .tasks
                .borrow_mut()
                .drain()
                .map(|(_, entry)| entry)
                .collect();
            if entries.is_empty() {
                break;
            }
            cancelled += entries.len();
            for entry in entries {
                self.discard(entry);
            }
        }
        self.timers.borrow_mut().clear();
        while self.injector.ready.pop().is_some() {}
        cancelled
    }
}

/// Clears the thread-local and cancels leftover tasks, also on unwind
struct Entered {
    core: Rc<Core>,
}

impl Entered {
    fn enter(core: &Rc<Core>) -> Result<Self> {
        CURRENT.with(|cell| {
            let mut current = cell.borrow_mut();
            if current.is_some() {
                return Err(Error::InvalidState("scheduler already running on this thread"));
            }
            *current = Some(Rc::clone(core));
            Ok(Self {
                core: Rc::clone(core),
            })
        })
    }
}

impl Drop for Entered {
    fn drop(&mut self) {
        let cancelled = self.core.cancel_all();
        if self.core.config.debug_logging && cancelled > 0 {
            kdebug!("scheduler exit cancelled {} tasks", cancelled);
        }
        let _ = CURRENT.try_with(|cell| cell.borrow_mut().take());
    }
}

/// Cooperative run loop bound to the thread calling [`run`](Scheduler::run)
///
/// ```rust,ignore
/// let scheduler = Scheduler::new(SchedulerConfig::new())?;
/// let total = scheduler.run(async {
///     let a = spawn(async { sleep(Duration::from_millis(10)).await; Ok(1) })?;
///     let b = spawn(async { Ok(2) })?;
///     Ok(gather(vec![a, b]).await?.iter().sum::<i32>())
/// })?;
/// ```
pub struct Scheduler {
    core: Rc<Core>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        let injector = Arc::new(Injector {
            ready: SegQueue::new(),
            parking: new_parking(),
        });
        Ok(Self {
            core: Rc::new(Core {
                tasks: RefCell::new(HashMap::new()),
                injector,
                timers: RefCell::new(TimerHeap::new()),
                blocking: RefCell::new(None),
                config,
            }),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.core.config
    }

    /// Drive `root` and every task it spawns until `root` completes
    ///
    /// Tasks still pending afterwards are cancelled. Fails with
    /// `InvalidState` if a scheduler already runs on this thread.
    pub fn run<F, T>(&self, root: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _entered = Entered::enter(&self.core)?;
        let core = &self.core;
        let injector = &core.injector;

        let root_id = TaskId::next();
        let root_waker = Arc::new(TaskWaker::new(root_id, Arc::clone(injector)));
        let waker = Waker::from(Arc::clone(&root_waker));
        let mut root = pin!(root);
        Wake::wake_by_ref(&root_waker);

        if core.config.debug_logging {
            kdebug!("scheduler run started");
        }
        loop {
            let fired = core.fire_timers();
            let batch = injector.ready.len();
            for _ in 0..batch {
                let Some(id) = injector.ready.pop() else {
                    break;
                };
                if id != root_id {
                    core.poll_task(id);
                    continue;
                }
                root_waker.dequeued();
                let mut cx = Context::from_waker(&waker);
                if let Poll::Ready(result) = root.as_mut().poll(&mut cx) {
                    if core.config.debug_logging {
                        kdebug!("scheduler run finished");
                    }
                    return result;
                }
            }
            if batch == 0 && fired == 0 {
                self.park();
            }
        }
    }

    fn park(&self) {
        let core = &self.core;
        let limit = core.config.park_timeout;
        let timeout = match core.timers.borrow_mut().next_deadline() {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()).min(limit),
            None => limit,
        };
        if !timeout.is_zero() {
            core.injector.parking.park(Some(timeout));
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Joins the blocking pool, if one was started
        drop(self.core.blocking.borrow_mut().take());
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.core.config)
            .field("tasks", &self.core.tasks.borrow().len())
            .finish()
    }
}

/// Start `future` as a new task on the running scheduler
///
/// The task runs whether or not the handle is awaited.
pub fn spawn<F, T>(future: F) -> Result<JoinHandle<T>>
where
    F: Future<Output = Result<T>> + 'static,
    T: 'static,
{
    Ok(require_current()?.spawn(future))
}

/// True when called from inside [`Scheduler::run`]
pub fn in_scheduler() -> bool {
    current().is_some()
}

/// Tasks spawned on this thread's scheduler that have not finished
pub fn pending_tasks() -> usize {
    current().map_or(0, |core| core.tasks.borrow().len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::thread;
    use std::time::Duration;
    use tasklet_core::FutureState;

    struct OnDrop<F: FnMut()>(F);

    impl<F: FnMut()> Drop for OnDrop<F> {
        fn drop(&mut self) {
            (self.0)()
        }
    }

    fn scheduler() -> Scheduler {
        Scheduler::new(SchedulerConfig::new()).unwrap()
    }

    fn flag() -> (Rc<Cell<bool>>, OnDrop<impl FnMut()>) {
        let flag = Rc::new(Cell::new(false));
        let set = Rc::clone(&flag);
        (flag, OnDrop(move || set.set(true)))
    }

    #[test]
    fn test_run_returns_root_result() {
        let scheduler = scheduler();
        assert_eq!(scheduler.run(async { Ok(7) }), Ok(7));
        assert_eq!(
            scheduler.run(async { Err::<(), _>(Error::Timeout) }),
            Err(Error::Timeout)
        );
        assert!(!in_scheduler());
    }

    #[test]
    fn test_nested_run_rejected() {
        let result = scheduler().run(async {
            let inner = Scheduler::new(SchedulerConfig::new())?;
            Ok(inner.run(async { Ok(()) }))
        });
        assert!(matches!(result, Ok(Err(Error::InvalidState(_)))));
    }

    #[test]
    fn test_spawn_requires_scheduler() {
        assert!(matches!(
            spawn(async { Ok(()) }).map(|_| ()),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_sleeping_tasks_interleave() {
        let start = Instant::now();
        let order = scheduler()
            .run(async {
                let log = Rc::new(RefCell::new(Vec::new()));
                let slow_log = Rc::clone(&log);
                let slow = spawn(async move {
                    sleep(Duration::from_millis(60)).await;
                    slow_log.borrow_mut().push("slow");
                    Ok(())
                })?;
                let fast_log = Rc::clone(&log);
                let fast = spawn(async move {
                    sleep(Duration::from_millis(20)).await;
                    fast_log.borrow_mut().push("fast");
                    Ok(())
                })?;
                gather(vec![slow, fast]).await?;
                let order = log.borrow().clone();
                Ok(order)
            })
            .unwrap();
        assert_eq!(order, vec!["fast", "slow"]);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(60));
        assert!(elapsed < Duration::from_millis(75 + 500));
    }

    #[test]
    fn test_yield_now_round_robin() {
        let order = scheduler()
            .run(async {
                let log = Rc::new(RefCell::new(Vec::new()));
                let mut handles = Vec::new();
                for name in ["a", "b"] {
                    let log = Rc::clone(&log);
                    handles.push(spawn(async move {
                        for i in 0..3 {
                            log.borrow_mut().push(format!("{name}{i}"));
                            yield_now().await;
                        }
                        Ok(())
                    })?);
                }
                gather(handles).await?;
                let order = log.borrow().clone();
                Ok(order)
            })
            .unwrap();
        assert_eq!(order, vec!["a0", "b0", "a1", "b1", "a2", "b2"]);
    }

    #[test]
    fn test_gather_waits_for_all_then_reports_first_by_input_order() {
        let (results, slow_done) = scheduler()
            .run(async {
                let slow_done = Rc::new(Cell::new(false));
                let done = Rc::clone(&slow_done);
                let handles = vec![
                    spawn(async move {
                        sleep(Duration::from_millis(40)).await;
                        done.set(true);
                        Ok(0)
                    })?,
                    spawn(async {
                        sleep(Duration::from_millis(20)).await;
                        Err(Error::Task("late".into()))
                    })?,
                    spawn(async { Err(Error::Task("early".into())) })?,
                ];
                let results = gather(handles).await;
                Ok((results, slow_done.get()))
            })
            .unwrap();
        assert_eq!(results, Err(Error::Task("late".into())));
        assert!(slow_done);

        let values = scheduler()
            .run(async {
                let handles = (1..=5)
                    .map(|x: u64| {
                        spawn(async move {
                            sleep(Duration::from_millis(30 - 5 * x)).await;
                            Ok(x * x)
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                gather(handles).await
            })
            .unwrap();
        assert_eq!(values, vec![1, 4, 9, 16, 25]);
    }

    #[test]
    fn test_join_all_keeps_every_outcome() {
        let results = scheduler()
            .run(async {
                let handles = vec![
                    spawn(async { Ok(1) })?,
                    spawn(async { Err(Error::Task("no".into())) })?,
                ];
                Ok(join_all(handles).await)
            })
            .unwrap();
        assert_eq!(results, vec![Ok(1), Err(Error::Task("no".into()))]);
    }

    #[test]
    fn test_group_failure_cancels_siblings() {
        let (joined, states, cleaned) = scheduler()
            .run(async {
                let (first_clean, first_guard) = flag();
                let (third_clean, third_guard) = flag();
                let group = TaskGroup::new();
                let first = group.spawn(async move {
                    let _guard = first_guard;
                    sleep(Duration::from_secs(5)).await;
                    Ok(1)
                })?;
                let second = group.spawn(async {
                    sleep(Duration::from_millis(10)).await;
                    Err::<i32, _>(Error::Task("child 2 failed".into()))
                })?;
                let third = group.spawn(async move {
                    let _guard = third_guard;
                    sleep(Duration::from_secs(5)).await;
                    Ok(3)
                })?;
                let joined = group.join().await;
                let states = [first.state(), second.state(), third.state()];
                Ok((joined, states, first_clean.get() && third_clean.get()))
            })
            .unwrap();

        let group = match joined {
            Err(Error::Group(group)) => group,
            other => panic!("expected group error, got {other:?}"),
        };
        assert_eq!(group.len(), 1);
        assert_eq!(group.failures()[0].index, 1);
        assert_eq!(
            *group.failures()[0].error,
            Error::Task("child 2 failed".into())
        );
        assert_eq!(
            states,
            [TaskState::Cancelled, TaskState::Completed, TaskState::Cancelled]
        );
        assert!(cleaned);
    }

    #[test]
    fn test_group_success_and_panicking_child() {
        let ok = scheduler().run(async {
            let group = TaskGroup::new();
            for i in 0..3u64 {
                group.spawn(async move {
                    sleep(Duration::from_millis(i * 5)).await;
                    Ok(i)
                })?;
            }
            assert_eq!(group.len(), 3);
            group.join().await
        });
        assert_eq!(ok, Ok(()));

        let panicked = scheduler().run(async {
            let group = TaskGroup::new();
            group.spawn(async {
                if true {
                    panic!("child exploded");
                }
                Ok(())
            })?;
            group.join().await
        });
        match panicked {
            Err(Error::Group(group)) => match &*group.failures()[0].error {
                Error::Task(err) => assert!(err.is_panic()),
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_dropped_group_cancels_children() {
        let state = scheduler()
            .run(async {
                let group = TaskGroup::new();
                let child = group.spawn(async {
                    sleep(Duration::from_secs(5)).await;
                    Ok(())
                })?;
                drop(group);
                let id = child.id();
                let result = child.await;
                assert_eq!(result, Err(Error::Cancelled));
                Ok(id)
            })
            .map(|_| ());
        assert_eq!(state, Ok(()));
    }

    #[test]
    fn test_timeout_drops_inner_future() {
        let (result, cleaned) = scheduler()
            .run(async {
                let (cleaned, guard) = flag();
                let result = timeout(Duration::from_millis(20), async move {
                    let _guard = guard;
                    sleep(Duration::from_secs(5)).await;
                    Ok(1)
                })
                .await;
                Ok((result, cleaned.get()))
            })
            .unwrap();
        assert_eq!(result, Err(Error::Timeout));
        assert!(cleaned);

        let quick = scheduler().run(timeout(Duration::from_secs(5), async {
            sleep(Duration::from_millis(5)).await;
            Ok("quick")
        }));
        assert_eq!(quick, Ok("quick"));
    }

    #[test]
    fn test_wait_for_cancels_task() {
        let (result, state, cleaned) = scheduler()
            .run(async {
                let (cleaned, guard) = flag();
                let handle = spawn(async move {
                    let _guard = guard;
                    sleep(Duration::from_secs(5)).await;
                    Ok(())
                })?;
                let id = handle.id();
                let task = handle.control();
                let result = wait_for(Duration::from_millis(20), handle).await;
                assert_eq!(task.id(), id);
                Ok((result, task.state(), cleaned.get()))
            })
            .unwrap();
        assert_eq!(result, Err(Error::Timeout));
        assert_eq!(state, TaskState::Cancelled);
        assert!(cleaned);
    }

    #[test]
    fn test_timeout_cancels_awaited_task() {
        let (result, state, ran_on) = scheduler()
            .run(async {
                let ran_on = Rc::new(Cell::new(false));
                let seen = Rc::clone(&ran_on);
                let handle = spawn(async move {
                    sleep(Duration::from_millis(60)).await;
                    seen.set(true);
                    Ok(())
                })?;
                let task = handle.control();
                let result = timeout(Duration::from_millis(10), handle).await;
                sleep(Duration::from_millis(100)).await;
                Ok((result, task.state(), ran_on.get()))
            })
            .unwrap();
        assert_eq!(result, Err(Error::Timeout));
        assert_eq!(state, TaskState::Cancelled);
        assert!(!ran_on);
    }

    #[test]
    fn test_timeout_cancels_every_gathered_task() {
        let (result, states, finished) = scheduler()
            .run(async {
                let finished = Rc::new(Cell::new(0));
                let mut handles = Vec::new();
                for ms in [40, 60] {
                    let finished = Rc::clone(&finished);
                    handles.push(spawn(async move {
                        sleep(Duration::from_millis(ms)).await;
                        finished.set(finished.get() + 1);
                        Ok(ms)
                    })?);
                }
                let tasks: Vec<_> = handles.iter().map(JoinHandle::control).collect();
                let result = timeout(Duration::from_millis(10), gather(handles)).await;
                sleep(Duration::from_millis(100)).await;
                let states: Vec<_> = tasks.iter().map(|task| task.state()).collect();
                Ok((result, states, finished.get()))
            })
            .unwrap();
        assert_eq!(result, Err(Error::Timeout));
        assert_eq!(states, vec![TaskState::Cancelled, TaskState::Cancelled]);
        assert_eq!(finished, 0);
    }

    #[test]
    fn test_timeout_leaves_tasks_alone_on_success() {
        let state = scheduler()
            .run(async {
                let bystander = spawn(async {
                    sleep(Duration::from_millis(30)).await;
                    Ok(())
                })?;
                let quick = spawn(async { Ok(1) })?;
                assert_eq!(timeout(Duration::from_secs(5), quick).await, Ok(1));
                bystander.await?;
                Ok(())
            });
        assert_eq!(state, Ok(()));
    }

    #[test]
    fn test_join_handle_cancel_and_states() {
        scheduler()
            .run(async {
                let sleeper = spawn(async {
                    sleep(Duration::from_secs(5)).await;
                    Ok(())
                })?;
                assert_eq!(sleeper.state(), TaskState::Created);
                yield_now().await;
                assert_eq!(sleeper.state(), TaskState::Suspended);
                assert!(sleeper.cancel());
                assert!(sleeper.cancel());
                assert_eq!(sleeper.await, Err(Error::Cancelled));

                let quick = spawn(async { Ok(5) })?;
                yield_now().await;
                assert!(quick.is_finished());
                assert_eq!(quick.state(), TaskState::Completed);
                assert!(!quick.cancel());
                assert_eq!(quick.await, Ok(5));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_panicking_task_fails_its_handle() {
        let result = scheduler()
            .run(async {
                let handle = spawn(async {
                    if true {
                        panic!("task exploded");
                    }
                    Ok(())
                })?;
                Ok(handle.await)
            })
            .unwrap();
        match result {
            Err(Error::Task(err)) => {
                assert!(err.is_panic());
                assert_eq!(err.message(), "task exploded");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_to_background_keeps_loop_running() {
        let ticks = Rc::new(Cell::new(0));
        let seen = Rc::clone(&ticks);
        let thread_name = scheduler()
            .run(async move {
                let ticker = spawn(async move {
                    for _ in 0..1000 {
                        seen.set(seen.get() + 1);
                        sleep(Duration::from_millis(5)).await;
                    }
                    Ok(())
                })?;
                let name = to_background(|| {
                    thread::sleep(Duration::from_millis(60));
                    thread::current().name().map(str::to_string)
                })
                .await?;
                ticker.cancel();
                let _: Result<()> = ticker.await;
                Ok(name)
            })
            .unwrap();
        assert!(ticks.get() > 1);
        assert!(thread_name.unwrap().starts_with("tasklet-blocking"));
    }

    #[test]
    fn test_to_background_panic_is_task_error() {
        let result = scheduler().run(async {
            to_background(|| -> u32 { panic!("blocking boom") }).await
        });
        assert!(matches!(result, Err(Error::Task(err)) if err.is_panic()));
    }

    #[test]
    fn test_awaits_pool_future() {
        let pool = Executor::new(ExecutorConfig::new().num_workers(2)).unwrap();
        let future = pool
            .submit(|_| {
                thread::sleep(Duration::from_millis(20));
                Ok(99u32)
            })
            .unwrap();
        let value = scheduler().run(future.wait_async());
        assert_eq!(value, Ok(99));
        assert_eq!(future.state(), FutureState::Fulfilled);
    }

    #[test]
    fn test_leftover_tasks_cancelled_after_run() {
        let scheduler = scheduler();
        let (cleaned, handle) = scheduler
            .run(async {
                let (cleaned, guard) = flag();
                let handle = spawn(async move {
                    let _guard = guard;
                    sleep(Duration::from_secs(5)).await;
                    Ok(())
                })?;
                yield_now().await;
                Ok((cleaned, handle))
            })
            .unwrap();
        assert!(cleaned.get());
        assert_eq!(handle.state(), TaskState::Cancelled);
        assert_eq!(pending_tasks(), 0);

        assert_eq!(scheduler.run(async { Ok(pending_tasks()) }), Ok(0));
    }
}
