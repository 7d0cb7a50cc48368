//! Bounded-concurrency worker pool
//!
//! An [`Executor`] owns K workers that pull jobs from one FIFO
//! [`TaskQueue`]. Submitting returns a [`TaskFuture`] at once; the worker
//! that picks the job up resolves it. A task that returns an error or
//! panics fails only its own future and the worker moves on.
//!
//! In [`ExecutionMode::Processes`] each worker forwards named tasks to a
//! forked child, so only registry tasks with serializable arguments and
//! results can run there.
//!
//! ```rust,ignore
//! let pool = Executor::new(ExecutorConfig::new().num_workers(4))?;
//! let squares = pool.map(|x: u64| Ok(x * x), 1..=5)?;
//! let values: Vec<u64> = squares.iter().map(|f| f.get(None)).collect::<Result<_>>()?;
//! pool.shutdown(true);
//! ```

mod job;
mod worker;

pub use worker::current_worker_id;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tasklet_core::{
    kdebug, kerror, CancellationToken, Error, FnTask, Result, SpinLock, Task, TaskContext,
    TaskError, TaskFuture, TaskId, TaskQueue, WorkerState,
};

use crate::config::{ExecutionMode, ExecutorConfig};
use crate::process::TaskRegistry;
use job::{Job, NamedJob, TaskJob};
use worker::{worker_main, WorkerEnv};

/// Per-worker setup hook, called with the worker index
pub type Initializer = Arc<dyn Fn(usize) + Send + Sync>;

/// State shared by the pool handle and its workers
pub(crate) struct Shared {
    pub(crate) config: ExecutorConfig,
    pub(crate) queue: TaskQueue<Box<dyn Job>>,
    pub(crate) slots: Vec<SpinLock<WorkerState>>,
    /// Parent of every task token; cancelled by `shutdown_now`
    pub(crate) token: CancellationToken,
    pub(crate) shutdown: AtomicBool,
    pub(crate) registry: Option<Arc<TaskRegistry>>,
    pub(crate) initializer: Option<Initializer>,
    pub(crate) active: AtomicUsize,
}

/// Builder for an [`Executor`] with a task registry or worker initializer
pub struct ExecutorBuilder {
    config: ExecutorConfig,
    registry: Option<Arc<TaskRegistry>>,
    initializer: Option<Initializer>,
}

impl ExecutorBuilder {
    /// Tasks available to `submit_named`; required in process mode
    pub fn registry(mut self, registry: TaskRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    /// Run `init(worker_index)` once per worker before it takes tasks
    ///
    /// In process mode it runs inside every child, including replacements
    /// for children that died.
    pub fn initializer<F>(mut self, init: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.initializer = Some(Arc::new(init));
        self
    }

    /// Validate the configuration and start the workers
    pub fn build(self) -> Result<Executor> {
        let config = self.config;
        config.validate()?;
        if config.mode == ExecutionMode::Processes {
            if !cfg!(unix) {
                return Err(Error::Config(
                    "process workers require a unix platform".to_string(),
                ));
            }
            if self.registry.is_none() {
                return Err(Error::Config(
                    "process mode requires a task registry".to_string(),
                ));
            }
        }

        let num_workers = config.num_workers;
        let shared = Arc::new(Shared {
            queue: TaskQueue::new(config.queue_capacity),
            slots: (0..num_workers)
                .map(|_| SpinLock::new(WorkerState::Idle))
                .collect(),
            token: CancellationToken::new(),
            shutdown: AtomicBool::new(false),
            registry: self.registry,
            initializer: self.initializer,
            active: AtomicUsize::new(0),
            config,
        });

        let mut handles = Vec::with_capacity(num_workers);
        for id in 0..num_workers {
            let env = WorkerEnv::new(id, Arc::clone(&shared));
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", shared.config.thread_name_prefix, id))
                .spawn(move || worker_main(env));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    shared.shutdown.store(true, Ordering::Release);
                    shared.queue.close();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(Error::Worker(format!("spawn worker thread {id}: {err}")));
                }
            }
        }

        if shared.config.debug_logging {
            kdebug!(
                "executor started: {} {} workers",
                num_workers,
                shared.config.mode
            );
        }
        Ok(Executor {
            shared,
            handles: Mutex::new(handles),
        })
    }
}

/// Fixed-size pool of thread- or process-backed workers
///
/// Dropping the executor performs `shutdown(true)`.
pub struct Executor {
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Executor {
    /// Start a pool without registry or initializer
    pub fn new(config: ExecutorConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: ExecutorConfig) -> ExecutorBuilder {
        ExecutorBuilder {
            config,
            registry: None,
            initializer: None,
        }
    }

    /// Queue a closure; thread mode only
    pub fn submit<F, T>(&self, f: F) -> Result<TaskFuture<T>>
    where
        F: FnOnce(&TaskContext) -> core::result::Result<T, TaskError> + Send + 'static,
        T: Send + Sync + 'static,
    {
        self.submit_task(FnTask(f))
    }

    /// Queue a [`Task`]; thread mode only
    ///
    /// Closures cannot cross into a worker process, so process mode rejects
    /// this with `InvalidState`; use [`submit_named`](Self::submit_named).
    pub fn submit_task<K: Task>(&self, task: K) -> Result<TaskFuture<K::Output>> {
        if self.shared.config.mode == ExecutionMode::Processes {
            return Err(Error::InvalidState("process workers only run named tasks"));
        }
        self.enqueue(|future| Box::new(TaskJob { task, future }) as Box<dyn Job>)
    }

    /// Queue the registry task `name` with serializable `args`
    pub fn submit_named<A, R>(&self, name: &str, args: A) -> Result<TaskFuture<R>>
    where
        A: Serialize,
        R: DeserializeOwned + Send + Sync + 'static,
    {
        if self.shared.registry.is_none() {
            return Err(Error::Config("no task registry configured".to_string()));
        }
        let args = serde_json::to_value(args).map_err(|e| Error::Codec(e.to_string()))?;
        let name = name.to_string();
        self.enqueue(|future| Box::new(NamedJob { name, args, future }) as Box<dyn Job>)
    }

    /// Submit `f(item)` for every item; futures come back in input order
    pub fn map<I, A, R, F>(&self, f: F, items: I) -> Result<Vec<TaskFuture<R>>>
    where
        I: IntoIterator<Item = A>,
        A: Send + 'static,
        R: Send + Sync + 'static,
        F: Fn(A) -> core::result::Result<R, TaskError> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        items
            .into_iter()
            .map(|item| {
                let f = Arc::clone(&f);
                self.submit(move |_| f(item))
            })
            .collect()
    }

    /// [`map`](Self::map) over the registry task `name`
    pub fn map_named<I, A, R>(&self, name: &str, items: I) -> Result<Vec<TaskFuture<R>>>
    where
        I: IntoIterator<Item = A>,
        A: Serialize,
        R: DeserializeOwned + Send + Sync + 'static,
    {
        items
            .into_iter()
            .map(|args| self.submit_named(name, args))
            .collect()
    }

    /// Stop accepting work
    ///
    /// Queued and running tasks still complete. With `wait` the call blocks
    /// until every worker has exited; otherwise the workers drain in the
    /// background and are joined on drop. Repeated calls are no-ops.
    pub fn shutdown(&self, wait: bool) {
        if !self.shared.shutdown.swap(true, Ordering::AcqRel) {
            self.shared.queue.close();
            if self.shared.config.debug_logging {
                kdebug!("executor shutting down ({} queued)", self.shared.queue.len());
            }
        }
        if wait {
            self.join_workers();
        }
    }

    /// Stop at once: cancel queued tasks, signal running ones, join workers
    ///
    /// Returns how many queued tasks were cancelled. Running tasks see their
    /// token cancelled but are not interrupted.
    pub fn shutdown_now(&self) -> usize {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.queue.close();
        let pending = self.shared.queue.drain();
        let cancelled = pending.len();
        for job in pending {
            job.abandon();
        }
        self.shared.token.cancel();
        if self.shared.config.debug_logging {
            kdebug!("executor stopped, {} queued tasks cancelled", cancelled);
        }
        self.join_workers();
        cancelled
    }

    pub fn num_workers(&self) -> usize {
        self.shared.config.num_workers
    }

    pub fn mode(&self) -> ExecutionMode {
        self.shared.config.mode
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.shared.config
    }

    /// Tasks waiting in the queue
    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    /// Tasks currently running
    pub fn active_count(&self) -> usize {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Snapshot of every worker's state
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.shared.slots.iter().map(|slot| *slot.lock()).collect()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    fn enqueue<T, M>(&self, make_job: M) -> Result<TaskFuture<T>>
    where
        T: Send + 'static,
        M: FnOnce(TaskFuture<T>) -> Box<dyn Job>,
    {
        if self.is_shutdown() {
            return Err(Error::ExecutorShutdown);
        }
        let future = TaskFuture::with_token(TaskId::next(), self.shared.token.child());
        let id = future.id();
        let shared = Arc::downgrade(&self.shared);
        future.set_cancel_hook(move || {
            if let Some(shared) = shared.upgrade() {
                drop(shared.queue.remove_where(|job| job.id() == id));
            }
        });
        match self.shared.queue.put(make_job(future.clone())) {
            Ok(()) => Ok(future),
            Err(Error::QueueClosed) => Err(Error::ExecutorShutdown),
            Err(err) => Err(err),
        }
    }

    fn join_workers(&self) {
        let handles = std::mem::take(
            &mut *self
                .handles
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let current = thread::current().id();
        for handle in handles {
            // A task shutting down its own pool cannot join itself
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                kerror!("worker thread panicked");
            }
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shutdown(true);
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("num_workers", &self.num_workers())
            .field("mode", &self.mode())
            .field("queued", &self.queued())
            .field("active", &self.active_count())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
