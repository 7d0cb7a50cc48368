//! Pool worker threads
//!
//! Each worker owns a [`WorkerEnv`]: its index, the pool's shared state and,
//! in process mode, the child process that actually runs tasks. Workers
//! pull jobs until the queue reports end-of-stream.

use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::Value;
use tasklet_core::{kdebug, kerror, kprint, kwarn, Error, Result, TaskError, TaskId, WorkerState};

use super::Shared;
use crate::config::ExecutionMode;
use crate::process::child::ChildWorker;

thread_local! {
    static CURRENT_WORKER_ID: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Index of the pool worker running on this thread, if any
pub fn current_worker_id() -> Option<usize> {
    CURRENT_WORKER_ID.with(Cell::get)
}

/// Per-worker execution context
pub(crate) struct WorkerEnv {
    id: usize,
    shared: Arc<Shared>,
    child: Option<ChildWorker>,
    running: bool,
}

impl WorkerEnv {
    pub(crate) fn new(id: usize, shared: Arc<Shared>) -> Self {
        Self {
            id,
            shared,
            child: None,
            running: false,
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn debug_logging(&self) -> bool {
        self.shared.config.debug_logging
    }

    pub(crate) fn mark_running(&mut self, task: TaskId) {
        *self.shared.slots[self.id].lock() = WorkerState::Running(task);
        self.shared.active.fetch_add(1, Ordering::AcqRel);
        self.running = true;
    }

    pub(crate) fn mark_idle(&mut self) {
        if self.running {
            self.running = false;
            self.shared.active.fetch_sub(1, Ordering::AcqRel);
            *self.shared.slots[self.id].lock() = WorkerState::Idle;
        }
    }

    /// Run a registry task in this worker's execution context
    ///
    /// Thread mode calls the handler in place. Process mode relays the call
    /// to the child; if the child dies or garbles the reply it is killed and
    /// replaced, and the call fails with the outer error.
    pub(crate) fn call_named(
        &mut self,
        name: &str,
        args: Value,
    ) -> Result<core::result::Result<Value, TaskError>> {
        let registry = self
            .shared
            .registry
            .as_deref()
            .ok_or_else(|| Error::Config("no task registry configured".to_string()))?;
        if self.shared.config.mode == ExecutionMode::Threads {
            return Ok(registry.call(name, args));
        }

        if self.child.is_none() {
            self.child = Some(self.spawn_child()?);
        }
        let result = match self.child.as_mut() {
            Some(child) => child.call(name, args),
            None => Err(Error::Worker("worker process unavailable".to_string())),
        };
        if let Err(err) = &result {
            kwarn!("worker process failed: {}; respawning", err);
            if let Some(child) = self.child.take() {
                child.kill();
            }
            match self.spawn_child() {
                Ok(child) => self.child = Some(child),
                Err(err) => kerror!("respawn failed: {}", err),
            }
        }
        result
    }

    /// Per-worker setup before the first job
    fn prepare(&mut self) {
        match self.shared.config.mode {
            ExecutionMode::Threads => {
                if let Some(init) = self.shared.initializer.as_ref() {
                    let id = self.id;
                    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| init(id))) {
                        kerror!(
                            "initializer panicked: {}",
                            TaskError::from_panic(payload.as_ref()).message()
                        );
                    }
                }
            }
            ExecutionMode::Processes => match self.spawn_child() {
                Ok(child) => self.child = Some(child),
                Err(err) => kerror!("cannot start worker process: {}", err),
            },
        }
    }

    fn spawn_child(&self) -> Result<ChildWorker> {
        let registry = self
            .shared
            .registry
            .as_deref()
            .ok_or_else(|| Error::Config("no task registry configured".to_string()))?;
        let child = ChildWorker::spawn(self.id, registry, self.shared.initializer.as_ref())?;
        if self.debug_logging() {
            kdebug!("worker process {} started", child.pid());
        }
        Ok(child)
    }

    fn stop(&mut self) {
        self.mark_idle();
        // Dropping the handle asks the child to exit and reaps it
        drop(self.child.take());
        *self.shared.slots[self.id].lock() = WorkerState::Stopped;
        if self.debug_logging() {
            kdebug!("worker stopped");
        }
    }
}

/// Thread body of a pool worker
pub(crate) fn worker_main(mut env: WorkerEnv) {
    CURRENT_WORKER_ID.with(|cell| cell.set(Some(env.id)));
    kprint::set_worker_id(env.id);
    if env.debug_logging() {
        kdebug!("worker started");
    }

    let served = catch_unwind(AssertUnwindSafe(|| {
        env.prepare();
        while let Some(job) = env.shared.queue.take() {
            job.run(&mut env);
            env.mark_idle();
        }
    }));
    if let Err(payload) = served {
        kerror!(
            "worker loop panicked: {}",
            TaskError::from_panic(payload.as_ref()).message()
        );
    }

    env.stop();
    kprint::clear_worker_id();
    CURRENT_WORKER_ID.with(|cell| cell.set(None));
}
