//! Queued units of work, type-erased for the shared task queue

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tasklet_core::{kdebug, kwarn, Error, Task, TaskContext, TaskError, TaskFuture, TaskId};

use super::worker::WorkerEnv;

/// A task paired with the future it resolves
pub(crate) trait Job: Send {
    fn id(&self) -> TaskId;

    /// Execute on a worker and resolve the future
    fn run(self: Box<Self>, env: &mut WorkerEnv);

    /// Drop without running; the future becomes cancelled
    fn abandon(self: Box<Self>);
}

/// A [`Task`] run on the worker thread itself
pub(crate) struct TaskJob<K: Task> {
    pub(crate) task: K,
    pub(crate) future: TaskFuture<K::Output>,
}

impl<K: Task> Job for TaskJob<K> {
    fn id(&self) -> TaskId {
        self.future.id()
    }

    fn run(self: Box<Self>, env: &mut WorkerEnv) {
        let TaskJob { task, future } = *self;
        if !begin(&future, env) {
            return;
        }
        let ctx = TaskContext::new(future.id(), env.id(), future.token().clone());
        let result = match catch_unwind(AssertUnwindSafe(|| task.execute(&ctx))) {
            Ok(result) => result,
            Err(payload) => Err(TaskError::from_panic(payload.as_ref())),
        };
        finish(&future, env, result.map_err(Error::Task));
    }

    fn abandon(self: Box<Self>) {
        self.future.cancel();
    }
}

/// A registry task addressed by name, runnable in either execution mode
pub(crate) struct NamedJob<R> {
    pub(crate) name: String,
    pub(crate) args: Value,
    pub(crate) future: TaskFuture<R>,
}

impl<R> Job for NamedJob<R>
where
    R: DeserializeOwned + Send + Sync + 'static,
{
    fn id(&self) -> TaskId {
        self.future.id()
    }

    fn run(self: Box<Self>, env: &mut WorkerEnv) {
        let NamedJob { name, args, future } = *self;
        if !begin(&future, env) {
            return;
        }
        let result = match env.call_named(&name, args) {
            Ok(Ok(value)) => serde_json::from_value::<R>(value)
                .map_err(|e| Error::Codec(format!("result of `{name}`: {e}"))),
            Ok(Err(err)) => Err(Error::Task(err)),
            Err(err) => Err(err),
        };
        finish(&future, env, result);
    }

    fn abandon(self: Box<Self>) {
        self.future.cancel();
    }
}

/// Pending to running; false if the task must be skipped
fn begin<T: Send + 'static>(future: &TaskFuture<T>, env: &mut WorkerEnv) -> bool {
    match future.start() {
        Ok(true) => {
            env.mark_running(future.id());
            true
        }
        Ok(false) => false,
        Err(err) => {
            kwarn!("skipping {}: {}", future.id(), err);
            false
        }
    }
}

fn finish<T: Send + 'static>(future: &TaskFuture<T>, env: &WorkerEnv, result: Result<T, Error>) {
    if let Err(err) = &result {
        if env.debug_logging() {
            kdebug!("{} failed: {}", future.id(), err);
        }
    }
    let stored = match result {
        Ok(value) => future.resolve(value),
        Err(err) => future.fail(err),
    };
    if let Err(err) = stored {
        kwarn!("{} already completed: {}", future.id(), err);
    }
}
