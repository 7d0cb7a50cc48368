//! Named task handlers

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tasklet_core::TaskError;

type Handler = Arc<dyn Fn(Value) -> Result<Value, TaskError> + Send + Sync>;

/// Maps task names to typed handlers
///
/// Arguments and results are converted through `serde_json::Value`, so the
/// same registry serves in-thread calls and calls relayed to a child
/// process.
///
/// ```ignore
/// let registry = TaskRegistry::new()
///     .register("square", |x: u64| Ok(x * x))
///     .register("concat", |(a, b): (String, String)| Ok(a + &b));
/// ```
#[derive(Clone, Default)]
pub struct TaskRegistry {
    handlers: HashMap<String, Handler>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous handler
    pub fn register<A, R, F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        A: DeserializeOwned,
        R: Serialize,
        F: Fn(A) -> Result<R, TaskError> + Send + Sync + 'static,
    {
        let name = name.into();
        let label = name.clone();
        let erased: Handler = Arc::new(move |args: Value| {
            let args: A = serde_json::from_value(args)
                .map_err(|e| TaskError::new(format!("invalid arguments for `{label}`: {e}")))?;
            let result = handler(args)?;
            serde_json::to_value(result)
                .map_err(|e| TaskError::new(format!("unserializable result from `{label}`: {e}")))
        });
        self.handlers.insert(name, erased);
        self
    }

    /// Run the handler registered under `name`
    ///
    /// Unknown names, undecodable arguments and panics all surface as a
    /// `TaskError`.
    pub fn call(&self, name: &str, args: Value) -> Result<Value, TaskError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| TaskError::new(format!("unknown task `{name}`")))?;
        match catch_unwind(AssertUnwindSafe(|| handler(args))) {
            Ok(result) => result,
            Err(payload) => Err(TaskError::from_panic(payload.as_ref())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, in no particular order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("TaskRegistry").field("tasks", &names).finish()
    }
}
