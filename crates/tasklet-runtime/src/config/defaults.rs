//! Library defaults, overridable through `TASKLET_*` environment variables

/// Upper bound on the default worker count
pub const MAX_DEFAULT_WORKERS: usize = 32;

/// Hard upper bound accepted by `validate()`
pub const MAX_WORKERS: usize = 256;

/// Execution mode name ("threads" or "processes")
pub const MODE: &str = "threads";

/// Task queue capacity; 0 means unbounded
pub const QUEUE_CAPACITY: usize = 0;

/// Worker thread name prefix; threads are named `<prefix>-<index>`
pub const THREAD_NAME_PREFIX: &str = "tasklet-worker";

/// Lifecycle logging at debug level
pub const DEBUG_LOGGING: bool = false;

/// Longest idle park of the cooperative loop
pub const PARK_TIMEOUT_MS: u64 = 100;

/// Threads backing `to_background` calls
pub const BLOCKING_WORKERS: usize = 4;

/// Default number of pool workers: available parallelism, capped
pub fn num_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_WORKERS)
}
