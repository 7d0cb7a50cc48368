//! Worker pool walkthrough
//!
//! Squares numbers on a thread pool, shows callbacks, cancellation and
//! completion order, then runs named tasks on forked worker processes.
//!
//! # Environment Variables
//!
//! - `TASKLET_NUM_WORKERS=4` - Worker count
//! - `TASKLET_DEBUG=1` - Pool lifecycle logging
//! - `TASKLET_LOG_LEVEL=debug` - Log level (off, error, warn, info, debug, trace)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tasklet::{
    as_completed, kinfo, kwarn, Event, Executor, ExecutorConfig, Outcome, Result, TaskError,
    WaitGroup,
};

// TASKLET_LOG_LEVEL=debug TASKLET_DEBUG=1 cargo run -p tasklet-pool
fn main() {
    println!("=== tasklet worker pool ===\n");
    tasklet::init_logging();

    if let Err(err) = run() {
        eprintln!("pool demo failed: {err}");
        std::process::exit(1);
    }

    println!("\n=== Example Complete ===");
}

fn run() -> Result<()> {
    let config = ExecutorConfig::from_env();
    config.print();
    let pool = Executor::new(config)?;

    // map keeps input order
    let squares = pool.map(|x: u64| Ok(x * x), 1..=5)?;
    let values = squares
        .iter()
        .map(|f| f.get(None))
        .collect::<Result<Vec<_>>>()?;
    println!("squares: {values:?}");

    // callbacks run on the worker that resolves the future
    let done = Arc::new(AtomicUsize::new(0));
    for i in 0..4u64 {
        let future = pool.submit(move |ctx| {
            thread::sleep(Duration::from_millis(10 * (4 - i)));
            Ok((i, ctx.worker_id()))
        })?;
        let done = Arc::clone(&done);
        future.add_callback(move |outcome: &Outcome<(u64, usize)>| {
            if let Some((i, worker)) = outcome.value() {
                kinfo!("task {} finished on worker {}", i, worker);
            }
            done.fetch_add(1, Ordering::SeqCst);
        });
    }

    // completion order, not submission order
    let sleepy = pool.map(
        |ms: u64| {
            thread::sleep(Duration::from_millis(ms));
            Ok(ms)
        },
        [60, 20, 40],
    )?;
    let order: Vec<u64> = as_completed(&sleepy)
        .filter_map(|f| f.get(None).ok())
        .collect();
    println!("completion order: {order:?}");

    // a failing task only fails its own future
    let failed = pool.submit(|_| -> core::result::Result<(), TaskError> {
        Err("division by zero".into())
    })?;
    if let Err(err) = failed.get(None) {
        kwarn!("expected failure: {}", err);
    }

    // queued tasks can be cancelled, running ones only see their token
    let started = Instant::now();
    let gate = Arc::new(Event::new());
    let blockers: Vec<_> = (0..pool.num_workers())
        .map(|_| {
            let gate = Arc::clone(&gate);
            pool.submit(move |ctx| {
                gate.wait(Some(Duration::from_secs(5)));
                ctx.check().map_err(|e| TaskError::new(e.to_string()))
            })
        })
        .collect::<Result<_>>()?;
    let queued = pool.submit(|_| Ok("never printed"))?;
    println!("cancel queued task: {}", queued.cancel());
    gate.set();
    tasklet::wait_all(&blockers, Some(Duration::from_secs(5)));
    println!(
        "blockers done in {:?}, queued task state: {:?}",
        started.elapsed(),
        queued.state()
    );

    // derived futures and racing
    let price = pool.submit(|_| Ok(40u64))?;
    let total = price.map(|p| p + 2).recover(|_| Ok(0));
    let mirrors = pool.map(
        |ms: u64| {
            thread::sleep(Duration::from_millis(ms));
            Ok(ms)
        },
        [50, 5],
    )?;
    println!(
        "total: {:?}, fastest mirror: {:?}",
        total.get(None),
        tasklet::any_of(&mirrors).get(None)
    );

    // wait group collecting worker errors
    let group = Arc::new(WaitGroup::new());
    for id in 1..=4u32 {
        group.add(1);
        let group = Arc::clone(&group);
        pool.submit(move |_| {
            let outcome = if id % 2 == 0 {
                Err(tasklet::Error::Task(format!("worker {id} failed").into()))
            } else {
                Ok(())
            };
            group
                .done_with(outcome)
                .map_err(|e| TaskError::new(e.to_string()))
        })?;
    }
    if group.wait(Some(Duration::from_secs(5))) {
        for err in group.take_errors() {
            kwarn!("wait group: {}", err);
        }
    }

    pool.shutdown(true);
    println!(
        "callbacks fired: {}, worker states: {:?}",
        done.load(Ordering::SeqCst),
        pool.worker_states()
    );

    #[cfg(unix)]
    processes()?;
    Ok(())
}

#[cfg(unix)]
fn processes() -> Result<()> {
    use tasklet::{ExecutionMode, SharedValue, TaskFuture, TaskRegistry};

    println!("\n--- process workers ---");
    // Shared segments must exist before the children fork
    let hits = Arc::new(SharedValue::new(0u64)?);
    let counter = Arc::clone(&hits);
    let registry = TaskRegistry::new()
        .register("square", |x: u64| Ok(x * x))
        .register("whoami", |_: ()| Ok(std::process::id()))
        .register("hit", move |n: u64| Ok(counter.update(|v| v + n)));

    let pool = Executor::builder(
        ExecutorConfig::from_env()
            .num_workers(2)
            .mode(ExecutionMode::Processes),
    )
    .registry(registry)
    .build()?;

    let squares = pool.map_named::<_, _, u64>("square", 1u64..=5)?;
    let values = squares
        .iter()
        .map(|f| f.get(None))
        .collect::<Result<Vec<_>>>()?;
    println!("squares from children: {values:?}");

    let pid: TaskFuture<u32> = pool.submit_named("whoami", ())?;
    println!("parent pid {}, child pid {}", std::process::id(), pid.get(None)?);

    let bumps = pool.map_named::<_, _, u64>("hit", [1u64; 8])?;
    tasklet::wait_all(&bumps, None);
    println!("shared counter seen by parent: {}", hits.get());

    pool.shutdown(true);
    Ok(())
}
