//! Cooperative scheduler walkthrough
//!
//! Interleaves sleeping tasks on one thread, gathers results, runs a task
//! group whose failing member cancels its siblings, applies timeouts and
//! offloads a blocking call.
//!
//! # Environment Variables
//!
//! - `TASKLET_PARK_TIMEOUT_MS=100` - Longest idle park of the run loop
//! - `TASKLET_BLOCKING_WORKERS=4` - Threads behind `to_background`
//! - `TASKLET_LOG_LEVEL=debug` - Log level (off, error, warn, info, debug, trace)

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tasklet::{
    gather, kinfo, sleep, spawn, timeout, to_background, wait_for, yield_now, Error, Result,
    Scheduler, SchedulerConfig, TaskGroup, TaskError,
};

fn main() {
    println!("=== tasklet cooperative scheduler ===\n");
    tasklet::init_logging();

    let config = SchedulerConfig::from_env();
    config.print();

    let result = Scheduler::new(config).and_then(|scheduler| scheduler.run(demo()));
    if let Err(err) = result {
        eprintln!("coop demo failed: {err}");
        std::process::exit(1);
    }

    println!("\n=== Example Complete ===");
}

async fn demo() -> Result<()> {
    interleave().await?;
    squares().await?;
    group().await;
    deadlines().await?;
    blocking().await?;
    Ok(())
}

async fn interleave() -> Result<()> {
    println!("\n--- interleaving ---");
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut handles = Vec::new();
    for (name, step) in [("a", 30u64), ("b", 20), ("c", 10)] {
        let log = Rc::clone(&log);
        handles.push(spawn(async move {
            for round in 0..3 {
                sleep(Duration::from_millis(step)).await;
                log.borrow_mut().push(format!("{name}{round}"));
            }
            Ok(())
        })?);
    }
    gather(handles).await?;
    println!("wake order: {:?}", log.borrow());
    Ok(())
}

async fn squares() -> Result<()> {
    println!("\n--- gather ---");
    let handles = (1..=5u64)
        .map(|x| {
            spawn(async move {
                yield_now().await;
                Ok(x * x)
            })
        })
        .collect::<Result<Vec<_>>>()?;
    println!("squares: {:?}", gather(handles).await?);
    Ok(())
}

async fn group() {
    println!("\n--- task group ---");
    let started = Instant::now();
    let group = TaskGroup::new();
    let spawned = (|| {
        group.spawn(async {
            sleep(Duration::from_secs(10)).await;
            kinfo!("slow member finished");
            Ok(())
        })?;
        group.spawn(async {
            sleep(Duration::from_millis(20)).await;
            Err::<(), _>(Error::Task(TaskError::new("bad input")))
        })?;
        Ok::<_, Error>(())
    })();
    if let Err(err) = spawned {
        println!("spawn failed: {err}");
        return;
    }

    match group.join().await {
        Ok(()) => println!("group succeeded"),
        Err(err) => println!("group failed after {:?}: {err}", started.elapsed()),
    }
}

async fn deadlines() -> Result<()> {
    println!("\n--- timeouts ---");
    let slow = timeout(Duration::from_millis(20), async {
        sleep(Duration::from_secs(1)).await;
        Ok("too late")
    })
    .await;
    println!("timeout: {:?}", slow.map_err(|e| e.is_timeout()));

    let handle = spawn(async {
        sleep(Duration::from_secs(1)).await;
        Ok(())
    })?;
    let id = handle.id();
    let waited = wait_for(Duration::from_millis(20), handle).await;
    println!("wait_for task {id}: {:?}", waited.map_err(|e| e.is_timeout()));
    Ok(())
}

async fn blocking() -> Result<()> {
    println!("\n--- to_background ---");
    let ticker = spawn(async {
        let mut ticks = 0;
        for _ in 0..5 {
            sleep(Duration::from_millis(10)).await;
            ticks += 1;
        }
        Ok(ticks)
    })?;
    let name = to_background(|| {
        std::thread::sleep(Duration::from_millis(50));
        std::thread::current().name().map(str::to_owned)
    })
    .await?;
    println!("blocking call ran on {:?}, loop ticked {} times", name, ticker.await?);
    Ok(())
}
