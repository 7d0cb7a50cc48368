//! Offloading blocking calls from the cooperative loop

use std::sync::{Arc, Mutex, PoisonError};

use tasklet_core::{Error, Result};

use super::require_current;

/// Run `f` on the scheduler's blocking pool and await its return value
///
/// The loop keeps running other tasks meanwhile. `f` runs concurrently with
/// the loop, so state it shares with cooperative tasks needs a lock. A panic
/// in `f` surfaces as `Error::Task`. Cancelling the awaiting task does not
/// interrupt `f`.
pub async fn to_background<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let slot = Arc::new(Mutex::new(None));
    let output = Arc::clone(&slot);
    let done = require_current()?.submit_blocking(move || {
        let value = f();
        *output.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
    })?;
    done.wait_async().await?;
    let value = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    value.ok_or(Error::InvalidState("background call produced no value"))
}
