//! Environment variable helpers used by the configuration layer
//!
//! ```ignore
//! use tasklet_core::env::{env_get, env_get_bool, env_get_ms};
//!
//! let workers: usize = env_get("TASKLET_NUM_WORKERS", 4);
//! let debug = env_get_bool("TASKLET_DEBUG", false);
//! let park = env_get_ms("TASKLET_PARK_TIMEOUT_MS", Duration::from_millis(100));
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Parse `key` as `T`, falling back to `default` when unset or unparsable
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Parse `key` as `T`; `None` when unset or unparsable
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Read `key` as a boolean
///
/// `1|true|yes|on` read as true and `0|false|no|off` as false
/// (case-insensitive). Unset or unrecognized values yield `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Read `key` as a whole number of milliseconds
#[inline]
pub fn env_get_ms(key: &str, default: Duration) -> Duration {
    env_get_opt::<u64>(key)
        .map(Duration::from_millis)
        .unwrap_or(default)
}
