//! Process-backed workers
//!
//! - `registry` - named, serializable task handlers
//! - `codec` - line-delimited JSON frames exchanged over pipes
//! - `child` - one forked child per pool worker
//! - `shm` - lock-protected values in memory shared across a fork
//!
//! Closures cannot cross a process boundary, so process workers only run
//! handlers registered by name before the pool starts. Children inherit
//! the registry through `fork` and receive `(name, args)` pairs encoded as
//! JSON; results travel back the same way.

pub mod codec;
pub mod registry;
pub(crate) mod child;
#[cfg(unix)]
pub mod shm;

pub use codec::{Request, Response};
pub use registry::TaskRegistry;
#[cfg(unix)]
pub use shm::SharedValue;
