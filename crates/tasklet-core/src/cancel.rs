//! Cooperative cancellation
//!
//! A running task cannot be stopped from outside; it is handed a token and
//! decides itself when to look at it. Pools derive one child token per task
//! from their own, so `shutdown_now` reaches every running task while
//! `TaskFuture::cancel` reaches only one.

use core::sync::atomic::{AtomicBool, Ordering};
use std::fmt;
use std::iter;
use std::sync::Arc;

use crate::error::{Error, Result};

struct Node {
    cancelled: AtomicBool,
    parent: Option<Arc<Node>>,
}

/// Shared cancellation flag with parent links
///
/// Clones observe the same flag. A token counts as cancelled once it or any
/// ancestor was cancelled; cancelling never propagates upward.
#[derive(Clone)]
pub struct CancellationToken {
    /// `None` for a token that can never be cancelled
    node: Option<Arc<Node>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::linked(None)
    }

    /// A token whose `cancel` is a no-op; used by futures created outside
    /// any pool
    pub fn never() -> Self {
        Self { node: None }
    }

    /// A token cancelled together with `self`
    pub fn child(&self) -> Self {
        Self::linked(self.node.clone())
    }

    fn linked(parent: Option<Arc<Node>>) -> Self {
        Self {
            node: Some(Arc::new(Node {
                cancelled: AtomicBool::new(false),
                parent,
            })),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        iter::successors(self.node.as_deref(), |node| node.parent.as_deref())
            .any(|node| node.cancelled.load(Ordering::Acquire))
    }

    pub fn cancel(&self) {
        if let Some(node) = &self.node {
            node.cancelled.store(true, Ordering::Release);
        }
    }

    /// `Err(Cancelled)` once cancelled, for use with `?` inside task loops
    ///
    /// ```ignore
    /// for chunk in chunks {
    ///     ctx.token().check().map_err(|e| TaskError::new(e.to_string()))?;
    ///     crunch(chunk);
    /// }
    /// ```
    #[inline]
    pub fn check(&self) -> Result<()> {
        match self.is_cancelled() {
            true => Err(Error::Cancelled),
            false => Ok(()),
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancellable", &self.node.is_some())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_then_check() {
        let token = CancellationToken::new();
        assert!(token.check().is_ok());
        token.cancel();
        token.cancel();
        assert_eq!(token.check(), Err(Error::Cancelled));
    }

    #[test]
    fn test_cancellation_flows_down_not_up() {
        let pool = CancellationToken::new();
        let task = pool.child();
        let nested = task.child();
        let other = pool.child();

        task.cancel();
        assert!(nested.is_cancelled());
        assert!(!pool.is_cancelled());
        assert!(!other.is_cancelled());

        pool.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_clones_share_flag() {
        let token = CancellationToken::new();
        let seen_by_worker = token.clone();
        token.cancel();
        assert!(seen_by_worker.is_cancelled());
    }

    #[test]
    fn test_never_and_its_children() {
        let token = CancellationToken::never();
        token.cancel();
        assert!(!token.is_cancelled());

        // children of a never-token are still cancellable on their own
        let child = token.child();
        assert!(!child.is_cancelled());
        child.cancel();
        assert!(child.is_cancelled());
    }
}
