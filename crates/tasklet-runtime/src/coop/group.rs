//! Structured groups of cooperative tasks

use core::future::Future;
use std::cell::RefCell;
use std::rc::Rc;

use tasklet_core::{ChildFailure, Error, GroupError, Result};

use super::task::{CatchUnwind, Finished, TaskControl};
use super::{require_current, JoinHandle};

#[derive(Default)]
struct Members {
    children: RefCell<Vec<Rc<dyn TaskControl>>>,
    failures: RefCell<Vec<(usize, Error)>>,
}

impl Members {
    fn cancel_all(&self) {
        // Clone the list first: cancelling may drop futures that touch the group
        let children: Vec<_> = self.children.borrow().iter().cloned().collect();
        for child in children {
            child.request_cancel();
        }
    }
}

/// Scope owning a set of child tasks
///
/// The first child to fail cancels its siblings; [`join`](Self::join) waits
/// for every child and reports the failures as one `Error::Group`. A group
/// dropped before `join` completes cancels its remaining children.
///
/// ```rust,ignore
/// let group = TaskGroup::new();
/// group.spawn(fetch("a"))?;
/// group.spawn(fetch("b"))?;
/// group.join().await?;
/// ```
#[derive(Default)]
pub struct TaskGroup {
    members: Rc<Members>,
    joined: bool,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a child task on the running scheduler
    pub fn spawn<F, T>(&self, future: F) -> Result<JoinHandle<T>>
    where
        F: Future<Output = Result<T>> + 'static,
        T: 'static,
    {
        let core = require_current()?;
        let index = self.members.children.borrow().len();
        let members = Rc::clone(&self.members);
        let child = async move {
            let result = CatchUnwind::new(future).await;
            if let Err(err) = &result {
                if !err.is_cancelled() {
                    members.failures.borrow_mut().push((index, err.clone()));
                    members.cancel_all();
                }
            }
            result
        };
        let handle = core.spawn(child);
        self.members.children.borrow_mut().push(handle.control());
        Ok(handle)
    }

    /// Children spawned so far
    pub fn len(&self) -> usize {
        self.members.children.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Request cancellation of every unfinished child
    pub fn cancel_all(&self) {
        self.members.cancel_all();
    }

    /// Wait until every child completed or was cancelled
    ///
    /// `Err(Group)` lists each child that failed, by spawn index.
    pub async fn join(mut self) -> Result<()> {
        let mut next = 0;
        loop {
            let child = self.members.children.borrow().get(next).cloned();
            let Some(child) = child else {
                break;
            };
            Finished::new(child).await;
            next += 1;
        }
        self.joined = true;

        let children = self.members.children.borrow();
        let failures: Vec<ChildFailure> = self
            .members
            .failures
            .borrow_mut()
            .drain(..)
            .map(|(index, error)| ChildFailure {
                index,
                task: children[index].id(),
                error: Box::new(error),
            })
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Group(GroupError::new(failures)))
        }
    }
}

impl Drop for TaskGroup {
    fn drop(&mut self) {
        if !self.joined {
            self.members.cancel_all();
        }
    }
}

impl std::fmt::Debug for TaskGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGroup")
            .field("children", &self.len())
            .field("failures", &self.members.failures.borrow().len())
            .finish()
    }
}
