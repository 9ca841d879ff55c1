//! Abstract execution-context interface.
//!
//! Concrete schedulers live in `rivulet-sched`. Stages depend only on this
//! trait so they never know whether they run on a pool, a dedicated thread or
//! the caller's own stack.

use std::sync::Arc;

use crate::disposable::Disposable;
use crate::error::Result;

/// A unit of work. It carries no identity beyond enqueue order.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait Scheduler: Send + Sync + 'static {
    /// Submit `task` for execution.
    ///
    /// The returned handle cancels the task if disposed before it starts; a
    /// task already running is never interrupted. Fails with
    /// `FlowError::Rejected` once the scheduler has been shut down.
    fn schedule(&self, task: Task) -> Result<Arc<dyn Disposable>>;

    /// Stable, human-readable name (for tracing).
    fn name(&self) -> &'static str;
}
