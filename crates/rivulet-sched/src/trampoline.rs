//! Run on the calling thread, converting nested submissions into a queue.
//!
//! The outermost `schedule` call on a thread becomes the drainer: it runs its
//! task, then every task queued while it was running, in FIFO order. A
//! `schedule` issued from inside a trampolined task only enqueues, so the call
//! stack stays one task deep however many tasks schedule each other.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::Arc;

use rivulet_core::disposable::Disposable;
use rivulet_core::error::Result;
use rivulet_core::scheduler::{Scheduler, Task};

use crate::task;

thread_local! {
    static QUEUE: RefCell<VecDeque<Task>> = RefCell::new(VecDeque::new());
    static DRAINING: Cell<bool> = Cell::new(false);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Trampoline;

impl Trampoline {
    pub fn new() -> Self {
        Self
    }

    /// True while the current thread is inside a trampolined task.
    pub fn is_draining() -> bool {
        DRAINING.with(|d| d.get())
    }

    /// Tasks waiting on the current thread's trampoline queue.
    pub fn queued() -> usize {
        QUEUE.with(|q| q.borrow().len())
    }
}

impl Scheduler for Trampoline {
    fn schedule(&self, work: Task) -> Result<Arc<dyn Disposable>> {
        let (work, handle) = task::guarded(work);
        if DRAINING.with(|d| d.get()) {
            QUEUE.with(|q| q.borrow_mut().push_back(work));
            #[cfg(feature = "tracing")]
            tracing::trace!(queued = Self::queued(), "trampoline deferred nested task");
            return Ok(handle);
        }

        DRAINING.with(|d| d.set(true));
        task::run(work);
        loop {
            let next = QUEUE.with(|q| q.borrow_mut().pop_front());
            match next {
                Some(work) => task::run(work),
                None => break,
            }
        }
        DRAINING.with(|d| d.set(false));
        Ok(handle)
    }

    fn name(&self) -> &'static str {
        "trampoline"
    }
}
