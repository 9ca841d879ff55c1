//! Task wrapping shared by every scheduler.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use rivulet_core::disposable::{BooleanDisposable, Disposable};
use rivulet_core::scheduler::Task;

/// Wrap `task` so it is skipped when its handle is disposed before it starts.
/// The handle reports disposed once the task has run.
pub fn guarded(task: Task) -> (Task, Arc<dyn Disposable>) {
    let flag = BooleanDisposable::shared();
    let check = Arc::clone(&flag);
    let wrapped: Task = Box::new(move || {
        if check.is_disposed() {
            return;
        }
        task();
        check.dispose();
    });
    let handle: Arc<dyn Disposable> = flag;
    (wrapped, handle)
}

/// Run a task, keeping the worker alive if it panics.
pub fn run(task: Task) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(task)) {
        let _ = &payload;
        #[cfg(feature = "tracing")]
        tracing::warn!(
            cause = %rivulet_core::FlowError::from_panic(payload),
            "scheduled task panicked"
        );
    }
}
