//! A fresh, unshared thread per task.

use std::sync::Arc;
use std::thread;

use rivulet_core::disposable::Disposable;
use rivulet_core::error::{FlowError, Result};
use rivulet_core::id::WorkerId;
use rivulet_core::scheduler::{Scheduler, Task};

use crate::metrics::{self, WorkerEvent};
use crate::task;

/// Highest creation overhead, full isolation between tasks.
#[derive(Debug, Clone)]
pub struct NewWorker {
    prefix: String,
}

impl NewWorker {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for NewWorker {
    fn default() -> Self {
        Self::new("rivulet")
    }
}

impl Scheduler for NewWorker {
    fn schedule(&self, work: Task) -> Result<Arc<dyn Disposable>> {
        let (work, handle) = task::guarded(work);
        let id = WorkerId::next();
        thread::Builder::new()
            .name(format!("{}-new-{}", self.prefix, id.get()))
            .spawn(move || task::run(work))
            .map_err(|e| FlowError::Rejected(format!("spawn new worker: {}", e)))?;
        metrics::record("new_worker", WorkerEvent::Spawned(id));
        Ok(handle)
    }

    fn name(&self) -> &'static str {
        "new_worker"
    }
}
