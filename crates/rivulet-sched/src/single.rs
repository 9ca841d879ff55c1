//! Exactly one persistent worker; every submission runs in submission order.

use std::sync::Arc;

use rivulet_core::config::FlowConfig;
use rivulet_core::disposable::Disposable;
use rivulet_core::error::Result;
use rivulet_core::scheduler::{Scheduler, Task};

use crate::compute::FixedPool;

pub struct SingleWorker {
    pool: FixedPool,
}

impl SingleWorker {
    pub fn new(prefix: &str) -> Self {
        Self {
            pool: FixedPool::spawn("single", 1, prefix),
        }
    }

    pub fn from_config(cfg: &FlowConfig) -> Self {
        Self::new(&cfg.thread_name_prefix)
    }

    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}

impl Scheduler for SingleWorker {
    fn schedule(&self, work: Task) -> Result<Arc<dyn Disposable>> {
        self.pool.submit(work)
    }

    fn name(&self) -> &'static str {
        "single"
    }
}
