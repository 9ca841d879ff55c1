//! Fixed-size pool for CPU-bound, non-blocking work.
//!
//! Workers share one FIFO queue. Blocking inside a compute task starves every
//! other task queued here; put blocking work on the I/O pool.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;

use rivulet_core::config::FlowConfig;
use rivulet_core::disposable::Disposable;
use rivulet_core::error::{FlowError, Result};
use rivulet_core::scheduler::{Scheduler, Task};

use crate::metrics::{self, WorkerEvent};
use crate::task;

/// N threads draining one shared queue. Also the engine of `SingleWorker`.
pub(crate) struct FixedPool {
    label: &'static str,
    sender: Mutex<Option<Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl FixedPool {
    pub(crate) fn spawn(label: &'static str, threads: usize, prefix: &str) -> Self {
        let (tx, rx) = unbounded::<Task>();
        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads.max(1) {
            let rx = rx.clone();
            let spawned = thread::Builder::new()
                .name(format!("{}-{}-{}", prefix, label, i))
                .spawn(move || {
                    while let Ok(work) = rx.recv() {
                        task::run(work);
                    }
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    metrics::record(label, WorkerEvent::SpawnFailed(e.to_string()));
                }
            }
        }
        metrics::record(label, WorkerEvent::PoolStarted { threads: workers.len() });
        let sender = if workers.is_empty() { None } else { Some(tx) };
        Self {
            label,
            sender: Mutex::new(sender),
            workers: Mutex::new(workers),
        }
    }

    pub(crate) fn submit(&self, work: Task) -> Result<Arc<dyn Disposable>> {
        let (work, handle) = task::guarded(work);
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(tx) => tx
                .send(work)
                .map_err(|_| FlowError::Rejected(format!("{} pool disconnected", self.label)))?,
            None => {
                return Err(FlowError::Rejected(format!("{} pool is shut down", self.label)));
            }
        }
        Ok(handle)
    }

    pub(crate) fn threads(&self) -> usize {
        self.workers.lock().len()
    }

    /// Stop accepting work; queued tasks still run. Joins the workers unless
    /// called from one of them.
    pub(crate) fn shutdown(&self) {
        self.sender.lock().take();
        let workers = std::mem::take(&mut *self.workers.lock());
        let me = thread::current().id();
        for w in workers {
            if w.thread().id() != me {
                let _ = w.join();
            }
        }
    }
}

pub struct ComputePool {
    pool: FixedPool,
}

impl ComputePool {
    pub fn new(threads: usize, prefix: &str) -> Self {
        Self {
            pool: FixedPool::spawn("compute", threads, prefix),
        }
    }

    pub fn from_config(cfg: &FlowConfig) -> Self {
        Self::new(cfg.compute_threads, &cfg.thread_name_prefix)
    }

    pub fn threads(&self) -> usize {
        self.pool.threads()
    }

    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}

impl Scheduler for ComputePool {
    fn schedule(&self, work: Task) -> Result<Arc<dyn Disposable>> {
        self.pool.submit(work)
    }

    fn name(&self) -> &'static str {
        "compute"
    }
}
