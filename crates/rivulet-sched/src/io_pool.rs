//! Cached, growable pool for blocking I/O work.
//!
//! Idle workers park on their own single-slot channel and are handed tasks
//! directly; when none is idle a new worker is spawned, with no upper bound.
//! A worker idle for longer than the keep-alive retires.
//!
//! Retirement races with hand-off: a worker that times out removes itself
//! from the idle list under the lock. If it is no longer listed, a submitter
//! has already claimed it and a task is on its way, so it waits for that task.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use rivulet_core::config::FlowConfig;
use rivulet_core::disposable::Disposable;
use rivulet_core::error::{FlowError, Result};
use rivulet_core::id::WorkerId;
use rivulet_core::scheduler::{Scheduler, Task};

use crate::metrics::{self, WorkerEvent};
use crate::task;

struct IdleWorker {
    id: WorkerId,
    handoff: Sender<Task>,
}

struct IoInner {
    idle: Mutex<Vec<IdleWorker>>,
    live: AtomicUsize,
    shutdown: AtomicBool,
    keep_alive: Duration,
    prefix: String,
}

pub struct IoPool {
    inner: Arc<IoInner>,
}

impl IoPool {
    pub fn new(keep_alive: Duration, prefix: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(IoInner {
                idle: Mutex::new(Vec::new()),
                live: AtomicUsize::new(0),
                shutdown: AtomicBool::new(false),
                keep_alive,
                prefix: prefix.into(),
            }),
        }
    }

    pub fn from_config(cfg: &FlowConfig) -> Self {
        Self::new(
            Duration::from_millis(cfg.io_keep_alive_ms),
            cfg.thread_name_prefix.clone(),
        )
    }

    /// Workers currently alive (busy or idle).
    pub fn live_workers(&self) -> usize {
        self.inner.live.load(Ordering::Acquire)
    }

    pub fn idle_workers(&self) -> usize {
        self.inner.idle.lock().len()
    }

    /// Refuse new work and release idle workers. Busy workers finish their
    /// current task and exit.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.idle.lock().clear();
    }

    fn spawn_worker(&self, first: Task) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        let id = WorkerId::next();
        inner.live.fetch_add(1, Ordering::AcqRel);
        let spawned = thread::Builder::new()
            .name(format!("{}-io-{}", inner.prefix, id.get()))
            .spawn({
                let inner = Arc::clone(&inner);
                move || worker_loop(inner, id, first)
            });
        match spawned {
            Ok(_) => {
                metrics::record("io", WorkerEvent::Spawned(id));
                Ok(())
            }
            Err(e) => {
                inner.live.fetch_sub(1, Ordering::AcqRel);
                Err(FlowError::Rejected(format!("spawn io worker: {}", e)))
            }
        }
    }
}

fn worker_loop(inner: Arc<IoInner>, id: WorkerId, first: Task) {
    task::run(first);
    loop {
        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }
        let (tx, rx) = bounded::<Task>(1);
        inner.idle.lock().push(IdleWorker { id, handoff: tx });
        match rx.recv_timeout(inner.keep_alive) {
            Ok(work) => task::run(work),
            Err(RecvTimeoutError::Timeout) => {
                let retired = {
                    let mut idle = inner.idle.lock();
                    match idle.iter().position(|w| w.id == id) {
                        Some(pos) => {
                            idle.swap_remove(pos);
                            true
                        }
                        None => false,
                    }
                };
                if retired {
                    break;
                }
                match rx.recv() {
                    Ok(work) => task::run(work),
                    Err(_) => break,
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    inner.live.fetch_sub(1, Ordering::AcqRel);
    metrics::record("io", WorkerEvent::Retired(id));
}

impl Scheduler for IoPool {
    fn schedule(&self, work: Task) -> Result<Arc<dyn Disposable>> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(FlowError::Rejected("io pool is shut down".into()));
        }
        let (mut work, handle) = task::guarded(work);
        loop {
            let claimed = self.inner.idle.lock().pop();
            match claimed {
                Some(worker) => match worker.handoff.send(work) {
                    Ok(()) => return Ok(handle),
                    // Released by shutdown between pop and send; try the next one.
                    Err(returned) => work = returned.into_inner(),
                },
                None => {
                    self.spawn_worker(work)?;
                    return Ok(handle);
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "io"
    }
}

impl Drop for IoPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
