//! Process-wide scheduler instances and the selection surface used by
//! pipeline operators.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use rivulet_core::config::FlowConfig;
use rivulet_core::error::FlowError;
use rivulet_core::scheduler::Scheduler;

use crate::compute::ComputePool;
use crate::io_pool::IoPool;
use crate::new_thread::NewWorker;
use crate::single::SingleWorker;
use crate::trampoline::Trampoline;

static NEW_WORKER: Lazy<Arc<NewWorker>> =
    Lazy::new(|| Arc::new(NewWorker::new(FlowConfig::global().thread_name_prefix.clone())));
static IO: Lazy<Arc<IoPool>> = Lazy::new(|| Arc::new(IoPool::from_config(FlowConfig::global())));
static COMPUTE: Lazy<Arc<ComputePool>> =
    Lazy::new(|| Arc::new(ComputePool::from_config(FlowConfig::global())));
static SINGLE: Lazy<Arc<SingleWorker>> =
    Lazy::new(|| Arc::new(SingleWorker::from_config(FlowConfig::global())));

/// The five scheduler variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    NewWorker,
    IoPool,
    ComputePool,
    SingleWorker,
    Trampoline,
}

impl SchedulerKind {
    /// The shared instance for this variant, created on first use.
    pub fn get(self) -> Arc<dyn Scheduler> {
        match self {
            SchedulerKind::NewWorker => Schedulers::new_thread(),
            SchedulerKind::IoPool => Schedulers::io(),
            SchedulerKind::ComputePool => Schedulers::computation(),
            SchedulerKind::SingleWorker => Schedulers::single(),
            SchedulerKind::Trampoline => Schedulers::trampoline(),
        }
    }
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchedulerKind::NewWorker => "new_worker",
            SchedulerKind::IoPool => "io",
            SchedulerKind::ComputePool => "compute",
            SchedulerKind::SingleWorker => "single",
            SchedulerKind::Trampoline => "trampoline",
        };
        f.write_str(s)
    }
}

impl FromStr for SchedulerKind {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new_worker" | "new_thread" => Ok(SchedulerKind::NewWorker),
            "io" => Ok(SchedulerKind::IoPool),
            "compute" | "computation" => Ok(SchedulerKind::ComputePool),
            "single" => Ok(SchedulerKind::SingleWorker),
            "trampoline" => Ok(SchedulerKind::Trampoline),
            other => Err(FlowError::Config(format!("unknown scheduler '{}'", other))),
        }
    }
}

/// Accessors for the shared instances.
pub struct Schedulers;

impl Schedulers {
    pub fn new_thread() -> Arc<dyn Scheduler> {
        let worker: Arc<NewWorker> = Arc::clone(&NEW_WORKER);
        worker
    }

    pub fn io() -> Arc<dyn Scheduler> {
        let pool: Arc<IoPool> = Arc::clone(&IO);
        pool
    }

    pub fn computation() -> Arc<dyn Scheduler> {
        let pool: Arc<ComputePool> = Arc::clone(&COMPUTE);
        pool
    }

    pub fn single() -> Arc<dyn Scheduler> {
        let worker: Arc<SingleWorker> = Arc::clone(&SINGLE);
        worker
    }

    pub fn trampoline() -> Arc<dyn Scheduler> {
        Arc::new(Trampoline)
    }
}

/// Anything a pipeline operator accepts as "run on scheduler S".
#[derive(Clone)]
pub struct SchedulerHandle(Arc<dyn Scheduler>);

impl SchedulerHandle {
    pub fn new(scheduler: impl Scheduler) -> Self {
        Self(Arc::new(scheduler))
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.0
    }

    pub fn into_inner(self) -> Arc<dyn Scheduler> {
        self.0
    }
}

impl fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SchedulerHandle").field(&self.0.name()).finish()
    }
}

impl From<SchedulerKind> for SchedulerHandle {
    fn from(kind: SchedulerKind) -> Self {
        Self(kind.get())
    }
}

impl From<Arc<dyn Scheduler>> for SchedulerHandle {
    fn from(s: Arc<dyn Scheduler>) -> Self {
        Self(s)
    }
}
