//! Worker lifecycle events.
//!
//! Counters are process-wide and always on; the tracing output is behind the
//! `tracing` feature. Wire the events to a subscriber in the binary layer.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use rivulet_core::id::WorkerId;

#[derive(Debug, Clone)]
pub enum WorkerEvent {
    PoolStarted { threads: usize },
    Spawned(WorkerId),
    SpawnFailed(String),
    Retired(WorkerId),
}

impl fmt::Display for WorkerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerEvent::PoolStarted { threads } => write!(f, "pool_started threads={threads}"),
            WorkerEvent::Spawned(id) => write!(f, "worker_spawned {id}"),
            WorkerEvent::SpawnFailed(e) => write!(f, "worker_spawn_failed: {e}"),
            WorkerEvent::Retired(id) => write!(f, "worker_retired {id}"),
        }
    }
}

/// Totals since process start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerCounts {
    pub spawned: u64,
    pub retired: u64,
    pub spawn_failures: u64,
}

static SPAWNED: AtomicU64 = AtomicU64::new(0);
static RETIRED: AtomicU64 = AtomicU64::new(0);
static SPAWN_FAILURES: AtomicU64 = AtomicU64::new(0);

pub fn record(scheduler: &'static str, event: WorkerEvent) {
    match &event {
        WorkerEvent::Spawned(_) => {
            SPAWNED.fetch_add(1, Ordering::Relaxed);
        }
        WorkerEvent::Retired(_) => {
            RETIRED.fetch_add(1, Ordering::Relaxed);
        }
        WorkerEvent::SpawnFailed(_) => {
            SPAWN_FAILURES.fetch_add(1, Ordering::Relaxed);
        }
        WorkerEvent::PoolStarted { .. } => {}
    }
    emit(scheduler, &event);
}

pub fn counts() -> WorkerCounts {
    WorkerCounts {
        spawned: SPAWNED.load(Ordering::Relaxed),
        retired: RETIRED.load(Ordering::Relaxed),
        spawn_failures: SPAWN_FAILURES.load(Ordering::Relaxed),
    }
}

#[cfg(feature = "tracing")]
fn emit(scheduler: &'static str, event: &WorkerEvent) {
    match event {
        WorkerEvent::SpawnFailed(_) => tracing::warn!(scheduler, %event, "sched"),
        _ => tracing::trace!(scheduler, %event, "sched"),
    }
}

#[cfg(not(feature = "tracing"))]
fn emit(_scheduler: &'static str, _event: &WorkerEvent) { /* no-op */
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_only_grow() {
        let before = counts();
        record("test", WorkerEvent::Spawned(WorkerId::next()));
        record("test", WorkerEvent::Retired(WorkerId::next()));
        record("test", WorkerEvent::PoolStarted { threads: 2 });
        let after = counts();
        assert!(after.spawned > before.spawned);
        assert!(after.retired > before.retired);
        assert!(after.spawn_failures >= before.spawn_failures);
    }
}
