#![forbid(unsafe_code)]
//! rivulet-sched: the concrete execution contexts behind `rivulet_core::Scheduler`.
//!
//! Five variants with distinct physical semantics:
//! - `NewWorker`: a fresh thread per task.
//! - `IoPool`: cached, growable pool for blocking work.
//! - `ComputePool`: fixed pool sized to the available processors.
//! - `SingleWorker`: one persistent thread, strict FIFO.
//! - `Trampoline`: the calling thread, with nested submissions queued
//!   instead of recursed.
//!
//! Process-wide instances are reachable through `SchedulerKind` /
//! `Schedulers`; private instances can be built and shut down explicitly.

pub mod compute;
pub mod io_pool;
pub mod metrics;
pub mod new_thread;
pub mod registry;
pub mod single;
pub mod task;
pub mod trampoline;

pub use compute::ComputePool;
pub use io_pool::IoPool;
pub use new_thread::NewWorker;
pub use registry::{SchedulerHandle, SchedulerKind, Schedulers};
pub use single::SingleWorker;
pub use trampoline::Trampoline;
