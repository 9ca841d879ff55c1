#![forbid(unsafe_code)]
//! rivulet-core: protocol types shared by every rivulet crate.
//!
//! This crate holds the *contracts*: signals, demand accounting, the
//! subscription/subscriber pair, disposables, overflow policies, configuration
//! and the abstract `Scheduler` interface. Concrete schedulers live in
//! `rivulet-sched`, the handoff buffer in `rivulet-buffer`.
//!
//! No threads are spawned here.

pub mod config;
pub mod demand;
pub mod disposable;
pub mod error;
pub mod id;
pub mod policy;
pub mod prelude;
pub mod scheduler;
pub mod signal;
pub mod subscription;

pub use config::FlowConfig;
pub use demand::{Demand, UNBOUNDED};
pub use error::{FlowError, Result};
pub use policy::OverflowPolicy;
pub use signal::{Signal, Terminal};
pub use subscription::{Subscriber, Subscription};
