#![forbid(unsafe_code)]
//! rivulet: push-based reactive streams with demand-driven backpressure.
//!
//! This crate re-exports the workspace members under one roof:
//! - `protocol`: signals, demand, subscriptions, disposables, policies, config.
//! - `sched`: the five schedulers.
//! - `buffer`: the bounded handoff buffer.
//! - `flow`: `Flowable`, `Emitter`, `subscribe_on`/`observe_on`.
//! - `operators`: `map`, `filter`, `merge`, `concat` and friends.
//!
//! ```no_run
//! use rivulet::prelude::*;
//!
//! let handle = Flowable::range(0, 10)
//!     .filter(|x| x % 3 == 0)
//!     .observe_on(SchedulerKind::ComputePool)
//!     .subscribe_fn(|x| println!("{x}"), |e| eprintln!("{e}"), || println!("done"));
//! handle.dispose();
//! ```

pub use rivulet_buffer as buffer;
pub use rivulet_core as protocol;
pub use rivulet_flow as flow;
pub use rivulet_operators as operators;
pub use rivulet_sched as sched;

pub mod prelude {
    pub use rivulet_core::prelude::*;
    pub use rivulet_flow::{Emitter, Flowable, Publisher};
    pub use rivulet_operators::{concat, merge, FlowableExt};
    pub use rivulet_sched::{SchedulerHandle, SchedulerKind, Schedulers};
}
