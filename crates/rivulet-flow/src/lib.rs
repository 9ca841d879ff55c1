#![forbid(unsafe_code)]
//! rivulet-flow: the `Flowable` surface.
//!
//! A `Flowable<T>` is a cold, cloneable description of a stream. Nothing runs
//! until `subscribe`; every subscription builds a fresh chain of stages.
//!
//! - `create` bridges push-style producers through an `Emitter` and a handoff
//!   buffer with the chosen overflow policy.
//! - `range`/`from_iter`/`just`/`empty`/`error` are pull-based sources that
//!   emit exactly as much as was requested.
//! - `subscribe_on` moves subscribe-time work to a scheduler; `observe_on`
//!   moves delivery to one.
//! - `on_backpressure_*` absorb an over-eager upstream under a policy.

pub mod backpressure;
pub mod create;
pub mod deferred;
pub mod flowable;
pub mod lambda;
pub mod observe_on;
pub mod sources;
pub mod subscribe_on;

pub use create::Emitter;
pub use deferred::DeferredSubscription;
pub use flowable::{Flowable, Publisher};
pub use lambda::LambdaSubscriber;
