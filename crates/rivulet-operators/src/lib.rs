#![forbid(unsafe_code)]
//! rivulet-operators: stages that transform or combine `Flowable`s.
//!
//! Every operator preserves the demand protocol:
//! - 1:1 stages (`map`, `try_map`) forward requests untouched.
//! - Dropping stages (`filter`, `distinct`) re-request one item upstream per
//!   discarded item, so downstream demand is always eventually met.
//! - Combining stages (`merge`, `flat_map`, `concat`, `zip_with`) and `retry`
//!   own a subscription of their own and account demand across their inner
//!   sources.
//!
//! User callbacks run at the operator boundary under `catch_unwind`; a panic
//! becomes `FlowError::Callback`, cancels upstream and ends the stream.

pub mod arbiter;
pub mod concat;
pub mod filter;
pub mod flat_map;
pub mod map;
pub mod merge;
pub mod retry;
pub mod take;
pub mod traits;
pub mod zip;

pub use concat::concat;
pub use merge::merge;
pub use traits::FlowableExt;
