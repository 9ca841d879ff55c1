#![forbid(unsafe_code)]
//! rivulet-buffer: the bounded handoff buffer.
//!
//! Sits between a producer and a consumer that may run on different
//! schedulers. A FIFO of slots absorbs the rate mismatch under one of the
//! overflow policies; a serialized drain loop delivers to the consumer as its
//! demand allows; in prefetch mode the buffer replenishes upstream demand in
//! batches instead of once per item.
//!
//! The queue and terminal marker are the only state shared across execution
//! contexts. They live under one mutex that is never held while calling a
//! subscriber.

pub mod handoff;
pub mod queue;
pub mod tracking;

pub use handoff::{BufferConfig, BufferInlet, DrainMode, HandoffBuffer, UpstreamDemand};
pub use queue::{Offer, SlotQueue};
pub use tracking::PeakTracker;
