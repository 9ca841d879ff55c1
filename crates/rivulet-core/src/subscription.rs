//! The demand channel (`Subscription`) and the consumer contract (`Subscriber`).
//!
//! A producer hands the consumer an `Arc<dyn Subscription>` in `on_subscribe`,
//! synchronously and before any other signal. The consumer then authorizes
//! emission with `request(n)` and may `cancel()` at any point, including from
//! inside `on_next`.

use std::sync::Arc;

use crate::error::{FlowError, Result};
use crate::signal::Signal;

/// Consumer-to-producer control channel.
pub trait Subscription: Send + Sync {
    /// Authorize `n` more `Next` signals. Demand is additive and saturates at
    /// `UNBOUNDED`. `n == 0` is a protocol violation reported here and never
    /// forwarded to the producer.
    fn request(&self, n: u64) -> Result<()>;

    /// Stop the stream. Idempotent; no signal reaches the consumer after the
    /// producer observes it.
    fn cancel(&self);
}

/// Consumer contract. Calls are serialized by the producing stage: a
/// subscriber never sees two callbacks at once.
pub trait Subscriber<T>: Send {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>);
    fn on_next(&mut self, item: T);
    fn on_error(&mut self, error: FlowError);
    fn on_complete(&mut self);

    /// Dispatch a reified signal to the matching callback.
    fn on_signal(&mut self, signal: Signal<T>) {
        match signal {
            Signal::Next(item) => self.on_next(item),
            Signal::Error(e) => self.on_error(e),
            Signal::Complete => self.on_complete(),
        }
    }
}

impl<T, S> Subscriber<T> for Box<S>
where
    S: Subscriber<T> + ?Sized,
{
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        (**self).on_subscribe(subscription)
    }
    fn on_next(&mut self, item: T) {
        (**self).on_next(item)
    }
    fn on_error(&mut self, error: FlowError) {
        (**self).on_error(error)
    }
    fn on_complete(&mut self) {
        (**self).on_complete()
    }
}

/// Subscription with nothing behind it, handed out by streams that terminate
/// immediately (empty/error sources). Still validates requests.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptySubscription;

impl Subscription for EmptySubscription {
    fn request(&self, n: u64) -> Result<()> {
        if n == 0 {
            return Err(FlowError::InvalidRequest { requested: n });
        }
        Ok(())
    }

    fn cancel(&self) {}
}

impl EmptySubscription {
    pub fn shared() -> Arc<dyn Subscription> {
        Arc::new(EmptySubscription)
    }
}
