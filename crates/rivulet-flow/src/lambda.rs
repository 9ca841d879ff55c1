//! Closure-backed subscriber used by `Flowable::subscribe_fn`.

use std::sync::Arc;

use rivulet_core::demand::UNBOUNDED;
use rivulet_core::disposable::{ActionDisposable, Disposable, SwapDisposable};
use rivulet_core::error::FlowError;
use rivulet_core::subscription::{Subscriber, Subscription};

/// Requests unbounded demand on subscribe and forwards signals to closures.
pub struct LambdaSubscriber<N, E, C> {
    on_next: N,
    on_error: Option<E>,
    on_complete: Option<C>,
    handle: Arc<SwapDisposable>,
}

impl<N, E, C> LambdaSubscriber<N, E, C> {
    pub fn new(on_next: N, on_error: E, on_complete: C) -> Self {
        Self {
            on_next,
            on_error: Some(on_error),
            on_complete: Some(on_complete),
            handle: Arc::new(SwapDisposable::new()),
        }
    }

    /// Disposing the handle cancels the subscription, now or as soon as it
    /// arrives.
    pub fn handle(&self) -> Arc<dyn Disposable> {
        let handle: Arc<SwapDisposable> = Arc::clone(&self.handle);
        handle
    }
}

impl<T, N, E, C> Subscriber<T> for LambdaSubscriber<N, E, C>
where
    N: FnMut(T) + Send,
    E: FnOnce(FlowError) + Send,
    C: FnOnce() + Send,
{
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        let cancel_target = Arc::clone(&subscription);
        let cancel: Arc<dyn Disposable> = Arc::new(ActionDisposable::new(move || cancel_target.cancel()));
        if self.handle.replace(cancel) {
            let _ = subscription.request(UNBOUNDED);
        }
    }

    fn on_next(&mut self, item: T) {
        if !self.handle.is_disposed() {
            (self.on_next)(item);
        }
    }

    fn on_error(&mut self, error: FlowError) {
        if let Some(f) = self.on_error.take() {
            if !self.handle.is_disposed() {
                f(error);
            }
        }
        self.handle.dispose();
    }

    fn on_complete(&mut self) {
        if let Some(f) = self.on_complete.take() {
            if !self.handle.is_disposed() {
                f();
            }
        }
        self.handle.dispose();
    }
}
