//! `map` / `try_map`: one output per input, demand forwarded 1:1.

use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use rivulet_core::error::FlowError;
use rivulet_core::subscription::{Subscriber, Subscription};
use rivulet_flow::Publisher;

pub(crate) struct MapPublisher<T, U, F> {
    source: Arc<dyn Publisher<T>>,
    f: Arc<F>,
    _marker: PhantomData<fn() -> U>,
}

impl<T, U, F> MapPublisher<T, U, F> {
    pub(crate) fn new(source: Arc<dyn Publisher<T>>, f: F) -> Self {
        Self {
            source,
            f: Arc::new(f),
            _marker: PhantomData,
        }
    }
}

impl<T, U, F> Publisher<U> for MapPublisher<T, U, F>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> Result<U, FlowError> + Send + Sync + 'static,
{
    fn subscribe(&self, subscriber: Box<dyn Subscriber<U>>) {
        self.source.subscribe(Box::new(MapSubscriber {
            downstream: subscriber,
            f: Arc::clone(&self.f),
            upstream: None,
            done: false,
            _marker: PhantomData,
        }));
    }
}

struct MapSubscriber<T, U, F> {
    downstream: Box<dyn Subscriber<U>>,
    f: Arc<F>,
    upstream: Option<Arc<dyn Subscription>>,
    done: bool,
    _marker: PhantomData<fn(T)>,
}

impl<T, U, F> MapSubscriber<T, U, F> {
    fn fail(&mut self, error: FlowError) {
        self.done = true;
        #[cfg(feature = "tracing")]
        tracing::debug!(%error, "map callback failed; cancelling upstream");
        if let Some(up) = self.upstream.take() {
            up.cancel();
        }
        self.downstream.on_error(error);
    }
}

impl<T, U, F> Subscriber<T> for MapSubscriber<T, U, F>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> Result<U, FlowError> + Send + Sync + 'static,
{
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        self.upstream = Some(Arc::clone(&subscription));
        self.downstream.on_subscribe(subscription);
    }

    fn on_next(&mut self, item: T) {
        if self.done {
            return;
        }
        let f = &*self.f;
        match catch_unwind(AssertUnwindSafe(|| f(item))) {
            Ok(Ok(mapped)) => self.downstream.on_next(mapped),
            Ok(Err(e)) => self.fail(e),
            Err(payload) => self.fail(FlowError::from_panic(payload)),
        }
    }

    fn on_error(&mut self, error: FlowError) {
        if !self.done {
            self.done = true;
            self.downstream.on_error(error);
        }
    }

    fn on_complete(&mut self) {
        if !self.done {
            self.done = true;
            self.downstream.on_complete();
        }
    }
}
