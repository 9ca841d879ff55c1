//! `flat_map`: map every item to an inner `Flowable` and merge the inners.
//!
//! Shares the merge core. The outer source is asked for `prefetch` items up
//! front, which caps how many inners run at once; each completed inner asks
//! the outer for one more.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use rivulet_core::config::FlowConfig;
use rivulet_core::error::FlowError;
use rivulet_core::subscription::{Subscriber, Subscription};
use rivulet_flow::{Flowable, Publisher};

use crate::merge::{MergeCore, MergeInner};

pub(crate) struct FlatMapPublisher<T, F> {
    source: Arc<dyn Publisher<T>>,
    mapper: Arc<F>,
    prefetch: usize,
    threshold: usize,
}

impl<T, F> FlatMapPublisher<T, F> {
    pub(crate) fn new(source: Arc<dyn Publisher<T>>, mapper: F) -> Self {
        let cfg = FlowConfig::global();
        Self {
            source,
            mapper: Arc::new(mapper),
            prefetch: cfg.buffer_capacity,
            threshold: cfg.threshold_for(cfg.buffer_capacity),
        }
    }
}

impl<T, U, F> Publisher<U> for FlatMapPublisher<T, F>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> Flowable<U> + Send + Sync + 'static,
{
    fn subscribe(&self, subscriber: Box<dyn Subscriber<U>>) {
        // The outer source is the one active member until it completes.
        let core = MergeCore::start(subscriber, 1, self.prefetch, self.threshold);
        if core.is_finished() {
            return;
        }
        self.source.subscribe(Box::new(OuterSubscriber {
            core,
            mapper: Arc::clone(&self.mapper),
            next_index: 0,
            failed: false,
        }));
    }
}

struct OuterSubscriber<U, F> {
    core: Arc<MergeCore<U>>,
    mapper: Arc<F>,
    next_index: usize,
    failed: bool,
}

impl<T, U, F> Subscriber<T> for OuterSubscriber<U, F>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> Flowable<U> + Send + Sync + 'static,
{
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        if self.core.set_outer(Arc::clone(&subscription)) {
            let _ = subscription.request(self.core.prefetch());
        }
    }

    fn on_next(&mut self, item: T) {
        if self.failed || self.core.is_finished() {
            return;
        }
        let mapper = &*self.mapper;
        let inner = match catch_unwind(AssertUnwindSafe(|| mapper(item))) {
            Ok(inner) => inner,
            Err(payload) => {
                self.failed = true;
                let cause = FlowError::from_panic(payload);
                #[cfg(feature = "tracing")]
                tracing::debug!(%cause, "flat_map mapper panicked");
                self.core.inner_error(cause);
                return;
            }
        };
        let index = self.next_index;
        self.next_index += 1;
        self.core.add_active();
        inner.subscribe_boxed(Box::new(MergeInner {
            core: Arc::clone(&self.core),
            index,
        }));
    }

    fn on_error(&mut self, error: FlowError) {
        if !self.failed {
            self.core.inner_error(error);
        }
    }

    fn on_complete(&mut self) {
        if !self.failed {
            self.core.outer_complete();
        }
    }
}
