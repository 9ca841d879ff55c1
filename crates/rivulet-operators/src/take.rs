//! `take(n)`: pass the first `n` items, then cancel upstream and complete.

use std::sync::Arc;

use rivulet_core::error::FlowError;
use rivulet_core::subscription::{EmptySubscription, Subscriber, Subscription};
use rivulet_flow::Publisher;

pub(crate) struct TakePublisher<T> {
    source: Arc<dyn Publisher<T>>,
    limit: u64,
}

impl<T> TakePublisher<T> {
    pub(crate) fn new(source: Arc<dyn Publisher<T>>, limit: u64) -> Self {
        Self { source, limit }
    }
}

impl<T: Send + 'static> Publisher<T> for TakePublisher<T> {
    fn subscribe(&self, mut subscriber: Box<dyn Subscriber<T>>) {
        if self.limit == 0 {
            subscriber.on_subscribe(EmptySubscription::shared());
            subscriber.on_complete();
            return;
        }
        self.source.subscribe(Box::new(TakeSubscriber {
            downstream: subscriber,
            remaining: self.limit,
            upstream: None,
            done: false,
        }));
    }
}

struct TakeSubscriber<T> {
    downstream: Box<dyn Subscriber<T>>,
    remaining: u64,
    upstream: Option<Arc<dyn Subscription>>,
    done: bool,
}

impl<T: Send + 'static> Subscriber<T> for TakeSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        self.upstream = Some(Arc::clone(&subscription));
        self.downstream.on_subscribe(subscription);
    }

    fn on_next(&mut self, item: T) {
        if self.done {
            return;
        }
        self.remaining -= 1;
        self.downstream.on_next(item);
        if self.remaining == 0 {
            self.done = true;
            if let Some(up) = self.upstream.take() {
                up.cancel();
            }
            self.downstream.on_complete();
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
