//! `filter` / `distinct`: drop items, re-requesting one upstream for each
//! dropped item so downstream demand is still met.

use std::collections::HashSet;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use rivulet_core::error::FlowError;
use rivulet_core::subscription::{Subscriber, Subscription};
use rivulet_flow::Publisher;

/// Per-subscription keep/drop decision.
pub(crate) type Predicate<T> = Box<dyn FnMut(&T) -> bool + Send>;

type PredicateFactory<T> = Arc<dyn Fn() -> Predicate<T> + Send + Sync>;

pub(crate) struct FilterPublisher<T> {
    source: Arc<dyn Publisher<T>>,
    make_predicate: PredicateFactory<T>,
}

impl<T: Send + 'static> FilterPublisher<T> {
    /// Stateless predicate shared by every subscription.
    pub(crate) fn new<P>(source: Arc<dyn Publisher<T>>, predicate: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        Self {
            source,
            make_predicate: Arc::new(move || {
                let p = Arc::clone(&predicate);
                Box::new(move |item: &T| p(item)) as Predicate<T>
            }),
        }
    }

    /// Pass each distinct value once; the seen-set is per subscription.
    pub(crate) fn distinct(source: Arc<dyn Publisher<T>>) -> Self
    where
        T: Eq + Hash + Clone,
    {
        Self {
            source,
            make_predicate: Arc::new(|| {
                let mut seen = HashSet::new();
                Box::new(move |item: &T| seen.insert(item.clone())) as Predicate<T>
            }),
        }
    }
}

impl<T: Send + 'static> Publisher<T> for FilterPublisher<T> {
    fn subscribe(&self, subscriber: Box<dyn Subscriber<T>>) {
        self.source.subscribe(Box::new(FilterSubscriber {
            downstream: subscriber,
            predicate: (self.make_predicate)(),
            upstream: None,
            done: false,
        }));
    }
}

struct FilterSubscriber<T> {
    downstream: Box<dyn Subscriber<T>>,
    predicate: Predicate<T>,
    upstream: Option<Arc<dyn Subscription>>,
    done: bool,
}

impl<T> FilterSubscriber<T> {
    fn fail(&mut self, error: FlowError) {
        self.done = true;
        #[cfg(feature = "tracing")]
        tracing::debug!(%error, "filter predicate failed; cancelling upstream");
        if let Some(up) = self.upstream.take() {
            up.cancel();
        }
        self.downstream.on_error(error);
    }
}

impl<T: Send + 'static> Subscriber<T> for FilterSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        self.upstream = Some(Arc::clone(&subscription));
        self.downstream.on_subscribe(subscription);
    }

    fn on_next(&mut self, item: T) {
        if self.done {
            return;
        }
        let predicate = &mut self.predicate;
        match catch_unwind(AssertUnwindSafe(|| predicate(&item))) {
            Ok(true) => self.downstream.on_next(item),
            Ok(false) => {
                if let Some(up) = &self.upstream {
                    let _ = up.request(1);
                }
            }
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
