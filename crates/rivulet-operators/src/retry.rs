//! `retry(times, predicate)`: resubscribe to the source after an error the
//! predicate accepts, at most `times` times.
//!
//! Items already delivered stay delivered; the new subscription picks up the
//! unfulfilled demand through the `Arbiter`. This is a plain operator layered
//! on the protocol; nothing below it knows about retries.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use rivulet_core::error::FlowError;
use rivulet_core::subscription::{Subscriber, Subscription};
use rivulet_flow::Publisher;

use crate::arbiter::Arbiter;

type RetryPredicate = Arc<dyn Fn(&FlowError) -> bool + Send + Sync>;

pub(crate) struct RetryPublisher<T> {
    source: Arc<dyn Publisher<T>>,
    times: u64,
    predicate: RetryPredicate,
}

impl<T> RetryPublisher<T> {
    pub(crate) fn new(source: Arc<dyn Publisher<T>>, times: u64, predicate: RetryPredicate) -> Self {
        Self {
            source,
            times,
            predicate,
        }
    }
}

impl<T: Send + 'static> Publisher<T> for RetryPublisher<T> {
    fn subscribe(&self, mut subscriber: Box<dyn Subscriber<T>>) {
        let arbiter = Arc::new(Arbiter::new());
        let handle: Arc<dyn Subscription> = Arc::clone(&arbiter) as Arc<dyn Subscription>;
        subscriber.on_subscribe(handle);

        let core = Arc::new(RetryCore {
            source: Arc::clone(&self.source),
            predicate: Arc::clone(&self.predicate),
            remaining: AtomicU64::new(self.times),
            wip: AtomicUsize::new(0),
            arbiter,
            downstream: Mutex::new(Some(subscriber)),
        });
        core.resubscribe();
    }
}

struct RetryCore<T> {
    source: Arc<dyn Publisher<T>>,
    predicate: RetryPredicate,
    remaining: AtomicU64,
    wip: AtomicUsize,
    arbiter: Arc<Arbiter>,
    downstream: Mutex<Option<Box<dyn Subscriber<T>>>>,
}

impl<T: Send + 'static> RetryCore<T> {
    fn resubscribe(self: &Arc<Self>) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        loop {
            if self.arbiter.is_cancelled() {
                self.downstream.lock().take();
                return;
            }
            self.arbiter.clear();
            self.source.subscribe(Box::new(RetryInner {
                core: Arc::clone(self),
            }));
            if self.wip.fetch_sub(1, Ordering::AcqRel) == 1 {
                return;
            }
        }
    }

    /// Consume one retry if the error qualifies.
    fn should_retry(&self, error: &FlowError) -> bool {
        if !(self.predicate)(error) {
            return false;
        }
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

struct RetryInner<T> {
    core: Arc<RetryCore<T>>,
}

impl<T: Send + 'static> Subscriber<T> for RetryInner<T> {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        self.core.arbiter.set(subscription);
    }

    fn on_next(&mut self, item: T) {
        self.core.arbiter.produced();
        if let Some(sub) = self.core.downstream.lock().as_mut() {
            sub.on_next(item);
        }
    }

    fn on_error(&mut self, error: FlowError) {
        if self.core.should_retry(&error) {
            #[cfg(feature = "tracing")]
            tracing::debug!(%error, remaining = self.core.remaining.load(Ordering::Relaxed), "retrying after error");
            self.core.resubscribe();
            return;
        }
        let downstream = self.core.downstream.lock().take();
        if let Some(mut sub) = downstream {
            sub.on_error(error);
        }
    }

    fn on_complete(&mut self) {
        let downstream = self.core.downstream.lock().take();
        if let Some(mut sub) = downstream {
            sub.on_complete();
        }
    }
}
