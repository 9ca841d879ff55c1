//! `concat`: subscribe to each source only after the previous one completed.
//!
//! Demand the downstream requested but the finished source did not fulfil is
//! carried to the next source through the `Arbiter`. An error from any source
//! ends the whole chain. Synchronous sources that complete inside `subscribe`
//! are chained iteratively (the `wip` counter), not recursively.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use rivulet_core::error::FlowError;
use rivulet_core::subscription::{Subscriber, Subscription};
use rivulet_flow::{Flowable, Publisher};

use crate::arbiter::Arbiter;

/// Concatenate `sources` in order.
pub fn concat<T, I>(sources: I) -> Flowable<T>
where
    T: Send + 'static,
    I: IntoIterator<Item = Flowable<T>>,
{
    let sources = sources
        .into_iter()
        .map(|f| Arc::clone(f.publisher()))
        .collect();
    Flowable::from_publisher(ConcatPublisher { sources })
}

struct ConcatPublisher<T> {
    sources: Arc<[Arc<dyn Publisher<T>>]>,
}

impl<T: Send + 'static> Publisher<T> for ConcatPublisher<T> {
    fn subscribe(&self, mut subscriber: Box<dyn Subscriber<T>>) {
        let arbiter = Arc::new(Arbiter::new());
        let handle: Arc<dyn Subscription> = Arc::clone(&arbiter) as Arc<dyn Subscription>;
        subscriber.on_subscribe(handle);

        let core = Arc::new(ConcatCore {
            sources: Arc::clone(&self.sources),
            next_index: AtomicUsize::new(0),
            wip: AtomicUsize::new(0),
            arbiter,
            downstream: Mutex::new(Some(subscriber)),
        });
        core.subscribe_next();
    }
}

struct ConcatCore<T> {
    sources: Arc<[Arc<dyn Publisher<T>>]>,
    next_index: AtomicUsize,
    wip: AtomicUsize,
    arbiter: Arc<Arbiter>,
    downstream: Mutex<Option<Box<dyn Subscriber<T>>>>,
}

impl<T: Send + 'static> ConcatCore<T> {
    fn subscribe_next(self: &Arc<Self>) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        loop {
            if self.arbiter.is_cancelled() {
                self.downstream.lock().take();
                return;
            }
            let index = self.next_index.fetch_add(1, Ordering::AcqRel);
            match self.sources.get(index) {
                Some(source) => {
                    self.arbiter.clear();
                    source.subscribe(Box::new(ConcatInner {
                        core: Arc::clone(self),
                    }));
                }
                None => {
                    let downstream = self.downstream.lock().take();
                    if let Some(mut sub) = downstream {
                        sub.on_complete();
                    }
                    return;
                }
            }
            if self.wip.fetch_sub(1, Ordering::AcqRel) == 1 {
                return;
            }
        }
    }
}

struct ConcatInner<T> {
    core: Arc<ConcatCore<T>>,
}

impl<T: Send + 'static> Subscriber<T> for ConcatInner<T> {
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
        let downstream = self.core.downstream.lock().take();
        if let Some(mut sub) = downstream {
            sub.on_error(error);
        }
    }

    fn on_complete(&mut self) {
        self.core.subscribe_next();
    }
}
