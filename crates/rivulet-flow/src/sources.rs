//! Pull-based sources: emit exactly what was requested, then park until the
//! next `request`. Nothing spins while demand is zero.

use std::iter::Peekable;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use rivulet_core::demand::Demand;
use rivulet_core::error::{FlowError, Result};
use rivulet_core::subscription::{EmptySubscription, Subscriber, Subscription};

use crate::flowable::Publisher;

pub(crate) struct IterPublisher<I> {
    items: I,
}

impl<I> IterPublisher<I> {
    pub(crate) fn new(items: I) -> Self {
        Self { items }
    }
}

impl<T, I> Publisher<T> for IterPublisher<I>
where
    T: Send + 'static,
    I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
    I::IntoIter: Send + 'static,
{
    fn subscribe(&self, subscriber: Box<dyn Subscriber<T>>) {
        let state = Arc::new(IterSubscription {
            iter: Mutex::new(self.items.clone().into_iter().peekable()),
            demand: Demand::new(),
            wip: AtomicUsize::new(1),
            cancelled: AtomicBool::new(false),
            downstream: Mutex::new(Some(subscriber)),
        });
        {
            let handle: Arc<dyn Subscription> = Arc::clone(&state) as Arc<dyn Subscription>;
            let mut downstream = state.downstream.lock();
            if let Some(sub) = downstream.as_mut() {
                sub.on_subscribe(handle);
            }
        }
        state.drain_loop();
    }
}

struct IterSubscription<T, It: Iterator<Item = T>> {
    iter: Mutex<Peekable<It>>,
    demand: Demand,
    wip: AtomicUsize,
    cancelled: AtomicBool,
    downstream: Mutex<Option<Box<dyn Subscriber<T>>>>,
}

impl<T, It> IterSubscription<T, It>
where
    T: Send + 'static,
    It: Iterator<Item = T> + Send + 'static,
{
    fn signal(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) == 0 {
            self.drain_loop();
        }
    }

    fn drain_loop(&self) {
        let mut missed = 1;
        loop {
            self.emit_ready();
            let prev = self.wip.fetch_sub(missed, Ordering::AcqRel);
            if prev == missed {
                return;
            }
            missed = prev - missed;
        }
    }

    fn emit_ready(&self) {
        let mut downstream = self.downstream.lock();
        loop {
            if self.cancelled.load(Ordering::Acquire) {
                *downstream = None;
                return;
            }
            let Some(sub) = downstream.as_mut() else {
                return;
            };
            let exhausted = self.iter.lock().peek().is_none();
            if exhausted {
                if let Some(mut sub) = downstream.take() {
                    sub.on_complete();
                }
                return;
            }
            if !self.demand.try_consume() {
                return;
            }
            let next = self.iter.lock().next();
            if let Some(item) = next {
                sub.on_next(item);
            }
        }
    }
}

impl<T, It> Subscription for IterSubscription<T, It>
where
    T: Send + 'static,
    It: Iterator<Item = T> + Send + 'static,
{
    fn request(&self, n: u64) -> Result<()> {
        self.demand.add(n)?;
        self.signal();
        Ok(())
    }

    fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            self.signal();
        }
    }
}

pub(crate) struct EmptyPublisher;

impl<T: Send + 'static> Publisher<T> for EmptyPublisher {
    fn subscribe(&self, mut subscriber: Box<dyn Subscriber<T>>) {
        subscriber.on_subscribe(EmptySubscription::shared());
        subscriber.on_complete();
    }
}

pub(crate) struct ErrorPublisher {
    error: FlowError,
}

impl ErrorPublisher {
    pub(crate) fn new(error: FlowError) -> Self {
        Self { error }
    }
}

impl<T: Send + 'static> Publisher<T> for ErrorPublisher {
    fn subscribe(&self, mut subscriber: Box<dyn Subscriber<T>>) {
        subscriber.on_subscribe(EmptySubscription::shared());
        subscriber.on_error(self.error.clone());
    }
}
