//! `subscribe_on`: perform the upstream subscription on a scheduler.
//!
//! The downstream subscriber gets a `DeferredSubscription` immediately, on
//! the caller's thread. The upstream `subscribe` call, and with it any
//! producer work a `create` callback does inline, runs as a task on the
//! scheduler. Signals then arrive on whatever thread the upstream emits from.

use std::sync::Arc;

use parking_lot::Mutex;

use rivulet_core::error::FlowError;
use rivulet_core::scheduler::Scheduler;
use rivulet_core::subscription::{Subscriber, Subscription};

use crate::deferred::DeferredSubscription;
use crate::flowable::Publisher;

pub(crate) struct SubscribeOnPublisher<T> {
    source: Arc<dyn Publisher<T>>,
    scheduler: Arc<dyn Scheduler>,
}

impl<T> SubscribeOnPublisher<T> {
    pub(crate) fn new(source: Arc<dyn Publisher<T>>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self { source, scheduler }
    }
}

impl<T: Send + 'static> Publisher<T> for SubscribeOnPublisher<T> {
    fn subscribe(&self, mut subscriber: Box<dyn Subscriber<T>>) {
        let deferred = Arc::new(DeferredSubscription::new());
        let handle: Arc<dyn Subscription> = Arc::clone(&deferred) as Arc<dyn Subscription>;
        subscriber.on_subscribe(handle);

        // Shared so a rejected task can hand the subscriber back for on_error.
        let slot = Arc::new(Mutex::new(Some(subscriber)));
        let task_slot = Arc::clone(&slot);
        let task_deferred = Arc::clone(&deferred);
        let source = Arc::clone(&self.source);

        let scheduled = self.scheduler.schedule(Box::new(move || {
            let Some(downstream) = task_slot.lock().take() else {
                return;
            };
            if task_deferred.is_cancelled() {
                return;
            }
            source.subscribe(Box::new(DeferredInlet {
                downstream,
                deferred: task_deferred,
            }));
        }));

        match scheduled {
            Ok(work) => deferred.set_pending_work(work),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(scheduler = self.scheduler.name(), error = %e, "subscribe_on task rejected");
                if let Some(mut downstream) = slot.lock().take() {
                    downstream.on_error(e);
                }
            }
        }
    }
}

/// Forwards upstream signals unchanged, routing the upstream subscription
/// into the downstream's deferred handle.
struct DeferredInlet<T> {
    downstream: Box<dyn Subscriber<T>>,
    deferred: Arc<DeferredSubscription>,
}

impl<T: Send + 'static> Subscriber<T> for DeferredInlet<T> {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        self.deferred.set_upstream(subscription);
    }

    fn on_next(&mut self, item: T) {
        self.downstream.on_next(item);
    }

    fn on_error(&mut self, error: FlowError) {
        self.downstream.on_error(error);
    }

    fn on_complete(&mut self) {
        self.downstream.on_complete();
    }
}
