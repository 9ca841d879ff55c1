//! `observe_on`: deliver downstream signals on a scheduler.
//!
//! A handoff buffer in prefetch mode sits between the upstream and the
//! subscriber. The upstream fills it on its own thread; the buffer's drain
//! loop runs as scheduler tasks and replenishes upstream demand in batches.

use std::sync::Arc;

use rivulet_buffer::{BufferConfig, BufferInlet, HandoffBuffer};
use rivulet_core::config::FlowConfig;
use rivulet_core::policy::OverflowPolicy;
use rivulet_core::scheduler::Scheduler;
use rivulet_core::subscription::Subscriber;

use crate::flowable::Publisher;

pub(crate) struct ObserveOnPublisher<T> {
    source: Arc<dyn Publisher<T>>,
    scheduler: Arc<dyn Scheduler>,
    policy: OverflowPolicy,
    capacity: usize,
    config: FlowConfig,
}

impl<T> ObserveOnPublisher<T> {
    pub(crate) fn new(
        source: Arc<dyn Publisher<T>>,
        scheduler: Arc<dyn Scheduler>,
        policy: OverflowPolicy,
        capacity: usize,
        config: FlowConfig,
    ) -> Self {
        Self {
            source,
            scheduler,
            policy,
            capacity,
            config,
        }
    }
}

impl<T: Send + 'static> Publisher<T> for ObserveOnPublisher<T> {
    fn subscribe(&self, subscriber: Box<dyn Subscriber<T>>) {
        let buffer = HandoffBuffer::new(BufferConfig::hand_off(
            Arc::clone(&self.scheduler),
            self.policy,
            self.capacity,
            &self.config,
        ));
        #[cfg(feature = "tracing")]
        tracing::trace!(stage = %buffer.id(), scheduler = self.scheduler.name(), capacity = self.capacity, "observe_on attached");
        buffer.attach(subscriber);
        // Cancelled from on_subscribe, or the drain scheduler already refused.
        if buffer.is_cancelled() || buffer.is_done() {
            return;
        }
        self.source.subscribe(Box::new(BufferInlet::new(buffer)));
    }
}
