//! `on_backpressure_*`: request everything from upstream and let a buffer
//! policy decide what happens to items the subscriber has not asked for.
//!
//! Because these stages request unbounded demand, an upstream `create` with
//! `OverflowPolicy::Missing` never reaches its fallback: overflow handling is
//! entirely this stage's.

use std::sync::Arc;

use rivulet_buffer::{BufferConfig, BufferInlet, HandoffBuffer};
use rivulet_core::config::FlowConfig;
use rivulet_core::policy::OverflowPolicy;
use rivulet_core::subscription::Subscriber;

use crate::flowable::Publisher;

pub(crate) struct BackpressurePublisher<T> {
    source: Arc<dyn Publisher<T>>,
    policy: OverflowPolicy,
    config: FlowConfig,
}

impl<T> BackpressurePublisher<T> {
    pub(crate) fn new(source: Arc<dyn Publisher<T>>, policy: OverflowPolicy, config: FlowConfig) -> Self {
        Self {
            source,
            policy,
            config,
        }
    }
}

impl<T: Send + 'static> Publisher<T> for BackpressurePublisher<T> {
    fn subscribe(&self, subscriber: Box<dyn Subscriber<T>>) {
        let buffer = HandoffBuffer::new(BufferConfig::absorbing(self.policy, &self.config));
        buffer.attach(subscriber);
        if buffer.is_cancelled() {
            return;
        }
        self.source.subscribe(Box::new(BufferInlet::new(buffer)));
    }
}
