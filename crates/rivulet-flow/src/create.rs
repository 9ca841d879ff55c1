//! `Flowable::create`: bridge a push-style producer into the demand protocol.

use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use rivulet_buffer::{BufferConfig, HandoffBuffer, Offer};
use rivulet_core::config::FlowConfig;
use rivulet_core::disposable::{ActionDisposable, Disposable};
use rivulet_core::error::FlowError;
use rivulet_core::policy::OverflowPolicy;
use rivulet_core::signal::Terminal;
use rivulet_core::subscription::Subscriber;

use crate::flowable::Publisher;

/// Producer handle passed to a `create` callback.
///
/// Cheap to clone; clones feed the same subscription. Calls after a terminal
/// signal or cancellation are ignored.
pub struct Emitter<T> {
    buffer: Arc<HandoffBuffer<T>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

impl<T: Send + 'static> Emitter<T> {
    /// Emit one item. Delivered immediately if the subscriber has demand,
    /// otherwise queued under the stream's overflow policy.
    pub fn next(&self, item: T) -> Offer {
        self.buffer.push(item)
    }

    pub fn error(&self, error: FlowError) {
        self.buffer.terminate(Terminal::Error(error));
    }

    pub fn complete(&self) {
        self.buffer.terminate(Terminal::Complete);
    }

    /// Items the subscriber has requested and that are not already queued.
    pub fn current_demand(&self) -> u64 {
        self.buffer.producer_demand()
    }

    /// Register cleanup to run when the subscriber cancels or the stream
    /// terminates. A later registration replaces (and runs) the earlier one.
    pub fn on_cancel(&self, cleanup: impl FnOnce() + Send + 'static) {
        let action: Arc<dyn Disposable> = Arc::new(ActionDisposable::new(cleanup));
        self.buffer.set_cleanup(action);
    }

    /// Same as `on_cancel`, taking an existing resource handle.
    pub fn set_disposable(&self, resource: Arc<dyn Disposable>) {
        self.buffer.set_cleanup(resource);
    }

    pub fn is_cancelled(&self) -> bool {
        self.buffer.is_cancelled()
    }

    /// Block the producing thread until the subscriber has demand. Returns
    /// false if the subscription was cancelled or terminated meanwhile.
    ///
    /// Only for producers that own their thread (`subscribe_on` with an I/O
    /// or new-thread scheduler); on a shared worker it stalls everything else.
    pub fn await_demand(&self) -> bool {
        self.buffer.await_demand()
    }
}

pub(crate) struct CreatePublisher<T, F> {
    source: F,
    policy: OverflowPolicy,
    config: FlowConfig,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> CreatePublisher<T, F> {
    pub(crate) fn new(source: F, policy: OverflowPolicy, config: FlowConfig) -> Self {
        Self {
            source,
            policy,
            config,
            _marker: PhantomData,
        }
    }
}

impl<T, F> Publisher<T> for CreatePublisher<T, F>
where
    T: Send + 'static,
    F: Fn(Emitter<T>) + Send + Sync + 'static,
{
    fn subscribe(&self, subscriber: Box<dyn Subscriber<T>>) {
        let buffer = HandoffBuffer::new(BufferConfig::emitter(self.policy, &self.config));
        buffer.attach(subscriber);
        if buffer.is_cancelled() {
            return;
        }
        let emitter = Emitter {
            buffer: Arc::clone(&buffer),
        };
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| (self.source)(emitter))) {
            let cause = FlowError::from_panic(payload);
            #[cfg(feature = "tracing")]
            tracing::debug!(stage = %buffer.id(), %cause, "create callback panicked");
            buffer.terminate(Terminal::Error(cause));
        }
    }
}
