//! `Publisher` + the `Flowable` handle.

use std::fmt;
use std::sync::Arc;

use rivulet_core::config::FlowConfig;
use rivulet_core::disposable::Disposable;
use rivulet_core::error::FlowError;
use rivulet_core::policy::OverflowPolicy;
use rivulet_core::subscription::Subscriber;
use rivulet_sched::SchedulerHandle;

use crate::backpressure::BackpressurePublisher;
use crate::create::{CreatePublisher, Emitter};
use crate::lambda::LambdaSubscriber;
use crate::observe_on::ObserveOnPublisher;
use crate::sources::{EmptyPublisher, ErrorPublisher, IterPublisher};
use crate::subscribe_on::SubscribeOnPublisher;

/// Producer side of the protocol.
///
/// Invariants for implementors:
/// - `on_subscribe` is called on `subscriber` synchronously, before `subscribe`
///   returns and before any other signal.
/// - At most `requested` `Next` signals, then at most one terminal.
/// - Signals to one subscriber never overlap.
pub trait Publisher<T>: Send + Sync + 'static {
    fn subscribe(&self, subscriber: Box<dyn Subscriber<T>>);
}

/// A cold stream of `T`. Cloning shares the description, not the state.
pub struct Flowable<T> {
    source: Arc<dyn Publisher<T>>,
}

impl<T> Clone for Flowable<T> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<T> fmt::Debug for Flowable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flowable").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Flowable<T> {
    /// Wrap a custom stage. Operator crates build on this.
    pub fn from_publisher(publisher: impl Publisher<T>) -> Self {
        Self {
            source: Arc::new(publisher),
        }
    }

    pub fn from_arc(publisher: Arc<dyn Publisher<T>>) -> Self {
        Self { source: publisher }
    }

    pub fn publisher(&self) -> &Arc<dyn Publisher<T>> {
        &self.source
    }

    /// Push-style source. `source` runs once per subscription, on the
    /// subscribing thread (or the `subscribe_on` scheduler), after the
    /// subscriber has seen `on_subscribe`.
    pub fn create<F>(source: F, policy: OverflowPolicy) -> Self
    where
        F: Fn(Emitter<T>) + Send + Sync + 'static,
    {
        Self::create_with_config(source, policy, FlowConfig::global().clone())
    }

    /// `create` with an explicit configuration instead of the global one.
    pub fn create_with_config<F>(source: F, policy: OverflowPolicy, config: FlowConfig) -> Self
    where
        F: Fn(Emitter<T>) + Send + Sync + 'static,
    {
        Self::from_publisher(CreatePublisher::new(source, policy, config))
    }

    /// Emits the items of `items` in order, as demanded.
    pub fn from_iter<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        I::IntoIter: Send + 'static,
    {
        Self::from_publisher(IterPublisher::new(items))
    }

    pub fn just(item: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::from_iter(std::iter::once(item))
    }

    /// Calls `f` once per subscription and emits its value. An `Err` or a
    /// panic in `f` becomes the stream's error.
    pub fn from_callable<F, E>(f: F) -> Self
    where
        F: Fn() -> std::result::Result<T, E> + Send + Sync + 'static,
        E: Into<FlowError>,
    {
        Self::create(
            move |emitter: Emitter<T>| match f() {
                Ok(item) => {
                    emitter.next(item);
                    emitter.complete();
                }
                Err(e) => emitter.error(e.into()),
            },
            OverflowPolicy::Buffer,
        )
    }

    /// Completes immediately.
    pub fn empty() -> Self {
        Self::from_publisher(EmptyPublisher)
    }

    /// Fails immediately with `error`.
    pub fn error(error: FlowError) -> Self {
        Self::from_publisher(ErrorPublisher::new(error))
    }

    /// Attach a subscriber. The stream starts now.
    pub fn subscribe(&self, subscriber: impl Subscriber<T> + 'static) {
        self.source.subscribe(Box::new(subscriber));
    }

    pub fn subscribe_boxed(&self, subscriber: Box<dyn Subscriber<T>>) {
        self.source.subscribe(subscriber);
    }

    /// Subscribe with closures and unbounded demand. Disposing the handle
    /// cancels the subscription; it also reports disposed once the stream
    /// has terminated.
    pub fn subscribe_fn<N, E, C>(&self, on_next: N, on_error: E, on_complete: C) -> Arc<dyn Disposable>
    where
        N: FnMut(T) + Send + 'static,
        E: FnOnce(FlowError) + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        let subscriber = LambdaSubscriber::new(on_next, on_error, on_complete);
        let handle = subscriber.handle();
        self.subscribe(subscriber);
        handle
    }

    /// Run the upstream's subscribe-time work (and, for `create`, the whole
    /// producer callback) on `scheduler`.
    pub fn subscribe_on(&self, scheduler: impl Into<SchedulerHandle>) -> Self {
        Self::from_publisher(SubscribeOnPublisher::new(
            Arc::clone(&self.source),
            scheduler.into().into_inner(),
        ))
    }

    /// Deliver every downstream signal on `scheduler`, through a prefetching
    /// buffer of the configured capacity.
    pub fn observe_on(&self, scheduler: impl Into<SchedulerHandle>) -> Self {
        let cfg = FlowConfig::global();
        self.observe_on_with(scheduler, OverflowPolicy::Buffer, cfg.buffer_capacity)
    }

    pub fn observe_on_with(
        &self,
        scheduler: impl Into<SchedulerHandle>,
        policy: OverflowPolicy,
        capacity: usize,
    ) -> Self {
        Self::from_publisher(ObserveOnPublisher::new(
            Arc::clone(&self.source),
            scheduler.into().into_inner(),
            policy,
            capacity,
            FlowConfig::global().clone(),
        ))
    }

    /// Request everything upstream; queue whatever downstream has not asked for.
    pub fn on_backpressure_buffer(&self) -> Self {
        self.on_backpressure(OverflowPolicy::Buffer)
    }

    /// Request everything upstream; discard items that arrive while downstream
    /// has no demand and the buffer is full.
    pub fn on_backpressure_drop(&self) -> Self {
        self.on_backpressure(OverflowPolicy::Drop)
    }

    /// Request everything upstream; keep only the newest undelivered item.
    pub fn on_backpressure_latest(&self) -> Self {
        self.on_backpressure(OverflowPolicy::Latest)
    }

    /// Request everything upstream; fail with `MissingBackpressure` once the
    /// buffer overflows.
    pub fn on_backpressure_error(&self) -> Self {
        self.on_backpressure(OverflowPolicy::Error)
    }

    fn on_backpressure(&self, policy: OverflowPolicy) -> Self {
        Self::from_publisher(BackpressurePublisher::new(
            Arc::clone(&self.source),
            policy,
            FlowConfig::global().clone(),
        ))
    }
}

impl Flowable<i64> {
    /// `count` consecutive integers starting at `start`.
    pub fn range(start: i64, count: u64) -> Self {
        let end = start.saturating_add(i64::try_from(count).unwrap_or(i64::MAX));
        Self::from_iter(start..end)
    }
}
