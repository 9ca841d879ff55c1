//! `merge`: subscribe to every source at once and interleave items in
//! arrival order.
//!
//! Each inner source is prefetched up to the buffer capacity and replenished
//! in batches, like a handoff buffer. Arrivals go through one shared queue so
//! the downstream sees a single serialized stream. Completes once every source
//! has completed; the first error cancels the remaining sources and cuts ahead
//! of queued items.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use rivulet_core::config::FlowConfig;
use rivulet_core::demand::Demand;
use rivulet_core::error::{FlowError, Result};
use rivulet_core::subscription::{Subscriber, Subscription};
use rivulet_flow::{Flowable, Publisher};

/// Merge `sources` into one stream.
pub fn merge<T, I>(sources: I) -> Flowable<T>
where
    T: Send + 'static,
    I: IntoIterator<Item = Flowable<T>>,
{
    let sources = sources
        .into_iter()
        .map(|f| Arc::clone(f.publisher()))
        .collect();
    let cfg = FlowConfig::global();
    Flowable::from_publisher(MergePublisher {
        sources,
        prefetch: cfg.buffer_capacity,
        threshold: cfg.replenish_threshold.min(cfg.buffer_capacity).max(1),
    })
}

struct MergePublisher<T> {
    sources: Vec<Arc<dyn Publisher<T>>>,
    prefetch: usize,
    threshold: usize,
}

impl<T: Send + 'static> Publisher<T> for MergePublisher<T> {
    fn subscribe(&self, subscriber: Box<dyn Subscriber<T>>) {
        let core = MergeCore::start(subscriber, self.sources.len(), self.prefetch, self.threshold);
        for (index, source) in self.sources.iter().enumerate() {
            if core.is_finished() {
                break;
            }
            source.subscribe(Box::new(MergeInner {
                core: Arc::clone(&core),
                index,
            }));
        }
    }
}

struct InnerSlot {
    subscription: Option<Arc<dyn Subscription>>,
    consumed: usize,
}

struct MergeState<T> {
    queue: VecDeque<(usize, T)>,
    error: Option<FlowError>,
    /// Live inner subscriptions by source index; removed on completion.
    inners: HashMap<usize, InnerSlot>,
    /// The source of sources, when inners are created on the fly.
    outer: Option<Arc<dyn Subscription>>,
}

enum Step<T> {
    Next(usize, T),
    Error(FlowError),
    Complete,
    Idle,
}

pub(crate) struct MergeCore<T> {
    state: Mutex<MergeState<T>>,
    demand: Demand,
    wip: AtomicUsize,
    active: AtomicUsize,
    cancelled: AtomicBool,
    done: AtomicBool,
    downstream: Mutex<Option<Box<dyn Subscriber<T>>>>,
    prefetch: u64,
    threshold: usize,
}

impl<T: Send + 'static> MergeCore<T> {
    /// Build the shared core and hand the downstream its subscription.
    /// `active` counts the sources that must complete before the merged
    /// stream does.
    pub(crate) fn start(
        subscriber: Box<dyn Subscriber<T>>,
        active: usize,
        prefetch: usize,
        threshold: usize,
    ) -> Arc<Self> {
        let core = Arc::new(MergeCore {
            state: Mutex::new(MergeState {
                queue: VecDeque::new(),
                error: None,
                inners: HashMap::new(),
                outer: None,
            }),
            demand: Demand::new(),
            wip: AtomicUsize::new(1),
            active: AtomicUsize::new(active),
            cancelled: AtomicBool::new(false),
            done: AtomicBool::new(false),
            downstream: Mutex::new(Some(subscriber)),
            prefetch: prefetch as u64,
            threshold,
        });
        {
            let handle: Arc<dyn Subscription> = Arc::new(MergeSubscription {
                core: Arc::clone(&core),
            });
            if let Some(sub) = core.downstream.lock().as_mut() {
                sub.on_subscribe(handle);
            }
        }
        core.drain_loop();
        core
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.cancelled.load(Ordering::Acquire) || self.done.load(Ordering::Acquire)
    }

    pub(crate) fn prefetch(&self) -> u64 {
        self.prefetch
    }

    /// Count one more source that must complete before the merged stream.
    pub(crate) fn add_active(&self) {
        self.active.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn set_outer(&self, subscription: Arc<dyn Subscription>) -> bool {
        if self.is_finished() {
            subscription.cancel();
            return false;
        }
        self.state.lock().outer = Some(subscription);
        true
    }

    /// The outer source finished; in-flight inners still count.
    pub(crate) fn outer_complete(&self) {
        self.state.lock().outer = None;
        self.active.fetch_sub(1, Ordering::AcqRel);
        self.signal();
    }

    fn signal(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) == 0 {
            self.drain_loop();
        }
    }

    fn drain_loop(&self) {
        let mut missed = 1;
        loop {
            self.drain_ready();
            let prev = self.wip.fetch_sub(missed, Ordering::AcqRel);
            if prev == missed {
                return;
            }
            missed = prev - missed;
        }
    }

    fn drain_ready(&self) {
        let mut downstream = self.downstream.lock();
        loop {
            if downstream.is_none() {
                return;
            }
            if self.cancelled.load(Ordering::Acquire) {
                self.state.lock().queue.clear();
                *downstream = None;
                return;
            }
            let step = {
                let mut state = self.state.lock();
                if let Some(e) = state.error.take() {
                    state.queue.clear();
                    Step::Error(e)
                } else if !state.queue.is_empty() {
                    if self.demand.try_consume() {
                        match state.queue.pop_front() {
                            Some((index, item)) => Step::Next(index, item),
                            None => Step::Idle,
                        }
                    } else {
                        Step::Idle
                    }
                } else if self.active.load(Ordering::Acquire) == 0 {
                    Step::Complete
                } else {
                    Step::Idle
                }
            };
            match step {
                Step::Next(index, item) => {
                    if let Some(sub) = downstream.as_mut() {
                        sub.on_next(item);
                    }
                    self.replenish(index);
                }
                Step::Error(e) => {
                    self.done.store(true, Ordering::Release);
                    self.cancel_inners();
                    if let Some(mut sub) = downstream.take() {
                        sub.on_error(e);
                    }
                    return;
                }
                Step::Complete => {
                    self.done.store(true, Ordering::Release);
                    if let Some(mut sub) = downstream.take() {
                        sub.on_complete();
                    }
                    return;
                }
                Step::Idle => return,
            }
        }
    }

    fn replenish(&self, index: usize) {
        let request = {
            let mut state = self.state.lock();
            let Some(slot) = state.inners.get_mut(&index) else {
                return;
            };
            slot.consumed += 1;
            if slot.consumed < self.threshold {
                return;
            }
            slot.consumed = 0;
            slot.subscription.clone()
        };
        if let Some(up) = request {
            let _ = up.request(self.threshold as u64);
        }
    }

    /// Cancel every live source, the outer one included.
    fn cancel_inners(&self) {
        let subscriptions: Vec<_> = {
            let mut state = self.state.lock();
            let outer = state.outer.take();
            state
                .inners
                .drain()
                .filter_map(|(_, slot)| slot.subscription)
                .chain(outer)
                .collect()
        };
        for up in subscriptions {
            up.cancel();
        }
    }

    fn inner_subscribed(&self, index: usize, subscription: Arc<dyn Subscription>) {
        if self.is_finished() {
            subscription.cancel();
            return;
        }
        self.state.lock().inners.insert(
            index,
            InnerSlot {
                subscription: Some(Arc::clone(&subscription)),
                consumed: 0,
            },
        );
        let _ = subscription.request(self.prefetch);
    }

    fn inner_next(&self, index: usize, item: T) {
        if self.is_finished() {
            return;
        }
        self.state.lock().queue.push_back((index, item));
        self.signal();
    }

    pub(crate) fn inner_error(&self, error: FlowError) {
        {
            let mut state = self.state.lock();
            if self.done.load(Ordering::Acquire) || state.error.is_some() {
                return;
            }
            state.error = Some(error);
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("merge source failed; cancelling remaining sources");
        self.cancel_inners();
        self.signal();
    }

    fn inner_complete(&self, index: usize) {
        let outer = {
            let mut state = self.state.lock();
            state.inners.remove(&index);
            state.outer.clone()
        };
        self.active.fetch_sub(1, Ordering::AcqRel);
        // A finished inner frees one concurrency slot on the outer source.
        if let Some(up) = outer {
            if !self.is_finished() {
                let _ = up.request(1);
            }
        }
        self.signal();
    }
}

struct MergeSubscription<T> {
    core: Arc<MergeCore<T>>,
}

impl<T: Send + 'static> Subscription for MergeSubscription<T> {
    fn request(&self, n: u64) -> Result<()> {
        self.core.demand.add(n)?;
        self.core.signal();
        Ok(())
    }

    fn cancel(&self) {
        if self.core.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.core.cancel_inners();
        self.core.signal();
    }
}

pub(crate) struct MergeInner<T> {
    pub(crate) core: Arc<MergeCore<T>>,
    pub(crate) index: usize,
}

impl<T: Send + 'static> Subscriber<T> for MergeInner<T> {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        self.core.inner_subscribed(self.index, subscription);
    }

    fn on_next(&mut self, item: T) {
        self.core.inner_next(self.index, item);
    }

    fn on_error(&mut self, error: FlowError) {
        self.core.inner_error(error);
    }

    fn on_complete(&mut self) {
        self.core.inner_complete(self.index);
    }
}
