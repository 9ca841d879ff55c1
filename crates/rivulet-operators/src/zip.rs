//! `zip_with`: pair the n-th item of one source with the n-th of another.
//!
//! Both sides are prefetched and replenished in batches. A pair is emitted
//! once both queues hold an item and the downstream has demand. The stream
//! completes as soon as one side has completed and its queue is empty, since
//! no further pair can form; the other side is then cancelled.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use rivulet_core::config::FlowConfig;
use rivulet_core::demand::Demand;
use rivulet_core::error::{FlowError, Result};
use rivulet_core::subscription::{Subscriber, Subscription};
use rivulet_flow::Publisher;

pub(crate) struct ZipPublisher<A, B, F> {
    left: Arc<dyn Publisher<A>>,
    right: Arc<dyn Publisher<B>>,
    zipper: Arc<F>,
    prefetch: usize,
    threshold: usize,
}

impl<A, B, F> ZipPublisher<A, B, F> {
    pub(crate) fn new(left: Arc<dyn Publisher<A>>, right: Arc<dyn Publisher<B>>, zipper: F) -> Self {
        let cfg = FlowConfig::global();
        Self {
            left,
            right,
            zipper: Arc::new(zipper),
            prefetch: cfg.buffer_capacity,
            threshold: cfg.threshold_for(cfg.buffer_capacity),
        }
    }
}

impl<A, B, R, F> Publisher<R> for ZipPublisher<A, B, F>
where
    A: Send + 'static,
    B: Send + 'static,
    R: Send + 'static,
    F: Fn(A, B) -> R + Send + Sync + 'static,
{
    fn subscribe(&self, subscriber: Box<dyn Subscriber<R>>) {
        let core = Arc::new(ZipCore {
            state: Mutex::new(ZipState {
                left: Side::default(),
                right: Side::default(),
                error: None,
            }),
            zipper: Arc::clone(&self.zipper),
            demand: Demand::new(),
            wip: AtomicUsize::new(1),
            cancelled: AtomicBool::new(false),
            done: AtomicBool::new(false),
            downstream: Mutex::new(Some(subscriber)),
            prefetch: self.prefetch as u64,
            threshold: self.threshold,
        });
        {
            let handle: Arc<dyn Subscription> = Arc::new(ZipSubscription {
                core: Arc::clone(&core),
            });
            if let Some(sub) = core.downstream.lock().as_mut() {
                sub.on_subscribe(handle);
            }
        }
        core.drain_loop();

        if core.is_finished() {
            return;
        }
        self.left.subscribe(Box::new(LeftInlet {
            core: Arc::clone(&core),
        }));
        if core.is_finished() {
            return;
        }
        self.right.subscribe(Box::new(RightInlet { core }));
    }
}

struct Side<T> {
    queue: VecDeque<T>,
    subscription: Option<Arc<dyn Subscription>>,
    completed: bool,
    consumed: usize,
}

impl<T> Default for Side<T> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            subscription: None,
            completed: false,
            consumed: 0,
        }
    }
}

impl<T> Side<T> {
    fn exhausted(&self) -> bool {
        self.completed && self.queue.is_empty()
    }

    /// Count one consumed item; returns the subscription to replenish when a
    /// batch is due.
    fn consume(&mut self, threshold: usize) -> Option<Arc<dyn Subscription>> {
        self.consumed += 1;
        if self.consumed < threshold {
            return None;
        }
        self.consumed = 0;
        self.subscription.clone()
    }
}

struct ZipState<A, B> {
    left: Side<A>,
    right: Side<B>,
    error: Option<FlowError>,
}

enum Step<A, B> {
    Pair(A, B, Option<Arc<dyn Subscription>>, Option<Arc<dyn Subscription>>),
    Error(FlowError),
    Complete,
    Idle,
}

struct ZipCore<A, B, R, F> {
    state: Mutex<ZipState<A, B>>,
    zipper: Arc<F>,
    demand: Demand,
    wip: AtomicUsize,
    cancelled: AtomicBool,
    done: AtomicBool,
    downstream: Mutex<Option<Box<dyn Subscriber<R>>>>,
    prefetch: u64,
    threshold: usize,
}

impl<A, B, R, F> ZipCore<A, B, R, F>
where
    A: Send + 'static,
    B: Send + 'static,
    R: Send + 'static,
    F: Fn(A, B) -> R + Send + Sync + 'static,
{
    fn is_finished(&self) -> bool {
        self.cancelled.load(Ordering::Acquire) || self.done.load(Ordering::Acquire)
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
                self.cancel_sides();
                *downstream = None;
                return;
            }
            let step = {
                let mut state = self.state.lock();
                if let Some(e) = state.error.take() {
                    Step::Error(e)
                } else if !state.left.queue.is_empty()
                    && !state.right.queue.is_empty()
                    && self.demand.try_consume()
                {
                    match (state.left.queue.pop_front(), state.right.queue.pop_front()) {
                        (Some(a), Some(b)) => {
                            let l = state.left.consume(self.threshold);
                            let r = state.right.consume(self.threshold);
                            Step::Pair(a, b, l, r)
                        }
                        _ => Step::Idle,
                    }
                } else if state.left.exhausted() || state.right.exhausted() {
                    Step::Complete
                } else {
                    Step::Idle
                }
            };
            match step {
                Step::Pair(a, b, left_up, right_up) => {
                    let zipper = &*self.zipper;
                    match catch_unwind(AssertUnwindSafe(|| zipper(a, b))) {
                        Ok(out) => {
                            if let Some(sub) = downstream.as_mut() {
                                sub.on_next(out);
                            }
                        }
                        Err(payload) => {
                            self.done.store(true, Ordering::Release);
                            self.cancel_sides();
                            if let Some(mut sub) = downstream.take() {
                                sub.on_error(FlowError::from_panic(payload));
                            }
                            return;
                        }
                    }
                    for up in [left_up, right_up].into_iter().flatten() {
                        let _ = up.request(self.threshold as u64);
                    }
                }
                Step::Error(e) => {
                    self.done.store(true, Ordering::Release);
                    self.cancel_sides();
                    if let Some(mut sub) = downstream.take() {
                        sub.on_error(e);
                    }
                    return;
                }
                Step::Complete => {
                    self.done.store(true, Ordering::Release);
                    self.cancel_sides();
                    if let Some(mut sub) = downstream.take() {
                        sub.on_complete();
                    }
                    return;
                }
                Step::Idle => return,
            }
        }
    }

    fn cancel_sides(&self) {
        let (left, right) = {
            let mut state = self.state.lock();
            state.left.queue.clear();
            state.right.queue.clear();
            (state.left.subscription.take(), state.right.subscription.take())
        };
        for up in [left, right].into_iter().flatten() {
            up.cancel();
        }
    }

    /// Store a side's subscription and prefetch, unless the stream is over.
    fn side_subscribed(&self, left: bool, subscription: Arc<dyn Subscription>) {
        if self.is_finished() {
            subscription.cancel();
            return;
        }
        {
            let mut state = self.state.lock();
            let slot = if left {
                &mut state.left.subscription
            } else {
                &mut state.right.subscription
            };
            *slot = Some(Arc::clone(&subscription));
        }
        let _ = subscription.request(self.prefetch);
    }

    fn side_error(&self, error: FlowError) {
        {
            let mut state = self.state.lock();
            if self.done.load(Ordering::Acquire) || state.error.is_some() {
                return;
            }
            state.error = Some(error);
        }
        self.signal();
    }
}

struct ZipSubscription<A, B, R, F> {
    core: Arc<ZipCore<A, B, R, F>>,
}

impl<A, B, R, F> Subscription for ZipSubscription<A, B, R, F>
where
    A: Send + 'static,
    B: Send + 'static,
    R: Send + 'static,
    F: Fn(A, B) -> R + Send + Sync + 'static,
{
    fn request(&self, n: u64) -> Result<()> {
        self.core.demand.add(n)?;
        self.core.signal();
        Ok(())
    }

    fn cancel(&self) {
        if !self.core.cancelled.swap(true, Ordering::AcqRel) {
            self.core.signal();
        }
    }
}

struct LeftInlet<A, B, R, F> {
    core: Arc<ZipCore<A, B, R, F>>,
}

impl<A, B, R, F> Subscriber<A> for LeftInlet<A, B, R, F>
where
    A: Send + 'static,
    B: Send + 'static,
    R: Send + 'static,
    F: Fn(A, B) -> R + Send + Sync + 'static,
{
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        self.core.side_subscribed(true, subscription);
    }

    fn on_next(&mut self, item: A) {
        if self.core.is_finished() {
            return;
        }
        self.core.state.lock().left.queue.push_back(item);
        self.core.signal();
    }

    fn on_error(&mut self, error: FlowError) {
        self.core.side_error(error);
    }

    fn on_complete(&mut self) {
        self.core.state.lock().left.completed = true;
        self.core.signal();
    }
}

struct RightInlet<A, B, R, F> {
    core: Arc<ZipCore<A, B, R, F>>,
}

impl<A, B, R, F> Subscriber<B> for RightInlet<A, B, R, F>
where
    A: Send + 'static,
    B: Send + 'static,
    R: Send + 'static,
    F: Fn(A, B) -> R + Send + Sync + 'static,
{
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        self.core.side_subscribed(false, subscription);
    }

    fn on_next(&mut self, item: B) {
        if self.core.is_finished() {
            return;
        }
        self.core.state.lock().right.queue.push_back(item);
        self.core.signal();
    }

    fn on_error(&mut self, error: FlowError) {
        self.core.side_error(error);
    }

    fn on_complete(&mut self) {
        self.core.state.lock().right.completed = true;
        self.core.signal();
    }
}
