//! The handoff buffer stage.
//!
//! Producers call `push` / `terminate`; the attached subscriber receives
//! signals from a drain loop that only one thread runs at a time (guarded by
//! the `wip` counter). A signal that arrives while somebody is draining just
//! bumps `wip`, and the active drainer loops once more, so re-entrant
//! `request`/`cancel` calls from inside `on_next` never recurse.
//!
//! Whoever moves `wip` away from zero owns the drain and must run
//! `drain_loop`, either inline or on the configured scheduler.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use rivulet_core::config::FlowConfig;
use rivulet_core::demand::{Demand, UNBOUNDED};
use rivulet_core::disposable::{Disposable, SwapDisposable};
use rivulet_core::error::{FlowError, Result};
use rivulet_core::id::StageId;
use rivulet_core::policy::OverflowPolicy;
use rivulet_core::scheduler::Scheduler;
use rivulet_core::signal::Terminal;
use rivulet_core::subscription::{Subscriber, Subscription};

use crate::queue::{Offer, SlotQueue};
use crate::tracking::PeakTracker;

/// Where the drain loop runs.
#[derive(Clone)]
pub enum DrainMode {
    /// On whichever thread signalled (producer push or consumer request).
    Inline,
    /// As a task on this scheduler.
    Scheduled(Arc<dyn Scheduler>),
}

impl fmt::Debug for DrainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrainMode::Inline => f.write_str("Inline"),
            DrainMode::Scheduled(s) => f.debug_tuple("Scheduled").field(&s.name()).finish(),
        }
    }
}

/// How the buffer asks its upstream for items once one is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamDemand {
    /// No upstream subscription (fed by an emitter).
    None,
    /// Request everything once; the buffer's policy absorbs the excess.
    Unbounded,
    /// Request `capacity` up front, then `threshold` each time that many items
    /// have been drained.
    Prefetch { threshold: usize },
}

#[derive(Debug, Clone)]
pub struct BufferConfig {
    pub policy: OverflowPolicy,
    pub capacity: usize,
    pub upstream: UpstreamDemand,
    pub drain: DrainMode,
}

impl BufferConfig {
    /// Buffer behind a `create` emitter. `Missing` resolves to the configured
    /// fallback.
    pub fn emitter(policy: OverflowPolicy, cfg: &FlowConfig) -> Self {
        Self {
            policy: policy.resolve(cfg.missing_fallback),
            capacity: cfg.buffer_capacity,
            upstream: UpstreamDemand::None,
            drain: DrainMode::Inline,
        }
    }

    /// Buffer installed by a downstream `on_backpressure_*` stage.
    pub fn absorbing(policy: OverflowPolicy, cfg: &FlowConfig) -> Self {
        Self {
            policy: policy.resolve(cfg.missing_fallback),
            capacity: cfg.buffer_capacity,
            upstream: UpstreamDemand::Unbounded,
            drain: DrainMode::Inline,
        }
    }

    /// Cross-scheduler hand-off: drains on `scheduler`, prefetches `capacity`.
    pub fn hand_off(
        scheduler: Arc<dyn Scheduler>,
        policy: OverflowPolicy,
        capacity: usize,
        cfg: &FlowConfig,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            policy: policy.resolve(cfg.missing_fallback),
            capacity,
            upstream: UpstreamDemand::Prefetch {
                threshold: cfg.threshold_for(capacity),
            },
            drain: DrainMode::Scheduled(scheduler),
        }
    }
}

struct Slots<T> {
    queue: SlotQueue<T>,
    terminal: Option<Terminal>,
    /// No further inserts: a terminal arrived or the queue overflowed.
    sealed: bool,
}

enum Step<T> {
    Next(T),
    Terminal(Terminal),
    Idle,
}

pub struct HandoffBuffer<T> {
    id: StageId,
    policy: OverflowPolicy,
    capacity: usize,
    upstream_demand: UpstreamDemand,
    drain: DrainMode,

    slots: Mutex<Slots<T>>,
    demand: Demand,
    wip: AtomicUsize,
    cancelled: AtomicBool,
    done: AtomicBool,

    downstream: Mutex<Option<Box<dyn Subscriber<T>>>>,
    upstream: Mutex<Option<Arc<dyn Subscription>>>,
    cleanup: SwapDisposable,
    drained_since_replenish: AtomicU64,

    demand_lock: Mutex<()>,
    demand_ready: Condvar,
    peak: PeakTracker,
}

impl<T: Send + 'static> HandoffBuffer<T> {
    pub fn new(config: BufferConfig) -> Arc<Self> {
        Arc::new(Self {
            id: StageId::next(),
            policy: config.policy,
            capacity: config.capacity,
            upstream_demand: config.upstream,
            drain: config.drain,
            slots: Mutex::new(Slots {
                queue: SlotQueue::new(config.policy, config.capacity),
                terminal: None,
                sealed: false,
            }),
            demand: Demand::new(),
            wip: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
            done: AtomicBool::new(false),
            downstream: Mutex::new(None),
            upstream: Mutex::new(None),
            cleanup: SwapDisposable::new(),
            drained_since_replenish: AtomicU64::new(0),
            demand_lock: Mutex::new(()),
            demand_ready: Condvar::new(),
            peak: PeakTracker::new(),
        })
    }

    pub fn id(&self) -> StageId {
        self.id
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Connect the consumer. `on_subscribe` runs synchronously on the calling
    /// thread, with the drain gate held, before any other signal.
    pub fn attach(self: &Arc<Self>, subscriber: Box<dyn Subscriber<T>>) {
        let owner = self.wip.fetch_add(1, Ordering::AcqRel) == 0;
        {
            let mut slot = self.downstream.lock();
            let sub = slot.insert(subscriber);
            let handle: Arc<dyn Subscription> = Arc::new(BufferSubscription {
                buffer: Arc::clone(self),
            });
            sub.on_subscribe(handle);
        }
        // A drainer already running picks the subscriber up on its next pass.
        if owner {
            self.dispatch_drain();
        }
    }

    /// Record the upstream subscription and issue the initial request
    /// according to the configured `UpstreamDemand`.
    pub fn set_upstream(self: &Arc<Self>, subscription: Arc<dyn Subscription>) {
        if self.cancelled.load(Ordering::Acquire) || self.done.load(Ordering::Acquire) {
            subscription.cancel();
            return;
        }
        *self.upstream.lock() = Some(Arc::clone(&subscription));
        let initial = match self.upstream_demand {
            UpstreamDemand::None => return,
            UpstreamDemand::Unbounded => UNBOUNDED,
            UpstreamDemand::Prefetch { .. } => self.capacity as u64,
        };
        if let Err(e) = subscription.request(initial) {
            self.terminate(Terminal::Error(e));
        }
    }

    /// Install the producer's cleanup. Replaces (and disposes) any earlier one.
    /// Runs on cancellation or once a terminal signal has been delivered.
    pub fn set_cleanup(&self, cleanup: Arc<dyn Disposable>) {
        self.cleanup.replace(cleanup);
    }

    /// Insert one item, applying the overflow policy.
    ///
    /// Items arriving after a terminal signal, an overflow, or cancellation are
    /// discarded and reported as `Offer::Dropped`.
    pub fn push(self: &Arc<Self>, item: T) -> Offer {
        if self.cancelled.load(Ordering::Acquire) {
            return Offer::Dropped;
        }
        let offer = {
            let mut slots = self.slots.lock();
            if slots.sealed {
                return Offer::Dropped;
            }
            let headroom = usize::try_from(self.demand.current()).unwrap_or(usize::MAX);
            let offer = slots.queue.offer(item, headroom);
            if offer == Offer::Overflow {
                slots.queue.clear();
                slots.sealed = true;
                slots.terminal = Some(Terminal::Error(FlowError::MissingBackpressure {
                    capacity: self.capacity,
                }));
            }
            if self.peak.record(slots.queue.len()) {
                #[cfg(feature = "tracing")]
                tracing::trace!(stage = %self.id, peak = slots.queue.len(), "new queue peak");
            }
            offer
        };

        match offer {
            Offer::Overflow => {
                #[cfg(feature = "tracing")]
                tracing::debug!(stage = %self.id, policy = %self.policy, capacity = self.capacity, "buffer overflow; terminating stage");
                self.cancel_upstream();
            }
            Offer::Dropped | Offer::Replaced => {
                #[cfg(feature = "tracing")]
                tracing::trace!(stage = %self.id, policy = %self.policy, ?offer, "buffer full");
                // The discarded item still spent one unit of upstream demand.
                self.credit_upstream();
            }
            Offer::Accepted => {}
        }
        self.signal();
        offer
    }

    /// Record a terminal signal. The first one wins; the rest are ignored.
    /// Queued items are still delivered ahead of it (except after overflow,
    /// which clears the queue).
    pub fn terminate(self: &Arc<Self>, terminal: Terminal) -> bool {
        {
            let mut slots = self.slots.lock();
            if slots.sealed {
                return false;
            }
            slots.sealed = true;
            slots.terminal = Some(terminal);
        }
        self.wake_producer();
        self.signal();
        true
    }

    /// Demand the producer may still fill: outstanding requests not already
    /// covered by queued items.
    pub fn producer_demand(&self) -> u64 {
        let queued = self.slots.lock().queue.len() as u64;
        let requested = self.demand.current();
        if requested == UNBOUNDED {
            UNBOUNDED
        } else {
            requested.saturating_sub(queued)
        }
    }

    /// Park the calling producer until it has demand to fill. Returns false if
    /// the stage was cancelled or terminated instead.
    pub fn await_demand(&self) -> bool {
        let mut guard = self.demand_lock.lock();
        loop {
            if self.is_cancelled() || self.is_sealed() {
                return false;
            }
            if self.producer_demand() > 0 {
                return true;
            }
            self.demand_ready.wait(&mut guard);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// True once a terminal was recorded (delivered or still queued).
    pub fn is_sealed(&self) -> bool {
        self.slots.lock().sealed
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Largest queue length observed.
    pub fn peak(&self) -> usize {
        self.peak.peak()
    }

    fn request(self: &Arc<Self>, n: u64) -> Result<()> {
        self.demand.add(n)?;
        self.wake_producer();
        self.signal();
        Ok(())
    }

    fn cancel(self: &Arc<Self>) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(stage = %self.id, "buffer cancelled");
        self.cancel_upstream();
        self.cleanup.dispose();
        self.wake_producer();
        self.signal();
    }

    fn cancel_upstream(&self) {
        let upstream = self.upstream.lock().take();
        if let Some(up) = upstream {
            up.cancel();
        }
    }

    fn wake_producer(&self) {
        let _guard = self.demand_lock.lock();
        self.demand_ready.notify_all();
    }

    fn signal(self: &Arc<Self>) {
        if self.wip.fetch_add(1, Ordering::AcqRel) == 0 {
            self.dispatch_drain();
        }
    }

    fn dispatch_drain(self: &Arc<Self>) {
        match &self.drain {
            DrainMode::Inline => self.drain_loop(),
            DrainMode::Scheduled(scheduler) => {
                let this = Arc::clone(self);
                if let Err(e) = scheduler.schedule(Box::new(move || this.drain_loop())) {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(stage = %self.id, error = %e, "drain could not be scheduled; failing stage");
                    self.fail_inline(e);
                }
            }
        }
    }

    /// The drain scheduler refused work: cut ahead of queued items with the
    /// rejection and deliver it on the calling thread, which owns `wip`.
    fn fail_inline(&self, error: FlowError) {
        if !self.done.load(Ordering::Acquire) {
            let mut slots = self.slots.lock();
            slots.queue.clear();
            slots.sealed = true;
            slots.terminal = Some(Terminal::Error(error));
        }
        self.cancel_upstream();
        self.wake_producer();
        self.drain_loop();
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

    /// Deliver everything that demand allows. Only the `wip` owner gets here,
    /// so the downstream lock is uncontended; the slot lock is released
    /// before every callback.
    fn drain_ready(&self) {
        let mut downstream = self.downstream.lock();
        if downstream.is_none() {
            return;
        }
        loop {
            if self.cancelled.load(Ordering::Acquire) {
                self.slots.lock().queue.clear();
                *downstream = None;
                return;
            }

            let step = {
                let mut slots = self.slots.lock();
                if !slots.queue.is_empty() {
                    if self.demand.try_consume() {
                        slots.queue.pop().map_or(Step::Idle, Step::Next)
                    } else {
                        Step::Idle
                    }
                } else if let Some(t) = slots.terminal.take() {
                    Step::Terminal(t)
                } else {
                    Step::Idle
                }
            };

            match step {
                Step::Next(item) => {
                    self.wake_producer();
                    if let Some(sub) = downstream.as_mut() {
                        sub.on_next(item);
                    }
                    self.credit_upstream();
                }
                Step::Terminal(terminal) => {
                    self.done.store(true, Ordering::Release);
                    if let Some(mut sub) = downstream.take() {
                        sub.on_signal(terminal.into());
                    }
                    self.upstream.lock().take();
                    self.cleanup.dispose();
                    return;
                }
                Step::Idle => return,
            }
        }
    }

    /// Count one unit of spent upstream demand (an item delivered or
    /// discarded by the policy) and request the next batch once `threshold`
    /// units have accumulated.
    fn credit_upstream(&self) {
        let UpstreamDemand::Prefetch { threshold } = self.upstream_demand else {
            return;
        };
        let threshold = threshold as u64;
        let due = self
            .drained_since_replenish
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(if n + 1 >= threshold { 0 } else { n + 1 })
            })
            .map_or(false, |prev| prev + 1 >= threshold);
        if !due {
            return;
        }
        let upstream = self.upstream.lock().clone();
        if let Some(up) = upstream {
            #[cfg(feature = "tracing")]
            tracing::trace!(stage = %self.id, batch = threshold, "replenishing upstream demand");
            let _ = up.request(threshold);
        }
    }
}

impl<T> fmt::Debug for HandoffBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandoffBuffer")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .field("capacity", &self.capacity)
            .field("drain", &self.drain)
            .field("demand", &self.demand.current())
            .finish()
    }
}

/// The consumer's handle on a buffer.
struct BufferSubscription<T> {
    buffer: Arc<HandoffBuffer<T>>,
}

impl<T: Send + 'static> Subscription for BufferSubscription<T> {
    fn request(&self, n: u64) -> Result<()> {
        self.buffer.request(n)
    }

    fn cancel(&self) {
        self.buffer.cancel();
    }
}

/// Upstream-facing subscriber feeding a buffer: the inlet of `observe_on` and
/// `on_backpressure_*` stages.
pub struct BufferInlet<T> {
    buffer: Arc<HandoffBuffer<T>>,
}

impl<T: Send + 'static> BufferInlet<T> {
    pub fn new(buffer: Arc<HandoffBuffer<T>>) -> Self {
        Self { buffer }
    }
}

impl<T: Send + 'static> Subscriber<T> for BufferInlet<T> {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        self.buffer.set_upstream(subscription);
    }

    fn on_next(&mut self, item: T) {
        self.buffer.push(item);
    }

    fn on_error(&mut self, error: FlowError) {
        self.buffer.terminate(Terminal::Error(error));
    }

    fn on_complete(&mut self) {
        self.buffer.terminate(Terminal::Complete);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Probe {
        items: Vec<u32>,
        error: Option<FlowError>,
        completed: bool,
    }

    struct Recorder {
        probe: Arc<StdMutex<Probe>>,
        sub: Arc<StdMutex<Option<Arc<dyn Subscription>>>>,
        initial: u64,
    }

    impl Subscriber<u32> for Recorder {
        fn on_subscribe(&mut self, s: Arc<dyn Subscription>) {
            *self.sub.lock().unwrap() = Some(Arc::clone(&s));
            if self.initial > 0 {
                s.request(self.initial).unwrap();
            }
        }
        fn on_next(&mut self, item: u32) {
            self.probe.lock().unwrap().items.push(item);
        }
        fn on_error(&mut self, e: FlowError) {
            self.probe.lock().unwrap().error = Some(e);
        }
        fn on_complete(&mut self) {
            self.probe.lock().unwrap().completed = true;
        }
    }

    type Handles = (
        Arc<HandoffBuffer<u32>>,
        Arc<StdMutex<Probe>>,
        Arc<StdMutex<Option<Arc<dyn Subscription>>>>,
    );

    fn attached(policy: OverflowPolicy, capacity: usize, initial: u64) -> Handles {
        let cfg = FlowConfig {
            buffer_capacity: capacity,
            replenish_threshold: capacity,
            ..FlowConfig::default()
        };
        let buffer = HandoffBuffer::new(BufferConfig::emitter(policy, &cfg));
        let probe = Arc::new(StdMutex::new(Probe::default()));
        let sub = Arc::new(StdMutex::new(None));
        buffer.attach(Box::new(Recorder {
            probe: Arc::clone(&probe),
            sub: Arc::clone(&sub),
            initial,
        }));
        (buffer, probe, sub)
    }

    #[test]
    fn queued_items_precede_completion() {
        let (buffer, probe, sub) = attached(OverflowPolicy::Buffer, 4, 0);
        for i in 0..3 {
            buffer.push(i);
        }
        buffer.terminate(Terminal::Complete);
        assert!(!probe.lock().unwrap().completed);

        let s = sub.lock().unwrap().clone().unwrap();
        s.request(10).unwrap();
        let p = probe.lock().unwrap();
        assert_eq!(p.items, vec![0, 1, 2]);
        assert!(p.completed);
    }

    #[test]
    fn error_overflow_cuts_ahead_of_queued_items() {
        let (buffer, probe, _sub) = attached(OverflowPolicy::Error, 2, 0);
        assert_eq!(buffer.push(1), Offer::Accepted);
        assert_eq!(buffer.push(2), Offer::Accepted);
        assert_eq!(buffer.push(3), Offer::Overflow);
        assert_eq!(buffer.push(4), Offer::Dropped);

        let p = probe.lock().unwrap();
        assert!(p.items.is_empty());
        assert!(matches!(
            p.error,
            Some(FlowError::MissingBackpressure { capacity: 2 })
        ));
    }

    #[test]
    fn only_the_first_terminal_counts() {
        let (buffer, probe, _sub) = attached(OverflowPolicy::Buffer, 4, 1);
        assert!(buffer.terminate(Terminal::Complete));
        assert!(!buffer.terminate(Terminal::Error(FlowError::msg("late"))));
        let p = probe.lock().unwrap();
        assert!(p.completed);
        assert!(p.error.is_none());
    }

    #[test]
    fn producer_demand_subtracts_queued_items() {
        let (buffer, _probe, sub) = attached(OverflowPolicy::Buffer, 8, 0);
        buffer.push(1);
        buffer.push(2);
        assert_eq!(buffer.producer_demand(), 0);

        let s = sub.lock().unwrap().clone().unwrap();
        s.request(5).unwrap();
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.producer_demand(), 3);
        assert_eq!(buffer.peak(), 2);
    }

    #[test]
    fn cancel_runs_cleanup_and_discards_later_pushes() {
        let (buffer, probe, sub) = attached(OverflowPolicy::Buffer, 4, 1);
        let cleaned = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cleaned);
        buffer.set_cleanup(Arc::new(rivulet_core::disposable::ActionDisposable::new(
            move || flag.store(true, Ordering::SeqCst),
        )));

        sub.lock().unwrap().clone().unwrap().cancel();
        assert!(cleaned.load(Ordering::SeqCst));
        assert_eq!(buffer.push(7), Offer::Dropped);
        assert!(probe.lock().unwrap().items.is_empty());
        assert!(!buffer.await_demand());
    }
}
