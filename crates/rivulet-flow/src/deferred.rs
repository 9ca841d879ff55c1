//! A subscription that exists before its upstream does.
//!
//! Handed to the subscriber synchronously; requests and cancellation made
//! before the real upstream arrives are accumulated and replayed onto it.

use std::sync::Arc;

use parking_lot::Mutex;

use rivulet_core::demand::validate_request;
use rivulet_core::disposable::{Disposable, SwapDisposable};
use rivulet_core::error::Result;
use rivulet_core::subscription::Subscription;

#[derive(Default)]
struct State {
    upstream: Option<Arc<dyn Subscription>>,
    pending: u64,
    cancelled: bool,
}

#[derive(Default)]
pub struct DeferredSubscription {
    state: Mutex<State>,
    /// Whatever is still in flight to produce the upstream (a scheduled task).
    pending_work: SwapDisposable,
}

impl DeferredSubscription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect the real upstream, replaying accumulated demand. Cancels
    /// `upstream` right away if this subscription was already cancelled.
    pub fn set_upstream(&self, upstream: Arc<dyn Subscription>) {
        let pending = {
            let mut state = self.state.lock();
            if state.cancelled {
                None
            } else {
                state.upstream = Some(Arc::clone(&upstream));
                Some(std::mem::take(&mut state.pending))
            }
        };
        match pending {
            None => upstream.cancel(),
            Some(0) => {}
            Some(n) => {
                let _ = upstream.request(n);
            }
        }
    }

    /// Track the work that will eventually call `set_upstream`; cancelling
    /// first disposes it.
    pub fn set_pending_work(&self, work: Arc<dyn Disposable>) {
        self.pending_work.replace(work);
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    /// Demand accumulated and not yet forwarded.
    pub fn pending(&self) -> u64 {
        self.state.lock().pending
    }
}

impl Subscription for DeferredSubscription {
    fn request(&self, n: u64) -> Result<()> {
        validate_request(n)?;
        let upstream = {
            let mut state = self.state.lock();
            if state.cancelled {
                return Ok(());
            }
            match &state.upstream {
                Some(up) => Arc::clone(up),
                None => {
                    state.pending = state.pending.saturating_add(n);
                    return Ok(());
                }
            }
        };
        upstream.request(n)
    }

    fn cancel(&self) {
        let upstream = {
            let mut state = self.state.lock();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            state.upstream.take()
        };
        self.pending_work.dispose();
        if let Some(up) = upstream {
            up.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    #[derive(Default)]
    struct Counting {
        requested: AtomicU64,
        cancelled: AtomicBool,
    }

    impl Subscription for Counting {
        fn request(&self, n: u64) -> Result<()> {
            self.requested.fetch_add(n, Ordering::SeqCst);
            Ok(())
        }
        fn cancel(&self) {
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn replays_accumulated_demand() {
        let deferred = DeferredSubscription::new();
        deferred.request(2).unwrap();
        deferred.request(3).unwrap();
        assert!(deferred.request(0).is_err());

        let up = Arc::new(Counting::default());
        deferred.set_upstream(up.clone());
        assert_eq!(up.requested.load(Ordering::SeqCst), 5);

        deferred.request(1).unwrap();
        assert_eq!(up.requested.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn early_cancel_reaches_late_upstream() {
        let deferred = DeferredSubscription::new();
        deferred.request(4).unwrap();
        deferred.cancel();

        let up = Arc::new(Counting::default());
        deferred.set_upstream(up.clone());
        assert!(up.cancelled.load(Ordering::SeqCst));
        assert_eq!(up.requested.load(Ordering::SeqCst), 0);
    }
}
