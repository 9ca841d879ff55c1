//! Switching subscription for operators that consume their sources one at a
//! time (`concat`, `retry`).
//!
//! The downstream holds the arbiter for the whole stream. Each new upstream is
//! `set` into it and immediately receives the demand the previous one left
//! unfulfilled.

use std::sync::Arc;

use parking_lot::Mutex;

use rivulet_core::demand::{validate_request, UNBOUNDED};
use rivulet_core::error::Result;
use rivulet_core::subscription::Subscription;

#[derive(Default)]
struct State {
    current: Option<Arc<dyn Subscription>>,
    outstanding: u64,
    cancelled: bool,
}

#[derive(Default)]
pub struct Arbiter {
    state: Mutex<State>,
}

impl Arbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to `next`, forwarding any unfulfilled demand.
    pub fn set(&self, next: Arc<dyn Subscription>) {
        let outstanding = {
            let mut state = self.state.lock();
            if state.cancelled {
                None
            } else {
                state.current = Some(Arc::clone(&next));
                Some(state.outstanding)
            }
        };
        match outstanding {
            None => next.cancel(),
            Some(0) => {}
            Some(n) => {
                let _ = next.request(n);
            }
        }
    }

    /// One item was delivered downstream.
    pub fn produced(&self) {
        let mut state = self.state.lock();
        if state.outstanding != UNBOUNDED {
            state.outstanding = state.outstanding.saturating_sub(1);
        }
    }

    /// Drop the current upstream without cancelling it (it has terminated).
    pub fn clear(&self) {
        self.state.lock().current = None;
    }

    pub fn outstanding(&self) -> u64 {
        self.state.lock().outstanding
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }
}

impl Subscription for Arbiter {
    fn request(&self, n: u64) -> Result<()> {
        validate_request(n)?;
        let current = {
            let mut state = self.state.lock();
            if state.cancelled {
                return Ok(());
            }
            state.outstanding = state.outstanding.saturating_add(n);
            state.current.clone()
        };
        match current {
            Some(up) => up.request(n),
            None => Ok(()),
        }
    }

    fn cancel(&self) {
        let current = {
            let mut state = self.state.lock();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            state.current.take()
        };
        if let Some(up) = current {
            up.cancel();
        }
    }
}
