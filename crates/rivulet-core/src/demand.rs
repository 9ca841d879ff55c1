//! Outstanding-demand counter shared by a producer and its consumer.
//!
//! The consumer adds with `add` (via `Subscription::request`); the producer
//! takes one unit per delivered `Next` with `try_consume`. `UNBOUNDED` is a
//! sticky ceiling: once reached, consumption no longer decrements.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{FlowError, Result};

/// Demand value that disables flow-control accounting.
pub const UNBOUNDED: u64 = u64::MAX;

#[derive(Debug, Default)]
pub struct Demand {
    requested: AtomicU64,
}

impl Demand {
    pub const fn new() -> Self {
        Self {
            requested: AtomicU64::new(0),
        }
    }

    /// Add `n` to the outstanding demand, saturating at `UNBOUNDED`.
    ///
    /// Returns the demand *before* the addition so callers can detect the
    /// zero-to-positive transition that must resume a parked producer.
    pub fn add(&self, n: u64) -> Result<u64> {
        validate_request(n)?;
        let mut cur = self.requested.load(Ordering::Acquire);
        loop {
            if cur == UNBOUNDED {
                return Ok(cur);
            }
            let next = cur.saturating_add(n);
            match self
                .requested
                .compare_exchange(cur, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(cur),
                Err(observed) => cur = observed,
            }
        }
    }

    /// Take one unit of demand. Returns false (and changes nothing) at zero.
    pub fn try_consume(&self) -> bool {
        let mut cur = self.requested.load(Ordering::Acquire);
        loop {
            if cur == 0 {
                return false;
            }
            if cur == UNBOUNDED {
                return true;
            }
            match self.requested.compare_exchange(
                cur,
                cur - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => cur = observed,
            }
        }
    }

    pub fn current(&self) -> u64 {
        self.requested.load(Ordering::Acquire)
    }

    pub fn has_demand(&self) -> bool {
        self.current() > 0
    }

    pub fn is_unbounded(&self) -> bool {
        self.current() == UNBOUNDED
    }
}

/// Reject non-positive requests before they reach a producer.
pub fn validate_request(n: u64) -> Result<()> {
    if n == 0 {
        return Err(FlowError::InvalidRequest { requested: n });
    }
    Ok(())
}
