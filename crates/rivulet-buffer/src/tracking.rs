//! Queue high-water mark, exposed for diagnostics and tests.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct PeakTracker {
    peak_len: AtomicUsize,
}

impl PeakTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current queue length. Returns true if it set a new peak.
    pub fn record(&self, len: usize) -> bool {
        self.peak_len.fetch_max(len, Ordering::AcqRel) < len
    }

    pub fn peak(&self) -> usize {
        self.peak_len.load(Ordering::Acquire)
    }
}
