//! Engine-wide tunables, serializable and overridable from the environment.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};
use crate::policy::OverflowPolicy;

/// Default handoff buffer capacity (slots).
pub const DEFAULT_BUFFER_CAPACITY: usize = 128;

/// Drained items after which a prefetching buffer replenishes upstream demand.
pub const DEFAULT_REPLENISH_THRESHOLD: usize = 95;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Capacity of bounded handoff buffers and the prefetch of `observe_on`.
    pub buffer_capacity: usize,

    /// Batched replenishment threshold; must not exceed `buffer_capacity`.
    pub replenish_threshold: usize,

    /// Policy applied by `Missing` stages when no downstream policy absorbs
    /// the overflow.
    pub missing_fallback: OverflowPolicy,

    /// Worker count of the compute pool.
    pub compute_threads: usize,

    /// Idle time after which an I/O pool worker retires.
    pub io_keep_alive_ms: u64,

    /// Prefix for worker thread names.
    pub thread_name_prefix: String,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            replenish_threshold: DEFAULT_REPLENISH_THRESHOLD,
            missing_fallback: OverflowPolicy::Error,
            compute_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            io_keep_alive_ms: 60_000,
            thread_name_prefix: "rivulet".to_string(),
        }
    }
}

static GLOBAL: Lazy<FlowConfig> = Lazy::new(|| {
    let cfg = FlowConfig::from_env();
    match cfg.validate() {
        Ok(()) => cfg,
        Err(_) => FlowConfig::default(),
    }
});

impl FlowConfig {
    /// Process-wide configuration, read from the environment on first use.
    pub fn global() -> &'static FlowConfig {
        &GLOBAL
    }

    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `RIVULET_BUFFER_CAPACITY`: handoff buffer capacity
    /// - `RIVULET_REPLENISH_THRESHOLD`: batched replenishment threshold
    /// - `RIVULET_MISSING_FALLBACK`: buffer|error|drop|latest
    /// - `RIVULET_COMPUTE_THREADS`: compute pool size
    /// - `RIVULET_IO_KEEP_ALIVE_MS`: idle I/O worker lifetime
    /// - `RIVULET_THREAD_PREFIX`: worker thread name prefix
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("RIVULET_BUFFER_CAPACITY") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.buffer_capacity = v;
            }
        }

        if let Ok(s) = std::env::var("RIVULET_REPLENISH_THRESHOLD") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.replenish_threshold = v;
            }
        }

        if let Ok(s) = std::env::var("RIVULET_MISSING_FALLBACK") {
            if let Ok(v) = s.parse::<OverflowPolicy>() {
                cfg.missing_fallback = v;
            }
        }

        if let Ok(s) = std::env::var("RIVULET_COMPUTE_THREADS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.compute_threads = v;
            }
        }

        if let Ok(s) = std::env::var("RIVULET_IO_KEEP_ALIVE_MS") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.io_keep_alive_ms = v;
            }
        }

        if let Ok(s) = std::env::var("RIVULET_THREAD_PREFIX") {
            cfg.thread_name_prefix = s;
        }

        cfg
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let cfg: FlowConfig = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(FlowError::Config("buffer_capacity must be positive".into()));
        }
        if self.replenish_threshold == 0 || self.replenish_threshold > self.buffer_capacity {
            return Err(FlowError::Config(format!(
                "replenish_threshold must be in 1..={}, got {}",
                self.buffer_capacity, self.replenish_threshold
            )));
        }
        if self.compute_threads == 0 {
            return Err(FlowError::Config("compute_threads must be positive".into()));
        }
        if self.missing_fallback == OverflowPolicy::Missing {
            return Err(FlowError::Config(
                "missing_fallback cannot itself be 'missing'".into(),
            ));
        }
        Ok(())
    }

    /// Threshold clamped to a buffer of `capacity` slots.
    pub fn threshold_for(&self, capacity: usize) -> usize {
        self.replenish_threshold.min(capacity).max(1)
    }
}
