//! Overflow policies for the bounded handoff buffer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FlowError;

/// What a handoff buffer does when items arrive faster than demand drains them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Unbounded queue. Never rejects; memory grows until the consumer catches up.
    #[default]
    Buffer,
    /// Fixed capacity; overflow terminates the stage with `MissingBackpressure`.
    Error,
    /// Fixed capacity; overflow silently discards the incoming item.
    Drop,
    /// One slot; overflow replaces the queued item with the incoming one.
    Latest,
    /// No policy of its own. A downstream `on_backpressure_*` stage decides;
    /// without one, `FlowConfig::missing_fallback` applies.
    Missing,
}

impl OverflowPolicy {
    /// Queue bound under this policy, `None` for unbounded.
    ///
    /// `Missing` has no bound of its own; resolve it first.
    pub fn bound(self, configured: usize) -> Option<usize> {
        match self {
            OverflowPolicy::Buffer => None,
            OverflowPolicy::Latest => Some(1),
            OverflowPolicy::Error | OverflowPolicy::Drop | OverflowPolicy::Missing => {
                Some(configured.max(1))
            }
        }
    }

    /// Replace `Missing` with the fallback chosen by configuration.
    pub fn resolve(self, fallback: OverflowPolicy) -> OverflowPolicy {
        match (self, fallback) {
            (OverflowPolicy::Missing, OverflowPolicy::Missing) => OverflowPolicy::Error,
            (OverflowPolicy::Missing, other) => other,
            (p, _) => p,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OverflowPolicy::Buffer => "buffer",
            OverflowPolicy::Error => "error",
            OverflowPolicy::Drop => "drop",
            OverflowPolicy::Latest => "latest",
            OverflowPolicy::Missing => "missing",
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverflowPolicy {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buffer" => Ok(OverflowPolicy::Buffer),
            "error" => Ok(OverflowPolicy::Error),
            "drop" => Ok(OverflowPolicy::Drop),
            "latest" => Ok(OverflowPolicy::Latest),
            "missing" => Ok(OverflowPolicy::Missing),
            other => Err(FlowError::Config(format!(
                "unknown overflow policy '{}'",
                other
            ))),
        }
    }
}
