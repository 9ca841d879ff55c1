use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Canonical result for rivulet.
pub type Result<T> = std::result::Result<T, FlowError>;

/// Every failure a stream can carry in its `Error` signal, plus the protocol
/// violations reported synchronously to callers.
///
/// Cloneable so fan-out operators (merge, retry) can hand the same cause to
/// several parties.
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    #[error("invalid request: demand must be positive, got {requested}")]
    InvalidRequest { requested: u64 },

    #[error("missing backpressure: buffer capacity of {capacity} exceeded")]
    MissingBackpressure { capacity: usize },

    #[error("user callback failed: {0}")]
    Callback(String),

    #[error("{0}")]
    Upstream(Arc<dyn StdError + Send + Sync>),

    #[error("scheduler rejected task: {0}")]
    Rejected(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl FlowError {
    /// Wrap an arbitrary error raised by a producer.
    pub fn upstream<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        FlowError::Upstream(Arc::new(err))
    }

    /// Producer error carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        FlowError::Upstream(Arc::new(Message(message.into())))
    }

    /// Convert a caught panic payload into a callback failure.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let text = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic with non-string payload".to_string()
        };
        FlowError::Callback(text)
    }

    pub fn is_missing_backpressure(&self) -> bool {
        matches!(self, FlowError::MissingBackpressure { .. })
    }
}

impl From<Box<dyn StdError + Send + Sync>> for FlowError {
    fn from(e: Box<dyn StdError + Send + Sync>) -> Self {
        FlowError::Upstream(Arc::from(e))
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(e: serde_json::Error) -> Self {
        FlowError::Config(e.to_string())
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for Message {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_callback_errors() {
        let err = FlowError::from_panic(Box::new("boom"));
        assert!(matches!(err, FlowError::Callback(ref m) if m == "boom"));

        let err = FlowError::from_panic(Box::new(String::from("owned")));
        assert!(matches!(err, FlowError::Callback(ref m) if m == "owned"));

        let err = FlowError::from_panic(Box::new(7u32));
        assert!(matches!(err, FlowError::Callback(_)));
    }

    #[test]
    fn message_errors_display_verbatim() {
        assert_eq!(FlowError::msg("disk on fire").to_string(), "disk on fire");
    }
}
