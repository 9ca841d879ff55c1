//! Signals flowing downstream.

use crate::error::FlowError;

/// One downstream event. After `Error` or `Complete` nothing else may follow.
#[derive(Debug, Clone)]
pub enum Signal<T> {
    Next(T),
    Error(FlowError),
    Complete,
}

impl<T> Signal<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Signal::Next(_))
    }

    pub fn into_next(self) -> Option<T> {
        match self {
            Signal::Next(v) => Some(v),
            _ => None,
        }
    }
}

/// The terminal half of `Signal`, stored by stages that queue data and the
/// end-of-stream marker separately.
#[derive(Debug, Clone)]
pub enum Terminal {
    Complete,
    Error(FlowError),
}

impl<T> From<Terminal> for Signal<T> {
    fn from(t: Terminal) -> Self {
        match t {
            Terminal::Complete => Signal::Complete,
            Terminal::Error(e) => Signal::Error(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminals_convert_into_terminal_signals() {
        let s: Signal<u8> = Terminal::Complete.into();
        assert!(s.is_terminal());
        let s: Signal<u8> = Terminal::Error(FlowError::msg("x")).into();
        assert!(matches!(s, Signal::Error(_)));
        assert_eq!(Signal::Next(3u8).into_next(), Some(3));
    }
}
