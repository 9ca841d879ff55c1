//! Strongly-typed identifiers, used to correlate trace events per stage and
//! per worker thread.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Declares a `u64` newtype with its own process-wide allocator.
macro_rules! counted_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Next unused id. Ids start at 1 and are never reused.
            pub fn next() -> Self {
                static NEXT: AtomicU64 = AtomicU64::new(1);
                Self(NEXT.fetch_add(1, Ordering::Relaxed))
            }

            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

counted_id!(
    /// One handoff buffer or other stateful stage.
    StageId
);
counted_id!(
    /// One scheduler worker thread.
    WorkerId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_per_kind() {
        let a = StageId::next();
        let b = StageId::next();
        assert!(b > a);
        assert_eq!(a.to_string(), format!("StageId({})", a.get()));
    }
}
