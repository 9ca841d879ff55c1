//! Convenient re-exports for downstream crates.

pub use crate::config::FlowConfig;
pub use crate::demand::{Demand, UNBOUNDED};
pub use crate::disposable::{
    ActionDisposable, BooleanDisposable, CompositeDisposable, Disposable, SwapDisposable,
};
pub use crate::error::{FlowError, Result};
pub use crate::id::{StageId, WorkerId};
pub use crate::policy::OverflowPolicy;
pub use crate::scheduler::{Scheduler, Task};
pub use crate::signal::{Signal, Terminal};
pub use crate::subscription::{EmptySubscription, Subscriber, Subscription};
