//! Shared types used across the reconciliation workspace.

pub mod clock;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use types::AggregateId;
