//! Store capabilities consumed by the control plane
//!
//! - Control-state log: append-only pause/resume history with a serialized
//!   lock-check-append transition
//! - Decision store: agent decisions and the two retrieval queries used by
//!   similarity search

pub mod control_log;
pub mod decisions;

pub use control_log::{ControlStateStore, TransitionPlanner};
pub use decisions::DecisionStore;

#[cfg(test)]
pub use decisions::MockDecisionStore;
