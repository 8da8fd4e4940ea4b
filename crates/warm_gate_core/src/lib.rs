//! Shared warm-pool and deployment-gate domain primitives.
//!
//! This crate owns invocation classification, correlation, the soft-deadline
//! budget, smoke-test evaluation and the gate state machine. It intentionally
//! excludes AWS SDK and Lambda runtime concerns.

pub mod budget;
pub mod classify;
pub mod contract;
pub mod correlation;
pub mod gate;
pub mod smoke;
pub mod state;
