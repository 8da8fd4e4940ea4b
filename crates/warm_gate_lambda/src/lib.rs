//! Lambda-facing half of the warm gate: invocation dispatch, warm-pool fan-out
//! and the CodeDeploy traffic hooks.
//!
//! Pure contracts and state live in `warm_gate_core`; this crate owns the AWS
//! adapters, configuration, and the handlers wired up by the binaries in
//! `src/bin`.

pub mod adapters;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
