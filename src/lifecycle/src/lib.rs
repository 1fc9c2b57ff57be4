//! # Target Lifecycle - Monitoring State Machine
//!
//! Classifies every target into its monitoring lifecycle state from two
//! inputs: per-probe evidence (first response, discovery exhaustion,
//! recovery) and the periodic time-threshold sweep (baseline
//! establishment, down/excluded detection). Owns representative election
//! for customer IPs and the effective-tier mapping that decides the
//! cadence a target actually runs at.
//!
//! Transition rules are pure functions in [`transitions`]; the engine in
//! [`engine`] loads snapshots, applies decisions through the registry's
//! transactional `transition_target_state`, and reports a sweep summary.

pub mod effective_tier;
pub mod engine;
pub mod metrics;
pub mod representative;
pub mod transitions;
pub mod types;

pub use effective_tier::*;
pub use engine::*;
pub use representative::*;
pub use transitions::*;
pub use types::*;
