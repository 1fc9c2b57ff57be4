//! # Assignment Engine - Target-to-Agent Planning
//!
//! Maps every monitorable target to a set of agents under its tier's
//! selection policy, subject to per-agent capacity, (region, provider)
//! diversity, and sticky tie-breaking. Handles failover when agents go
//! offline and minimal-churn rebalancing when they recover.
//!
//! ## Architecture
//!
//! Selection is a pure function over snapshots ([`planner`]); the engine
//! ([`engine`]) loads snapshots from the registry, diffs desired against
//! current, and applies batched inserts/deletes with a single version bump
//! per pass. Passes are serialized by a process-wide mutex; full
//! materializations are additionally single-flight.

pub mod delta;
pub mod engine;
pub mod metrics;
pub mod planner;
pub mod types;

pub use delta::*;
pub use engine::*;
pub use planner::*;
pub use types::*;
