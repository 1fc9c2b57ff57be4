//! # Metadata Registry - Entity Store and Change Feed
//!
//! The registry is the single writer for everything the control plane
//! persists: agents, tiers, subnets, targets, assignments, baselines,
//! per-pair probe state, alerts, incidents, and commands. Workers and API
//! handlers hold cloneable [`MetadataRegistry`] handles; all mutations run
//! inside its transactions.
//!
//! ## Guarantees
//!
//! - Writes are atomic across the entity and its derived tables (state
//!   transitions commit the target row and its history row together).
//! - Any committed change that can alter assignment correctness bumps the
//!   process-wide `assignment_version` exactly once and appends to the
//!   change feed, which the assignment engine polls by `since_version`.
//! - Entities are soft-archived (`archived_at` tombstones); read paths
//!   filter archived rows, history stays queryable.

pub mod metrics;
pub mod model;
pub mod store;
pub mod types;

pub use model::*;
pub use store::{AlertThresholds, MetadataRegistry, ALERT_THRESHOLDS_KEY};
pub use types::*;
