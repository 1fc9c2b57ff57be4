//! # Assignment Engine Types
//!
//! Planner inputs are immutable snapshots so selection stays a pure
//! function: same fleet, same load, same target set, same plan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use registry_metadata::{
    Agent, AgentId, PlanApplied, RegistryError, SelectionPolicy, SubnetId, TargetId,
};

/// Probe executor every tier currently requires.
pub const ICMP_EXECUTOR: &str = "icmp";

/// What the planner needs to know about one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSpec {
    pub target_id: TargetId,
    pub subnet_id: Option<SubnetId>,
    /// The cadence the target actually runs at (after lifecycle overrides)
    pub effective_tier: String,
    /// Policy of the effective tier; None means the target must not be
    /// probed and existing assignments are removed
    pub policy: Option<SelectionPolicy>,
    /// Probe executor candidates must support
    pub required_executor: String,
}

/// What the planner needs to know about one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub agent_id: AgentId,
    pub region: String,
    pub provider: String,
    pub max_targets: i64,
    pub executors: Vec<String>,
    /// Derived status was `active` at snapshot time
    pub active: bool,
}

impl AgentSnapshot {
    /// Snapshot an agent at `now`, deriving its status once.
    pub fn from_agent(agent: &Agent, now: DateTime<Utc>) -> Self {
        Self {
            agent_id: agent.id,
            region: agent.region.clone(),
            provider: agent.provider.clone(),
            max_targets: agent.max_targets as i64,
            executors: agent.executors.clone(),
            active: agent.status_at(now) == registry_metadata::AgentStatus::Active,
        }
    }
}

/// Desired agent set for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub desired: Vec<AgentId>,
    /// Policy wanted more agents than the fleet could provide
    pub under_assigned: bool,
}

/// Outcome of one planner pass.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub applied: PlanApplied,
    /// Targets below their policy count after the pass
    pub under_assigned: Vec<TargetId>,
    /// Previously monitored targets left with zero assignments; these
    /// deserve an agent_down-style alert
    pub orphaned: Vec<TargetId>,
    /// Per-target spec failures skipped without aborting the pass
    pub skipped: usize,
}

/// Error types for the assignment engine
#[derive(Debug, Error)]
pub enum AssignmentError {
    /// Registry failures pass through unchanged
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A full materialization is already in flight
    #[error("assignment materialization already in progress")]
    Busy,
}

/// Convenience result alias for assignment operations
pub type AssignmentResult<T> = Result<T, AssignmentError>;
