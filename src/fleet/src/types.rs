//! # Fleet Gateway Types
//!
//! Heartbeat payloads, transition events, and the fleet error type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use registry_metadata::{AgentId, RegistryError};

/// Heartbeat body posted by an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    /// Resource metrics sampled by the agent
    pub cpu_pct: f64,
    pub memory_pct: f64,
    /// Targets the agent is actively probing
    pub active_targets: i32,
    pub probes_per_second: f64,
    /// Highest assignment_version the agent has applied
    pub assignment_version: i64,
    /// Recent agent-side error strings, logged but not persisted per line
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Control plane's answer to a heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    /// Current assignment version; the agent re-fetches when it trails
    pub assignment_version: i64,
    /// True when assignments changed since the version the agent reported
    pub assignments_changed: bool,
    /// Undelivered one-shot commands waiting for the agent
    pub pending_commands_count: i64,
}

/// Agent status transition raised by the heartbeat sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentTransition {
    /// A previously reachable agent went offline
    Offline(AgentId),
    /// An offline (or brand new) agent became active
    Recovered(AgentId),
}

impl AgentTransition {
    pub fn agent_id(&self) -> AgentId {
        match self {
            Self::Offline(id) | Self::Recovered(id) => *id,
        }
    }
}

/// Request to fan a one-shot command out to agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Executor-recognized command type, e.g. "mtr"
    pub command_type: String,
    pub target_id: registry_metadata::TargetId,
    #[serde(default)]
    pub params: serde_json::Value,
    pub requested_by: String,
    /// Explicit agent set; defaults to the target's current assignees
    #[serde(default)]
    pub agent_ids: Option<Vec<AgentId>>,
}

/// Result body posted by an agent for one command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResultPayload {
    pub success: bool,
    pub error: Option<String>,
    /// Opaque executor output
    #[serde(default)]
    pub payload: Vec<u8>,
    pub duration_ms: i64,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Error types for the fleet gateway
#[derive(Debug, Error)]
pub enum FleetError {
    /// Registry failures pass through unchanged
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Input failed validation before touching the registry
    #[error("validation error: {0}")]
    Validation(String),

    /// Operation conflicts with current fleet state
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Convenience result alias for fleet operations
pub type FleetResult<T> = Result<T, FleetError>;
