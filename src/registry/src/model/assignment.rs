//! Assignment entity: which agent probes which target, and why.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use uuid::Uuid;

use super::decode_enum;
use crate::types::{AgentId, AssignedBy, ChangeKind, EntityKind, TargetId};

/// A (target, agent) probing relationship under a tier.
///
/// Unique per (target_id, agent_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub target_id: TargetId,
    pub agent_id: AgentId,
    pub tier: String,
    pub assigned_at: DateTime<Utc>,
    pub assigned_by: AssignedBy,
}

impl FromRow<'_, PgRow> for Assignment {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            target_id: row.try_get("target_id")?,
            agent_id: row.try_get("agent_id")?,
            tier: row.try_get("tier")?,
            assigned_at: row.try_get("assigned_at")?,
            assigned_by: decode_enum(row, "assigned_by")?,
        })
    }
}

/// An assignment to be written by a planner pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAssignment {
    pub target_id: TargetId,
    pub agent_id: AgentId,
    pub tier: String,
    pub assigned_by: AssignedBy,
}

/// Outcome of applying a planner pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanApplied {
    pub inserted: u64,
    pub deleted: u64,
    /// Version after the pass; unchanged when the plan was empty
    pub version: i64,
}

/// Append-only record of assignment churn, kept for failover forensics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentHistoryEntry {
    pub target_id: TargetId,
    pub agent_id: AgentId,
    /// "assigned" or "unassigned"
    pub action: String,
    pub assigned_by: AssignedBy,
    pub occurred_at: DateTime<Utc>,
}

impl FromRow<'_, PgRow> for AssignmentHistoryEntry {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            target_id: row.try_get("target_id")?,
            agent_id: row.try_get("agent_id")?,
            action: row.try_get("action")?,
            assigned_by: decode_enum(row, "assigned_by")?,
            occurred_at: row.try_get("occurred_at")?,
        })
    }
}

/// One row of the registry change feed, polled by `since_version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityChange {
    /// The assignment_version this change committed under
    pub version: i64,
    pub entity_kind: EntityKind,
    /// Entity id as text; tiers are identified by name
    pub entity_id: String,
    pub change: ChangeKind,
    pub occurred_at: DateTime<Utc>,
}

impl FromRow<'_, PgRow> for EntityChange {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            version: row.try_get("version")?,
            entity_kind: decode_enum(row, "entity_kind")?,
            entity_id: row.try_get("entity_id")?,
            change: decode_enum(row, "change_kind")?,
            occurred_at: row.try_get("occurred_at")?,
        })
    }
}
