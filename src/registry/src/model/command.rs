//! One-shot agent commands and their per-agent results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{FromRow, Row};

use super::decode_enum;
use crate::types::{AgentId, CommandId, CommandStatus, TargetId};

/// A one-shot operation fanned out to a set of agents (e.g. an mtr run).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: CommandId,
    /// Command type understood by the agent executor, e.g. "mtr"
    pub command_type: String,
    pub target_id: TargetId,
    pub target_ip: String,
    pub params: serde_json::Value,
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Overall status aggregated over the per-agent deliveries
    pub status: CommandStatus,
    pub assigned_agent_ids: Vec<AgentId>,
}

impl FromRow<'_, PgRow> for Command {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let Json(params): Json<serde_json::Value> = row.try_get("params")?;
        let Json(assigned_agent_ids): Json<Vec<AgentId>> = row.try_get("assigned_agent_ids")?;
        Ok(Self {
            id: row.try_get("id")?,
            command_type: row.try_get("command_type")?,
            target_id: row.try_get("target_id")?,
            target_ip: row.try_get("target_ip")?,
            params,
            requested_by: row.try_get("requested_by")?,
            requested_at: row.try_get("requested_at")?,
            expires_at: row.try_get("expires_at")?,
            status: decode_enum(row, "status")?,
            assigned_agent_ids,
        })
    }
}

/// Delivery state of a command for one assigned agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandDelivery {
    pub command_id: CommandId,
    pub agent_id: AgentId,
    pub status: CommandStatus,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl FromRow<'_, PgRow> for CommandDelivery {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            command_id: row.try_get("command_id")?,
            agent_id: row.try_get("agent_id")?,
            status: decode_enum(row, "status")?,
            delivered_at: row.try_get("delivered_at")?,
        })
    }
}

/// An agent's result for a command; at most one stored per (command, agent).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CommandResult {
    pub command_id: CommandId,
    pub agent_id: AgentId,
    pub success: bool,
    pub error: Option<String>,
    /// Opaque executor output, e.g. the raw mtr report
    pub payload: Vec<u8>,
    pub duration_ms: i64,
    pub completed_at: DateTime<Utc>,
}
