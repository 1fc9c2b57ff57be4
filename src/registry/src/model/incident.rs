//! Incident entity: correlated alert rollup by blast-radius key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{FromRow, Row};

use super::decode_enum;
use crate::types::{AgentId, AlertId, IncidentId, IncidentSeverity, IncidentStatus, IncidentType, TargetId};

/// One step of an incident's evolution, kept as an embedded JSON log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentEvolution {
    pub at: DateTime<Utc>,
    /// e.g. "created", "alert_linked", "severity_raised", "resolved"
    pub event: String,
    pub detail: serde_json::Value,
}

/// A correlated group of alerts sharing a blast-radius key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    pub incident_type: IncidentType,
    pub severity: IncidentSeverity,
    /// The entity at the center of the blast radius (subnet/target/agent id)
    pub primary_entity: String,
    pub affected_target_ids: Vec<TargetId>,
    pub affected_agent_ids: Vec<AgentId>,
    pub detected_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub peak_latency_ms: Option<f64>,
    pub peak_packet_loss: Option<f64>,
    pub status: IncidentStatus,
    pub alert_ids: Vec<AlertId>,
    pub alert_count: i32,
    pub last_alert_at: Option<DateTime<Utc>>,
    pub correlation_key: String,
    pub evolution_history: Vec<IncidentEvolution>,
}

impl FromRow<'_, PgRow> for Incident {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let Json(affected_target_ids): Json<Vec<TargetId>> = row.try_get("affected_target_ids")?;
        let Json(affected_agent_ids): Json<Vec<AgentId>> = row.try_get("affected_agent_ids")?;
        let Json(alert_ids): Json<Vec<AlertId>> = row.try_get("alert_ids")?;
        let Json(evolution_history): Json<Vec<IncidentEvolution>> =
            row.try_get("evolution_history")?;
        Ok(Self {
            id: row.try_get("id")?,
            incident_type: decode_enum(row, "incident_type")?,
            severity: decode_enum(row, "severity")?,
            primary_entity: row.try_get("primary_entity")?,
            affected_target_ids,
            affected_agent_ids,
            detected_at: row.try_get("detected_at")?,
            confirmed_at: row.try_get("confirmed_at")?,
            resolved_at: row.try_get("resolved_at")?,
            peak_latency_ms: row.try_get("peak_latency_ms")?,
            peak_packet_loss: row.try_get("peak_packet_loss")?,
            status: decode_enum(row, "status")?,
            alert_ids,
            alert_count: row.try_get("alert_count")?,
            last_alert_at: row.try_get("last_alert_at")?,
            correlation_key: row.try_get("correlation_key")?,
            evolution_history,
        })
    }
}
