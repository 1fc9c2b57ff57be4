//! Alert entity and its append-only event history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{FromRow, Row};

use super::{decode_enum, decode_enum_opt};
use crate::types::{
    AgentId, AlertEventType, AlertId, AlertSeverity, AlertStatus, AlertType, IncidentId, SubnetId,
    TargetId,
};

/// Denormalized subnet metadata frozen onto the alert at creation time, so
/// operator views survive later subnet edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubnetSnapshot {
    pub subnet_id: SubnetId,
    pub network: String,
    pub subscriber_name: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub pop_name: Option<String>,
}

/// An evolving operator-facing alert for one (target, type, agent) anomaly.
///
/// `agent_id` empty means the alert is target-level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub target_id: TargetId,
    pub target_ip: String,
    pub agent_id: Option<AgentId>,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    pub initial_severity: AlertSeverity,
    /// Highest severity seen over the alert's life; never decreases
    pub peak_severity: AlertSeverity,
    pub initial_latency_ms: Option<f64>,
    pub peak_latency_ms: Option<f64>,
    pub current_latency_ms: Option<f64>,
    pub initial_packet_loss: Option<f64>,
    pub peak_packet_loss: Option<f64>,
    pub current_packet_loss: Option<f64>,
    pub detected_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub incident_id: Option<IncidentId>,
    /// Grouping key for incident rollup, `subnet:<id>` or `target:<id>`
    pub correlation_key: String,
    pub subnet_snapshot: Option<SubnetSnapshot>,
}

impl FromRow<'_, PgRow> for Alert {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let snapshot: Option<Json<SubnetSnapshot>> = row.try_get("subnet_snapshot")?;
        Ok(Self {
            id: row.try_get("id")?,
            target_id: row.try_get("target_id")?,
            target_ip: row.try_get("target_ip")?,
            agent_id: row.try_get("agent_id")?,
            alert_type: decode_enum(row, "alert_type")?,
            severity: decode_enum(row, "severity")?,
            status: decode_enum(row, "status")?,
            initial_severity: decode_enum(row, "initial_severity")?,
            peak_severity: decode_enum(row, "peak_severity")?,
            initial_latency_ms: row.try_get("initial_latency_ms")?,
            peak_latency_ms: row.try_get("peak_latency_ms")?,
            current_latency_ms: row.try_get("current_latency_ms")?,
            initial_packet_loss: row.try_get("initial_packet_loss")?,
            peak_packet_loss: row.try_get("peak_packet_loss")?,
            current_packet_loss: row.try_get("current_packet_loss")?,
            detected_at: row.try_get("detected_at")?,
            last_updated_at: row.try_get("last_updated_at")?,
            acknowledged_at: row.try_get("acknowledged_at")?,
            acknowledged_by: row.try_get("acknowledged_by")?,
            resolved_at: row.try_get("resolved_at")?,
            incident_id: row.try_get("incident_id")?,
            correlation_key: row.try_get("correlation_key")?,
            subnet_snapshot: snapshot.map(|Json(s)| s),
        })
    }
}

/// One append-only alert history event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub alert_id: AlertId,
    pub event_type: AlertEventType,
    pub old_severity: Option<AlertSeverity>,
    pub new_severity: Option<AlertSeverity>,
    pub old_status: Option<AlertStatus>,
    pub new_status: Option<AlertStatus>,
    pub latency_ms: Option<f64>,
    pub packet_loss_pct: Option<f64>,
    /// Worker name or operator identity that caused the event
    pub triggered_by: String,
    pub created_at: DateTime<Utc>,
}

impl FromRow<'_, PgRow> for AlertEvent {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            alert_id: row.try_get("alert_id")?,
            event_type: decode_enum(row, "event_type")?,
            old_severity: decode_enum_opt(row, "old_severity")?,
            new_severity: decode_enum_opt(row, "new_severity")?,
            old_status: decode_enum_opt(row, "old_status")?,
            new_status: decode_enum_opt(row, "new_status")?,
            latency_ms: row.try_get("latency_ms")?,
            packet_loss_pct: row.try_get("packet_loss_pct")?,
            triggered_by: row.try_get("triggered_by")?,
            created_at: row.try_get("created_at")?,
        })
    }
}
