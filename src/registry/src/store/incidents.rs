//! Incident persistence: insert and full-row save, keyed lookups.

use sqlx::types::Json;
use tracing::debug;

use crate::model::Incident;
use crate::types::{IncidentId, IncidentStatus, RegistryError, RegistryResult};

use super::MetadataRegistry;

impl MetadataRegistry {
    /// The active (non-resolved) incident for a correlation key, if any.
    pub async fn find_active_incident(
        &self,
        correlation_key: &str,
    ) -> RegistryResult<Option<Incident>> {
        let incident = sqlx::query_as::<_, Incident>(
            r#"
            SELECT * FROM incidents
            WHERE correlation_key = $1 AND status <> $2
            ORDER BY detected_at DESC
            LIMIT 1
            "#,
        )
        .bind(correlation_key)
        .bind(IncidentStatus::Resolved.as_str())
        .fetch_optional(self.pool())
        .await?;
        Ok(incident)
    }

    pub async fn insert_incident(&self, incident: &Incident) -> RegistryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO incidents (
                id, incident_type, severity, primary_entity,
                affected_target_ids, affected_agent_ids,
                detected_at, confirmed_at, resolved_at,
                peak_latency_ms, peak_packet_loss, status,
                alert_ids, alert_count, last_alert_at,
                correlation_key, evolution_history
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                    $13, $14, $15, $16, $17)
            "#,
        )
        .bind(incident.id)
        .bind(incident.incident_type.as_str())
        .bind(incident.severity.as_str())
        .bind(&incident.primary_entity)
        .bind(Json(&incident.affected_target_ids))
        .bind(Json(&incident.affected_agent_ids))
        .bind(incident.detected_at)
        .bind(incident.confirmed_at)
        .bind(incident.resolved_at)
        .bind(incident.peak_latency_ms)
        .bind(incident.peak_packet_loss)
        .bind(incident.status.as_str())
        .bind(Json(&incident.alert_ids))
        .bind(incident.alert_count)
        .bind(incident.last_alert_at)
        .bind(&incident.correlation_key)
        .bind(Json(&incident.evolution_history))
        .execute(self.pool())
        .await?;
        debug!(incident = %incident.id, key = %incident.correlation_key, "incident created");
        Ok(())
    }

    /// Save an evolved incident row (affected sets, counts, severity,
    /// status, evolution history).
    pub async fn save_incident(&self, incident: &Incident) -> RegistryResult<()> {
        let done = sqlx::query(
            r#"
            UPDATE incidents SET
                severity = $2, affected_target_ids = $3, affected_agent_ids = $4,
                confirmed_at = $5, resolved_at = $6, peak_latency_ms = $7,
                peak_packet_loss = $8, status = $9, alert_ids = $10,
                alert_count = $11, last_alert_at = $12, evolution_history = $13
            WHERE id = $1
            "#,
        )
        .bind(incident.id)
        .bind(incident.severity.as_str())
        .bind(Json(&incident.affected_target_ids))
        .bind(Json(&incident.affected_agent_ids))
        .bind(incident.confirmed_at)
        .bind(incident.resolved_at)
        .bind(incident.peak_latency_ms)
        .bind(incident.peak_packet_loss)
        .bind(incident.status.as_str())
        .bind(Json(&incident.alert_ids))
        .bind(incident.alert_count)
        .bind(incident.last_alert_at)
        .bind(Json(&incident.evolution_history))
        .execute(self.pool())
        .await?;
        if done.rows_affected() == 0 {
            return Err(RegistryError::NotFound(format!("incident {}", incident.id)));
        }
        Ok(())
    }

    pub async fn get_incident(&self, id: IncidentId) -> RegistryResult<Incident> {
        sqlx::query_as::<_, Incident>("SELECT * FROM incidents WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("incident {id}")))
    }

    pub async fn list_active_incidents(&self) -> RegistryResult<Vec<Incident>> {
        let incidents = sqlx::query_as::<_, Incident>(
            "SELECT * FROM incidents WHERE status <> $1 ORDER BY detected_at DESC",
        )
        .bind(IncidentStatus::Resolved.as_str())
        .fetch_all(self.pool())
        .await?;
        Ok(incidents)
    }
}
