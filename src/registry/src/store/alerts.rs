//! Alert persistence. Alert rows evolve in place; every evolution commits
//! together with its append-only event row.

use chrono::Utc;
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};
use tracing::debug;

use crate::model::{Alert, AlertEvent};
use crate::types::{
    AgentId, AlertEventType, AlertId, AlertStatus, AlertType, IncidentId, RegistryError,
    RegistryResult, TargetId,
};

use super::MetadataRegistry;

impl MetadataRegistry {
    /// The active (non-resolved) alert for a (target, type, agent) triple;
    /// `agent_id` None matches target-level alerts only.
    pub async fn find_active_alert(
        &self,
        target_id: TargetId,
        alert_type: AlertType,
        agent_id: Option<AgentId>,
    ) -> RegistryResult<Option<Alert>> {
        let alert = sqlx::query_as::<_, Alert>(
            r#"
            SELECT * FROM alerts
            WHERE target_id = $1
              AND alert_type = $2
              AND agent_id IS NOT DISTINCT FROM $3
              AND status <> $4
            LIMIT 1
            "#,
        )
        .bind(target_id)
        .bind(alert_type.as_str())
        .bind(agent_id)
        .bind(AlertStatus::Resolved.as_str())
        .fetch_optional(self.pool())
        .await?;
        Ok(alert)
    }

    /// Persist a newly created alert together with its `created` event.
    pub async fn insert_alert(&self, alert: &Alert, event: &AlertEvent) -> RegistryResult<()> {
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            r#"
            INSERT INTO alerts (
                id, target_id, target_ip, agent_id, alert_type, severity, status,
                initial_severity, peak_severity,
                initial_latency_ms, peak_latency_ms, current_latency_ms,
                initial_packet_loss, peak_packet_loss, current_packet_loss,
                detected_at, last_updated_at, acknowledged_at, acknowledged_by,
                resolved_at, incident_id, correlation_key, subnet_snapshot
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                    $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)
            "#,
        )
        .bind(alert.id)
        .bind(alert.target_id)
        .bind(&alert.target_ip)
        .bind(alert.agent_id)
        .bind(alert.alert_type.as_str())
        .bind(alert.severity.as_str())
        .bind(alert.status.as_str())
        .bind(alert.initial_severity.as_str())
        .bind(alert.peak_severity.as_str())
        .bind(alert.initial_latency_ms)
        .bind(alert.peak_latency_ms)
        .bind(alert.current_latency_ms)
        .bind(alert.initial_packet_loss)
        .bind(alert.peak_packet_loss)
        .bind(alert.current_packet_loss)
        .bind(alert.detected_at)
        .bind(alert.last_updated_at)
        .bind(alert.acknowledged_at)
        .bind(&alert.acknowledged_by)
        .bind(alert.resolved_at)
        .bind(alert.incident_id)
        .bind(&alert.correlation_key)
        .bind(alert.subnet_snapshot.as_ref().map(Json))
        .execute(&mut *tx)
        .await?;

        insert_event(&mut tx, event).await?;
        tx.commit().await?;
        debug!(alert = %alert.id, target = %alert.target_id, "alert created");
        Ok(())
    }

    /// Persist an evolved alert row together with the event describing the
    /// evolution (escalated / de_escalated / metrics_updated / resolved).
    pub async fn save_alert_evolution(
        &self,
        alert: &Alert,
        event: &AlertEvent,
    ) -> RegistryResult<()> {
        let mut tx = self.pool().begin().await?;

        let done = sqlx::query(
            r#"
            UPDATE alerts SET
                severity = $2, status = $3, peak_severity = $4,
                peak_latency_ms = $5, current_latency_ms = $6,
                peak_packet_loss = $7, current_packet_loss = $8,
                last_updated_at = $9, acknowledged_at = $10, acknowledged_by = $11,
                resolved_at = $12, incident_id = $13
            WHERE id = $1
            "#,
        )
        .bind(alert.id)
        .bind(alert.severity.as_str())
        .bind(alert.status.as_str())
        .bind(alert.peak_severity.as_str())
        .bind(alert.peak_latency_ms)
        .bind(alert.current_latency_ms)
        .bind(alert.peak_packet_loss)
        .bind(alert.current_packet_loss)
        .bind(alert.last_updated_at)
        .bind(alert.acknowledged_at)
        .bind(&alert.acknowledged_by)
        .bind(alert.resolved_at)
        .bind(alert.incident_id)
        .execute(&mut *tx)
        .await?;
        if done.rows_affected() == 0 {
            return Err(RegistryError::NotFound(format!("alert {}", alert.id)));
        }

        insert_event(&mut tx, event).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Operator acknowledgement.
    pub async fn acknowledge_alert(&self, id: AlertId, by: &str) -> RegistryResult<Alert> {
        let now = Utc::now();
        let mut tx = self.pool().begin().await?;

        let alert = sqlx::query_as::<_, Alert>(
            r#"
            UPDATE alerts
            SET status = $2, acknowledged_at = $3, acknowledged_by = $4, last_updated_at = $3
            WHERE id = $1 AND status = $5
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(AlertStatus::Acknowledged.as_str())
        .bind(now)
        .bind(by)
        .bind(AlertStatus::Active.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| RegistryError::Conflict(format!("alert {id} is not active")))?;

        let event = AlertEvent {
            alert_id: id,
            event_type: AlertEventType::Acknowledged,
            old_severity: None,
            new_severity: None,
            old_status: Some(AlertStatus::Active),
            new_status: Some(AlertStatus::Acknowledged),
            latency_ms: None,
            packet_loss_pct: None,
            triggered_by: by.to_string(),
            created_at: now,
        };
        insert_event(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(alert)
    }

    /// Attach a group of alerts to an incident, one event per alert.
    pub async fn link_alerts_to_incident(
        &self,
        alert_ids: &[AlertId],
        incident_id: IncidentId,
        triggered_by: &str,
    ) -> RegistryResult<()> {
        let now = Utc::now();
        let mut tx = self.pool().begin().await?;

        for alert_id in alert_ids {
            sqlx::query("UPDATE alerts SET incident_id = $2, last_updated_at = $3 WHERE id = $1")
                .bind(alert_id)
                .bind(incident_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;

            let event = AlertEvent {
                alert_id: *alert_id,
                event_type: AlertEventType::LinkedToIncident,
                old_severity: None,
                new_severity: None,
                old_status: None,
                new_status: None,
                latency_ms: None,
                packet_loss_pct: None,
                triggered_by: triggered_by.to_string(),
                created_at: now,
            };
            insert_event(&mut tx, &event).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_alert(&self, id: AlertId) -> RegistryResult<Alert> {
        sqlx::query_as::<_, Alert>("SELECT * FROM alerts WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("alert {id}")))
    }

    pub async fn list_active_alerts(&self) -> RegistryResult<Vec<Alert>> {
        let alerts = sqlx::query_as::<_, Alert>(
            "SELECT * FROM alerts WHERE status <> $1 ORDER BY detected_at DESC",
        )
        .bind(AlertStatus::Resolved.as_str())
        .fetch_all(self.pool())
        .await?;
        Ok(alerts)
    }

    /// Active alerts not yet attached to an incident; phase-3 input.
    pub async fn list_active_unlinked_alerts(&self) -> RegistryResult<Vec<Alert>> {
        let alerts = sqlx::query_as::<_, Alert>(
            "SELECT * FROM alerts WHERE status <> $1 AND incident_id IS NULL",
        )
        .bind(AlertStatus::Resolved.as_str())
        .fetch_all(self.pool())
        .await?;
        Ok(alerts)
    }

    /// Targets currently carrying at least one active alert; phase-2 input.
    pub async fn target_ids_with_active_alerts(&self) -> RegistryResult<Vec<TargetId>> {
        let rows = sqlx::query("SELECT DISTINCT target_id FROM alerts WHERE status <> $1")
            .bind(AlertStatus::Resolved.as_str())
            .fetch_all(self.pool())
            .await?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(row.try_get("target_id")?);
        }
        Ok(ids)
    }

    pub async fn active_alerts_for_target(&self, target_id: TargetId) -> RegistryResult<Vec<Alert>> {
        let alerts = sqlx::query_as::<_, Alert>(
            "SELECT * FROM alerts WHERE target_id = $1 AND status <> $2",
        )
        .bind(target_id)
        .bind(AlertStatus::Resolved.as_str())
        .fetch_all(self.pool())
        .await?;
        Ok(alerts)
    }

    pub async fn alert_events(&self, alert_id: AlertId, limit: i64) -> RegistryResult<Vec<AlertEvent>> {
        let events = sqlx::query_as::<_, AlertEvent>(
            r#"
            SELECT alert_id, event_type, old_severity, new_severity, old_status,
                   new_status, latency_ms, packet_loss_pct, triggered_by, created_at
            FROM alert_events
            WHERE alert_id = $1
            ORDER BY created_at ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(alert_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(events)
    }
}

async fn insert_event(
    tx: &mut Transaction<'_, Postgres>,
    event: &AlertEvent,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO alert_events (
            alert_id, event_type, old_severity, new_severity, old_status,
            new_status, latency_ms, packet_loss_pct, triggered_by, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(event.alert_id)
    .bind(event.event_type.as_str())
    .bind(event.old_severity.map(|s| s.as_str()))
    .bind(event.new_severity.map(|s| s.as_str()))
    .bind(event.old_status.map(|s| s.as_str()))
    .bind(event.new_status.map(|s| s.as_str()))
    .bind(event.latency_ms)
    .bind(event.packet_loss_pct)
    .bind(&event.triggered_by)
    .bind(event.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
