//! The periodic alert/incident cycle.
//!
//! Phase 1 turns current anomalies into new or evolved alerts, phase 2
//! resolves alerts whose targets have a fully healthy recent window, phase
//! 3 rolls active unlinked alerts into incidents by correlation key.

use chrono::Utc;
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use registry_metadata::{
    Alert, AlertEvent, AlertEventType, AlertSeverity, AlertStatus, AlertThresholds, AlertType,
    Incident, IncidentEvolution, IncidentSeverity, IncidentStatus, IncidentType, MetadataRegistry,
    PairStatus, SubnetSnapshot, Target, TargetId,
};

use crate::metrics;
use crate::severity::{evaluate_anomalies, evolve_alert, incident_severity_for};
use crate::types::{correlation_key, AlertResult, CycleSummary, ALERT_WORKER_IDENTITY};

/// The worst observation for one (target, alert type) this cycle.
#[derive(Debug, Clone, Copy)]
struct Observation {
    severity: AlertSeverity,
    latency_ms: Option<f64>,
    packet_loss: Option<f64>,
}

pub struct AlertPipeline {
    registry: MetadataRegistry,
}

impl AlertPipeline {
    pub fn new(registry: MetadataRegistry) -> Self {
        Self { registry }
    }

    /// One full cycle under the given (hot-reloadable) thresholds.
    pub async fn run_cycle(&self, thresholds: &AlertThresholds) -> AlertResult<CycleSummary> {
        let mut summary = CycleSummary::default();

        self.phase_anomalies(thresholds, &mut summary).await?;
        self.phase_security(&mut summary).await?;
        self.phase_resolution(thresholds, &mut summary).await?;
        self.phase_correlation(thresholds, &mut summary).await?;

        metrics::CYCLES_TOTAL.inc();
        info!(
            created = summary.alerts_created,
            escalated = summary.escalated,
            de_escalated = summary.de_escalated,
            resolved = summary.resolved,
            incidents = summary.incidents_created,
            linked = summary.alerts_linked,
            errors = summary.errors,
            "alert cycle finished"
        );
        Ok(summary)
    }

    /// Phase 1: anomalies to alerts.
    async fn phase_anomalies(
        &self,
        thresholds: &AlertThresholds,
        summary: &mut CycleSummary,
    ) -> AlertResult<()> {
        let states = self.registry.list_unhealthy_states().await?;

        // several agents can observe the same target; alerting is
        // target-level, so keep the worst observation per (target, type)
        let mut observations: HashMap<(TargetId, AlertType), Observation> = HashMap::new();
        for state in &states {
            for (alert_type, severity) in evaluate_anomalies(state, thresholds) {
                let candidate = Observation {
                    severity,
                    latency_ms: state.current_latency_ms,
                    packet_loss: state.current_packet_loss,
                };
                observations
                    .entry((state.target_id, alert_type))
                    .and_modify(|existing| {
                        if severity.rank() > existing.severity.rank() {
                            *existing = candidate;
                        }
                    })
                    .or_insert(candidate);
            }
        }

        let mut targets: HashMap<TargetId, Target> = HashMap::new();
        for (target_id, _) in observations.keys() {
            if !targets.contains_key(target_id) {
                match self.registry.get_target(*target_id).await {
                    Ok(target) if target.archived_at.is_none() => {
                        targets.insert(*target_id, target);
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(target = %target_id, error = %err, "target lookup failed in alert cycle");
                        summary.errors += 1;
                    }
                }
            }
        }

        let now = Utc::now();
        for ((target_id, alert_type), obs) in observations {
            let Some(target) = targets.get(&target_id) else {
                continue;
            };
            // a security probe failing to answer is the expected outcome,
            // not an availability problem
            if target.expected_outcome == Some(false) {
                continue;
            }

            let outcome = match self
                .registry
                .find_active_alert(target_id, alert_type, None)
                .await
            {
                Ok(Some(mut alert)) => {
                    if let Some(event) = evolve_alert(
                        &mut alert,
                        obs.severity,
                        obs.latency_ms,
                        obs.packet_loss,
                        ALERT_WORKER_IDENTITY,
                        now,
                    ) {
                        match event.event_type {
                            AlertEventType::Escalated => summary.escalated += 1,
                            AlertEventType::DeEscalated => summary.de_escalated += 1,
                            _ => summary.metrics_updated += 1,
                        }
                        self.registry
                            .save_alert_evolution(&alert, &event)
                            .await
                            .map_err(Into::into)
                    } else {
                        Ok(())
                    }
                }
                Ok(None) => {
                    let result = self.create_alert(target, alert_type, obs, now).await;
                    if result.is_ok() {
                        summary.alerts_created += 1;
                        metrics::ALERTS_CREATED_TOTAL.inc();
                    }
                    result
                }
                Err(err) => Err(err.into()),
            };

            if let Err(err) = outcome {
                warn!(target = %target_id, alert_type = %alert_type, error = %err, "alert upsert failed");
                summary.errors += 1;
            }
        }
        Ok(())
    }

    async fn create_alert(
        &self,
        target: &Target,
        alert_type: AlertType,
        obs: Observation,
        now: chrono::DateTime<Utc>,
    ) -> AlertResult<()> {
        let subnet_snapshot = match target.subnet_id {
            Some(subnet_id) => match self.registry.get_subnet(subnet_id).await {
                Ok(subnet) => Some(SubnetSnapshot {
                    subnet_id,
                    network: subnet.network,
                    subscriber_name: subnet.subscriber_name,
                    city: subnet.city,
                    region: subnet.region,
                    pop_name: subnet.pop_name,
                }),
                Err(_) => None,
            },
            None => None,
        };

        let alert = Alert {
            id: Uuid::new_v4(),
            target_id: target.id,
            target_ip: target.ip.clone(),
            agent_id: None,
            alert_type,
            severity: obs.severity,
            status: AlertStatus::Active,
            initial_severity: obs.severity,
            peak_severity: obs.severity,
            initial_latency_ms: obs.latency_ms,
            peak_latency_ms: obs.latency_ms,
            current_latency_ms: obs.latency_ms,
            initial_packet_loss: obs.packet_loss,
            peak_packet_loss: obs.packet_loss,
            current_packet_loss: obs.packet_loss,
            detected_at: now,
            last_updated_at: now,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            incident_id: None,
            correlation_key: correlation_key(target.subnet_id, target.id),
            subnet_snapshot,
        };
        let event = AlertEvent {
            alert_id: alert.id,
            event_type: AlertEventType::Created,
            old_severity: None,
            new_severity: Some(obs.severity),
            old_status: None,
            new_status: Some(AlertStatus::Active),
            latency_ms: obs.latency_ms,
            packet_loss_pct: obs.packet_loss,
            triggered_by: ALERT_WORKER_IDENTITY.to_string(),
            created_at: now,
        };
        self.registry.insert_alert(&alert, &event).await?;
        Ok(())
    }

    /// Raise (or keep) a critical agent_down alert for a target the
    /// assignment engine could not place on any agent.
    pub async fn raise_agent_down_alert(&self, target: &Target) -> AlertResult<bool> {
        if self
            .registry
            .find_active_alert(target.id, AlertType::AgentDown, None)
            .await?
            .is_some()
        {
            return Ok(false);
        }
        let obs = Observation {
            severity: AlertSeverity::Critical,
            latency_ms: None,
            packet_loss: None,
        };
        self.create_alert(target, AlertType::AgentDown, obs, Utc::now())
            .await?;
        metrics::ALERTS_CREATED_TOTAL.inc();
        Ok(true)
    }

    /// Security probes: a target expected not to answer that responds is a
    /// critical violation; the alert clears once every observing agent sees
    /// it silent again.
    async fn phase_security(&self, summary: &mut CycleSummary) -> AlertResult<()> {
        let now = Utc::now();
        for target in self.registry.list_security_probe_targets().await? {
            let states = self.registry.states_for_target(target.id).await?;
            let answering = states.iter().any(|s| s.status == PairStatus::Healthy);
            let active = self
                .registry
                .find_active_alert(target.id, AlertType::SecurityViolation, None)
                .await?;

            match (answering, active) {
                (true, None) => {
                    let obs = Observation {
                        severity: AlertSeverity::Critical,
                        latency_ms: None,
                        packet_loss: None,
                    };
                    if let Err(err) = self
                        .create_alert(&target, AlertType::SecurityViolation, obs, now)
                        .await
                    {
                        warn!(target = %target.id, error = %err, "security alert failed");
                        summary.errors += 1;
                    } else {
                        summary.alerts_created += 1;
                        metrics::ALERTS_CREATED_TOTAL.inc();
                    }
                }
                (false, Some(mut alert)) => {
                    let old_status = alert.status;
                    alert.status = AlertStatus::Resolved;
                    alert.resolved_at = Some(now);
                    alert.last_updated_at = now;
                    let event = AlertEvent {
                        alert_id: alert.id,
                        event_type: AlertEventType::Resolved,
                        old_severity: None,
                        new_severity: None,
                        old_status: Some(old_status),
                        new_status: Some(AlertStatus::Resolved),
                        latency_ms: None,
                        packet_loss_pct: None,
                        triggered_by: ALERT_WORKER_IDENTITY.to_string(),
                        created_at: now,
                    };
                    match self.registry.save_alert_evolution(&alert, &event).await {
                        Ok(()) => summary.resolved += 1,
                        Err(err) => {
                            warn!(alert = %alert.id, error = %err, "security alert close failed");
                            summary.errors += 1;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Phase 2: resolve alerts whose target's recent window is fully
    /// healthy across every observing agent.
    async fn phase_resolution(
        &self,
        thresholds: &AlertThresholds,
        summary: &mut CycleSummary,
    ) -> AlertResult<()> {
        let now = Utc::now();
        for target_id in self.registry.target_ids_with_active_alerts().await? {
            let states = self.registry.states_for_target(target_id).await?;
            if states.is_empty() {
                continue;
            }
            let window_healthy = states.iter().all(|s| {
                s.status == PairStatus::Healthy
                    && s.consecutive_successes >= thresholds.resolution_probe_count
            });
            if !window_healthy {
                continue;
            }

            for mut alert in self.registry.active_alerts_for_target(target_id).await? {
                // security alerts clear on silence, not on health
                if alert.alert_type == AlertType::SecurityViolation {
                    continue;
                }
                let old_status = alert.status;
                alert.status = AlertStatus::Resolved;
                alert.resolved_at = Some(now);
                alert.last_updated_at = now;

                let event = AlertEvent {
                    alert_id: alert.id,
                    event_type: AlertEventType::Resolved,
                    old_severity: None,
                    new_severity: None,
                    old_status: Some(old_status),
                    new_status: Some(AlertStatus::Resolved),
                    latency_ms: alert.current_latency_ms,
                    packet_loss_pct: alert.current_packet_loss,
                    triggered_by: ALERT_WORKER_IDENTITY.to_string(),
                    created_at: now,
                };
                match self.registry.save_alert_evolution(&alert, &event).await {
                    Ok(()) => {
                        summary.resolved += 1;
                        metrics::ALERTS_RESOLVED_TOTAL.inc();
                    }
                    Err(err) => {
                        warn!(alert = %alert.id, error = %err, "alert resolution failed");
                        summary.errors += 1;
                    }
                }
            }
        }
        Ok(())
    }

    /// Phase 3: correlate active unlinked alerts into incidents and close
    /// incidents whose alerts have all resolved.
    async fn phase_correlation(
        &self,
        thresholds: &AlertThresholds,
        summary: &mut CycleSummary,
    ) -> AlertResult<()> {
        let unlinked = self.registry.list_active_unlinked_alerts().await?;
        let mut groups: HashMap<String, Vec<Alert>> = HashMap::new();
        for alert in unlinked {
            groups
                .entry(alert.correlation_key.clone())
                .or_default()
                .push(alert);
        }

        for (key, group) in groups {
            let result = match self.registry.find_active_incident(&key).await {
                Ok(Some(incident)) => self.link_group(incident, &group).await.map(|_| {
                    summary.alerts_linked += group.len();
                }),
                Ok(None) if group.len() >= thresholds.incident_creation_threshold => {
                    self.create_incident(&key, &group).await.map(|_| {
                        summary.incidents_created += 1;
                        summary.alerts_linked += group.len();
                        metrics::INCIDENTS_CREATED_TOTAL.inc();
                    })
                }
                Ok(None) => Ok(()),
                Err(err) => Err(err.into()),
            };
            if let Err(err) = result {
                warn!(key = %key, error = %err, "incident correlation failed");
                summary.errors += 1;
            }
        }

        // incidents whose alerts have all resolved close out
        let now = Utc::now();
        for mut incident in self.registry.list_active_incidents().await? {
            let mut any_active = false;
            for alert_id in &incident.alert_ids {
                match self.registry.get_alert(*alert_id).await {
                    Ok(alert) if alert.status != AlertStatus::Resolved => {
                        any_active = true;
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(alert = %alert_id, error = %err, "alert lookup failed during incident close");
                        any_active = true;
                        break;
                    }
                }
            }
            if any_active || incident.alert_ids.is_empty() {
                continue;
            }

            incident.status = IncidentStatus::Resolved;
            incident.resolved_at = Some(now);
            incident.evolution_history.push(IncidentEvolution {
                at: now,
                event: "resolved".into(),
                detail: serde_json::json!({ "reason": "all alerts resolved" }),
            });
            match self.registry.save_incident(&incident).await {
                Ok(()) => summary.incidents_resolved += 1,
                Err(err) => {
                    warn!(incident = %incident.id, error = %err, "incident close failed");
                    summary.errors += 1;
                }
            }
        }
        Ok(())
    }

    /// Attach a group of alerts to an existing incident, widening its
    /// blast radius and raising (never lowering) its severity.
    async fn link_group(&self, mut incident: Incident, group: &[Alert]) -> AlertResult<()> {
        let now = Utc::now();
        let alert_ids: Vec<_> = group.iter().map(|a| a.id).collect();

        for alert in group {
            if !incident.alert_ids.contains(&alert.id) {
                incident.alert_ids.push(alert.id);
            }
            if !incident.affected_target_ids.contains(&alert.target_id) {
                incident.affected_target_ids.push(alert.target_id);
            }
            if let Some(agent_id) = alert.agent_id {
                if !incident.affected_agent_ids.contains(&agent_id) {
                    incident.affected_agent_ids.push(agent_id);
                }
            }
            incident.peak_latency_ms = max_opt(incident.peak_latency_ms, alert.peak_latency_ms);
            incident.peak_packet_loss =
                max_opt(incident.peak_packet_loss, alert.peak_packet_loss);
            incident.last_alert_at = Some(
                incident
                    .last_alert_at
                    .map_or(alert.detected_at, |t| t.max(alert.detected_at)),
            );
        }
        incident.alert_count = incident.alert_ids.len() as i32;

        let group_severity = group_incident_severity(group);
        if group_severity.rank() > incident.severity.rank() {
            incident.evolution_history.push(IncidentEvolution {
                at: now,
                event: "severity_raised".into(),
                detail: serde_json::json!({
                    "from": incident.severity,
                    "to": group_severity,
                }),
            });
            incident.severity = group_severity;
        }
        if incident.status == IncidentStatus::Pending {
            incident.status = IncidentStatus::Active;
            incident.confirmed_at.get_or_insert(now);
        }
        incident.evolution_history.push(IncidentEvolution {
            at: now,
            event: "alerts_linked".into(),
            detail: serde_json::json!({ "alert_ids": &alert_ids }),
        });

        self.registry.save_incident(&incident).await?;
        self.registry
            .link_alerts_to_incident(&alert_ids, incident.id, ALERT_WORKER_IDENTITY)
            .await?;
        Ok(())
    }

    /// Open a new incident for a correlation group that crossed the
    /// creation threshold.
    async fn create_incident(&self, key: &str, group: &[Alert]) -> AlertResult<()> {
        let now = Utc::now();
        let alert_ids: Vec<_> = group.iter().map(|a| a.id).collect();

        let mut affected_target_ids = Vec::new();
        let mut affected_agent_ids = Vec::new();
        for alert in group {
            if !affected_target_ids.contains(&alert.target_id) {
                affected_target_ids.push(alert.target_id);
            }
            if let Some(agent_id) = alert.agent_id {
                if !affected_agent_ids.contains(&agent_id) {
                    affected_agent_ids.push(agent_id);
                }
            }
        }

        let detected_at = group
            .iter()
            .map(|a| a.detected_at)
            .min()
            .unwrap_or(now);
        let last_alert_at = group.iter().map(|a| a.detected_at).max();

        let incident = Incident {
            id: Uuid::new_v4(),
            incident_type: incident_type_for_key(key),
            severity: group_incident_severity(group),
            primary_entity: key.split_once(':').map(|(_, id)| id).unwrap_or(key).to_string(),
            affected_target_ids,
            affected_agent_ids,
            detected_at,
            confirmed_at: Some(now),
            resolved_at: None,
            peak_latency_ms: group.iter().filter_map(|a| a.peak_latency_ms).fold(None, fold_max),
            peak_packet_loss: group
                .iter()
                .filter_map(|a| a.peak_packet_loss)
                .fold(None, fold_max),
            status: IncidentStatus::Active,
            alert_count: alert_ids.len() as i32,
            alert_ids: alert_ids.clone(),
            last_alert_at,
            correlation_key: key.to_string(),
            evolution_history: vec![IncidentEvolution {
                at: now,
                event: "created".into(),
                detail: serde_json::json!({ "alert_ids": &alert_ids }),
            }],
        };

        self.registry.insert_incident(&incident).await?;
        self.registry
            .link_alerts_to_incident(&alert_ids, incident.id, ALERT_WORKER_IDENTITY)
            .await?;
        Ok(())
    }
}

fn group_incident_severity(group: &[Alert]) -> IncidentSeverity {
    let max = group
        .iter()
        .map(|a| a.severity)
        .max_by_key(|s| s.rank())
        .unwrap_or(AlertSeverity::Info);
    incident_severity_for(max)
}

/// Subnet- and target-keyed groups are target blast radii; agent outages
/// carry their own type.
fn incident_type_for_key(key: &str) -> IncidentType {
    if key.starts_with("agent:") {
        IncidentType::Agent
    } else {
        IncidentType::Target
    }
}

fn max_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) => Some(a),
        (None, b) => b,
    }
}

fn fold_max(acc: Option<f64>, value: f64) -> Option<f64> {
    Some(acc.map_or(value, |a| a.max(value)))
}
