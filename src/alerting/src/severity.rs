//! Pure severity math: anomaly classification, alert evolution, and the
//! alert-to-incident severity mapping.

use chrono::{DateTime, Utc};

use registry_metadata::{
    AgentTargetState, Alert, AlertEvent, AlertEventType, AlertSeverity, AlertThresholds, AlertType,
    IncidentSeverity, PairStatus,
};

use crate::types::{AVAILABILITY_FAILURE_ANOMALY, LATENCY_Z_SCORE_ANOMALY};

/// Classify the anomalies a pair state currently exhibits, with the
/// severity each one earns under the hot-reloadable thresholds.
///
/// Availability outranks everything and is always critical. Latency and
/// packet loss grade on the warning/critical ladders.
pub fn evaluate_anomalies(
    state: &AgentTargetState,
    thresholds: &AlertThresholds,
) -> Vec<(AlertType, AlertSeverity)> {
    let mut anomalies = Vec::new();

    let availability = state.status == PairStatus::Down
        || state.consecutive_anomalies >= AVAILABILITY_FAILURE_ANOMALY;
    if availability {
        anomalies.push((AlertType::Availability, AlertSeverity::Critical));
        // an unreachable target's latency/loss readings are noise
        return anomalies;
    }

    if let Some(loss) = state.current_packet_loss {
        if loss >= thresholds.packet_loss_warning_pct {
            let severity = if loss >= thresholds.packet_loss_critical_pct {
                AlertSeverity::Critical
            } else {
                AlertSeverity::Warning
            };
            anomalies.push((AlertType::PacketLoss, severity));
        }
    }

    let latency_anomalous = state
        .current_z_score
        .map(|z| z > LATENCY_Z_SCORE_ANOMALY)
        .unwrap_or(false);
    if latency_anomalous {
        let latency = state.current_latency_ms.unwrap_or(0.0);
        let severity = if latency >= thresholds.latency_critical_ms {
            AlertSeverity::Critical
        } else if latency >= thresholds.latency_warning_ms {
            AlertSeverity::Warning
        } else {
            AlertSeverity::Info
        };
        anomalies.push((AlertType::Latency, severity));
    }

    anomalies
}

/// Evolve an existing alert against a fresh observation.
///
/// Peak severity and peak metrics never decrease. Returns the event to
/// append, or None when neither severity nor metrics moved (steady state
/// produces no event rows).
pub fn evolve_alert(
    alert: &mut Alert,
    severity: AlertSeverity,
    latency_ms: Option<f64>,
    packet_loss: Option<f64>,
    triggered_by: &str,
    now: DateTime<Utc>,
) -> Option<AlertEvent> {
    let old_severity = alert.severity;
    let metrics_changed =
        alert.current_latency_ms != latency_ms || alert.current_packet_loss != packet_loss;

    if severity == old_severity && !metrics_changed {
        return None;
    }

    alert.current_latency_ms = latency_ms;
    alert.current_packet_loss = packet_loss;
    alert.peak_latency_ms = max_opt(alert.peak_latency_ms, latency_ms);
    alert.peak_packet_loss = max_opt(alert.peak_packet_loss, packet_loss);
    alert.last_updated_at = now;

    let event_type = if severity.rank() > old_severity.rank() {
        alert.severity = severity;
        if severity.rank() > alert.peak_severity.rank() {
            alert.peak_severity = severity;
        }
        AlertEventType::Escalated
    } else if severity.rank() < old_severity.rank() {
        alert.severity = severity;
        AlertEventType::DeEscalated
    } else {
        AlertEventType::MetricsUpdated
    };

    Some(AlertEvent {
        alert_id: alert.id,
        event_type,
        old_severity: Some(old_severity),
        new_severity: Some(alert.severity),
        old_status: None,
        new_status: None,
        latency_ms,
        packet_loss_pct: packet_loss,
        triggered_by: triggered_by.to_string(),
        created_at: now,
    })
}

/// Map the worst alert severity in a group onto the incident ladder.
pub fn incident_severity_for(max_alert_severity: AlertSeverity) -> IncidentSeverity {
    match max_alert_severity {
        AlertSeverity::Critical => IncidentSeverity::Critical,
        AlertSeverity::Warning => IncidentSeverity::High,
        AlertSeverity::Info => IncidentSeverity::Medium,
    }
}

fn max_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) => Some(a),
        (None, b) => b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use registry_metadata::AlertStatus;
    use uuid::Uuid;

    fn state(status: PairStatus, failures: i32, z: Option<f64>, loss: Option<f64>, latency: Option<f64>) -> AgentTargetState {
        let now = Utc::now();
        AgentTargetState {
            agent_id: Uuid::new_v4(),
            target_id: Uuid::new_v4(),
            status,
            status_since: now,
            current_z_score: z,
            current_packet_loss: loss,
            current_latency_ms: latency,
            anomaly_start: Some(now - Duration::minutes(5)),
            consecutive_anomalies: failures,
            consecutive_successes: 0,
            last_probe_time: Some(now),
        }
    }

    fn alert(severity: AlertSeverity) -> Alert {
        let now = Utc::now();
        Alert {
            id: Uuid::new_v4(),
            target_id: Uuid::new_v4(),
            target_ip: "10.0.0.1".into(),
            agent_id: None,
            alert_type: AlertType::Latency,
            severity,
            status: AlertStatus::Active,
            initial_severity: severity,
            peak_severity: severity,
            initial_latency_ms: Some(120.0),
            peak_latency_ms: Some(120.0),
            current_latency_ms: Some(120.0),
            initial_packet_loss: Some(0.0),
            peak_packet_loss: Some(0.0),
            current_packet_loss: Some(0.0),
            detected_at: now - Duration::minutes(10),
            last_updated_at: now - Duration::minutes(1),
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            incident_id: None,
            correlation_key: "target:x".into(),
            subnet_snapshot: None,
        }
    }

    #[test]
    fn availability_is_always_critical_and_exclusive() {
        let thresholds = AlertThresholds::default();
        let s = state(PairStatus::Down, 5, Some(9.0), Some(80.0), None);
        let anomalies = evaluate_anomalies(&s, &thresholds);
        assert_eq!(anomalies, vec![(AlertType::Availability, AlertSeverity::Critical)]);
    }

    #[test]
    fn loss_and_latency_grade_on_their_ladders() {
        let thresholds = AlertThresholds::default();

        let warn = state(PairStatus::Degraded, 0, None, Some(10.0), Some(50.0));
        assert_eq!(
            evaluate_anomalies(&warn, &thresholds),
            vec![(AlertType::PacketLoss, AlertSeverity::Warning)]
        );

        let crit = state(PairStatus::Degraded, 0, None, Some(25.0), None);
        assert_eq!(
            evaluate_anomalies(&crit, &thresholds),
            vec![(AlertType::PacketLoss, AlertSeverity::Critical)]
        );

        // the warning threshold is inclusive: exactly 5% already grades
        let at_warning = state(PairStatus::Degraded, 0, None, Some(5.0), None);
        assert_eq!(
            evaluate_anomalies(&at_warning, &thresholds),
            vec![(AlertType::PacketLoss, AlertSeverity::Warning)]
        );

        let lat_warn = state(PairStatus::Degraded, 0, Some(4.0), Some(0.0), Some(150.0));
        assert_eq!(
            evaluate_anomalies(&lat_warn, &thresholds),
            vec![(AlertType::Latency, AlertSeverity::Warning)]
        );

        let lat_crit = state(PairStatus::Degraded, 0, Some(4.0), Some(0.0), Some(600.0));
        assert_eq!(
            evaluate_anomalies(&lat_crit, &thresholds),
            vec![(AlertType::Latency, AlertSeverity::Critical)]
        );

        let lat_info = state(PairStatus::Degraded, 0, Some(4.0), Some(0.0), Some(40.0));
        assert_eq!(
            evaluate_anomalies(&lat_info, &thresholds),
            vec![(AlertType::Latency, AlertSeverity::Info)]
        );
    }

    #[test]
    fn healthy_state_raises_nothing() {
        let thresholds = AlertThresholds::default();
        let s = state(PairStatus::Healthy, 0, Some(0.5), Some(0.0), Some(12.0));
        assert!(evaluate_anomalies(&s, &thresholds).is_empty());
    }

    #[test]
    fn escalation_raises_peak_and_emits_escalated() {
        let mut a = alert(AlertSeverity::Warning);
        let event = evolve_alert(
            &mut a,
            AlertSeverity::Critical,
            Some(700.0),
            Some(0.0),
            "alert-worker",
            Utc::now(),
        )
        .unwrap();
        assert_eq!(event.event_type, AlertEventType::Escalated);
        assert_eq!(a.severity, AlertSeverity::Critical);
        assert_eq!(a.peak_severity, AlertSeverity::Critical);
        assert_eq!(a.peak_latency_ms, Some(700.0));
    }

    #[test]
    fn de_escalation_never_lowers_the_peak() {
        let mut a = alert(AlertSeverity::Critical);
        let event = evolve_alert(
            &mut a,
            AlertSeverity::Warning,
            Some(110.0),
            Some(0.0),
            "alert-worker",
            Utc::now(),
        )
        .unwrap();
        assert_eq!(event.event_type, AlertEventType::DeEscalated);
        assert_eq!(a.severity, AlertSeverity::Warning);
        assert_eq!(a.peak_severity, AlertSeverity::Critical);
        assert_eq!(a.peak_latency_ms, Some(120.0));
    }

    #[test]
    fn steady_state_emits_no_event() {
        let mut a = alert(AlertSeverity::Warning);
        // identical severity and metrics across three evaluations
        for _ in 0..3 {
            let event = evolve_alert(
                &mut a,
                AlertSeverity::Warning,
                Some(120.0),
                Some(0.0),
                "alert-worker",
                Utc::now(),
            );
            assert!(event.is_none());
        }
    }

    #[test]
    fn changed_metrics_with_same_severity_is_metrics_updated() {
        let mut a = alert(AlertSeverity::Warning);
        let event = evolve_alert(
            &mut a,
            AlertSeverity::Warning,
            Some(130.0),
            Some(0.0),
            "alert-worker",
            Utc::now(),
        )
        .unwrap();
        assert_eq!(event.event_type, AlertEventType::MetricsUpdated);
        assert_eq!(a.peak_latency_ms, Some(130.0));
    }

    #[test]
    fn incident_severity_mapping() {
        assert_eq!(
            incident_severity_for(AlertSeverity::Critical),
            IncidentSeverity::Critical
        );
        assert_eq!(
            incident_severity_for(AlertSeverity::Warning),
            IncidentSeverity::High
        );
        assert_eq!(
            incident_severity_for(AlertSeverity::Info),
            IncidentSeverity::Medium
        );
    }
}
