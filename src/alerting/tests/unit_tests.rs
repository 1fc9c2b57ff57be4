//! # Alert Pipeline Unit Tests
//!
//! Severity ladders, evolution invariants, and the incident mapping.

use alert_pipeline::*;
use chrono::{Duration, Utc};
use registry_metadata::{
    AgentTargetState, Alert, AlertSeverity, AlertStatus, AlertThresholds, AlertType,
    IncidentSeverity, PairStatus,
};
use uuid::Uuid;

fn degraded_state(z: Option<f64>, loss: Option<f64>, latency: Option<f64>) -> AgentTargetState {
    let now = Utc::now();
    AgentTargetState {
        agent_id: Uuid::new_v4(),
        target_id: Uuid::new_v4(),
        status: PairStatus::Degraded,
        status_since: now,
        current_z_score: z,
        current_packet_loss: loss,
        current_latency_ms: latency,
        anomaly_start: Some(now - Duration::minutes(2)),
        consecutive_anomalies: 0,
        consecutive_successes: 0,
        last_probe_time: Some(now),
    }
}

fn active_alert(severity: AlertSeverity, alert_type: AlertType) -> Alert {
    let now = Utc::now();
    Alert {
        id: Uuid::new_v4(),
        target_id: Uuid::new_v4(),
        target_ip: "203.0.113.9".into(),
        agent_id: None,
        alert_type,
        severity,
        status: AlertStatus::Active,
        initial_severity: severity,
        peak_severity: severity,
        initial_latency_ms: None,
        peak_latency_ms: None,
        current_latency_ms: None,
        initial_packet_loss: None,
        peak_packet_loss: None,
        current_packet_loss: None,
        detected_at: now,
        last_updated_at: now,
        acknowledged_at: None,
        acknowledged_by: None,
        resolved_at: None,
        incident_id: None,
        correlation_key: format!("target:{}", Uuid::new_v4()),
        subnet_snapshot: None,
    }
}

#[test]
fn availability_trumps_other_anomalies() {
    let thresholds = AlertThresholds::default();
    let mut state = degraded_state(Some(10.0), Some(50.0), Some(900.0));
    state.status = PairStatus::Down;
    state.consecutive_anomalies = 4;

    let anomalies = evaluate_anomalies(&state, &thresholds);
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0], (AlertType::Availability, AlertSeverity::Critical));
}

#[test]
fn latency_and_loss_can_coexist() {
    let thresholds = AlertThresholds::default();
    let state = degraded_state(Some(5.0), Some(8.0), Some(200.0));
    let anomalies = evaluate_anomalies(&state, &thresholds);
    assert_eq!(anomalies.len(), 2);
    assert!(anomalies.contains(&(AlertType::PacketLoss, AlertSeverity::Warning)));
    assert!(anomalies.contains(&(AlertType::Latency, AlertSeverity::Warning)));
}

#[test]
fn peak_severity_is_monotone_over_a_whole_life() {
    let now = Utc::now();
    let mut alert = active_alert(AlertSeverity::Info, AlertType::Latency);

    for (severity, latency) in [
        (AlertSeverity::Warning, 150.0),
        (AlertSeverity::Critical, 650.0),
        (AlertSeverity::Warning, 140.0),
        (AlertSeverity::Info, 40.0),
    ] {
        evolve_alert(&mut alert, severity, Some(latency), Some(0.0), "test", now);
        assert!(
            alert.peak_severity.rank() >= alert.severity.rank(),
            "peak must never trail current"
        );
    }
    assert_eq!(alert.peak_severity, AlertSeverity::Critical);
    assert_eq!(alert.severity, AlertSeverity::Info);
    assert_eq!(alert.peak_latency_ms, Some(650.0));
}

#[test]
fn unchanged_evaluations_emit_nothing() {
    let now = Utc::now();
    let mut alert = active_alert(AlertSeverity::Warning, AlertType::PacketLoss);
    alert.current_latency_ms = Some(100.0);
    alert.current_packet_loss = Some(7.0);

    let mut escalations = 0;
    let mut de_escalations = 0;
    let mut updates = 0;
    for _ in 0..3 {
        match evolve_alert(
            &mut alert,
            AlertSeverity::Warning,
            Some(100.0),
            Some(7.0),
            "test",
            now,
        ) {
            Some(event) => match event.event_type {
                registry_metadata::AlertEventType::Escalated => escalations += 1,
                registry_metadata::AlertEventType::DeEscalated => de_escalations += 1,
                _ => updates += 1,
            },
            None => {}
        }
    }
    assert_eq!(escalations, 0);
    assert_eq!(de_escalations, 0);
    assert_eq!(updates, 0, "steady metrics emit no metrics_updated rows");
}

#[test]
fn incident_ladder_maps_from_alert_severity() {
    assert_eq!(
        incident_severity_for(AlertSeverity::Critical),
        IncidentSeverity::Critical
    );
    assert_eq!(incident_severity_for(AlertSeverity::Warning), IncidentSeverity::High);
    assert_eq!(incident_severity_for(AlertSeverity::Info), IncidentSeverity::Medium);
}

#[test]
fn correlation_key_shape() {
    let subnet = Uuid::new_v4();
    let target = Uuid::new_v4();
    assert!(correlation_key(Some(subnet), target).starts_with("subnet:"));
    assert!(correlation_key(None, target).starts_with("target:"));
}
