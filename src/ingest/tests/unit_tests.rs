//! # Ingest Unit Tests
//!
//! Codec bounds, anomaly scoring, and baseline math; the database-backed
//! pipeline path is exercised operationally.

use chrono::{Duration, Utc};
use ingest_pipeline::*;
use registry_metadata::{AgentTargetState, PairStatus};
use uuid::Uuid;

fn entry(success: bool, latency: Option<f64>, loss: f64) -> ProbeResultEntry {
    ProbeResultEntry {
        target_id: Uuid::new_v4(),
        ip: "192.0.2.55".into(),
        timestamp: Utc::now(),
        success,
        latency_ms: latency,
        packet_loss_pct: loss,
        rtt_samples: vec![],
    }
}

#[test]
fn default_thresholds_match_shipped_configuration() {
    let t = AnomalyThresholds::default();
    assert_eq!(t.consecutive_failures, 3);
    assert_eq!(t.z_score, 3.0);
    assert_eq!(t.packet_loss_pct, 5.0);
}

#[test]
fn three_consecutive_failures_mark_the_pair_down() {
    let thresholds = AnomalyThresholds::default();
    let mut state = AgentTargetState::initial(Uuid::new_v4(), Uuid::new_v4(), Utc::now());

    for _ in 0..3 {
        apply_probe(&mut state, None, &entry(false, None, 100.0), &thresholds);
    }
    assert_eq!(state.status, PairStatus::Down);
    assert!(state.anomaly_start.is_some());
}

#[test]
fn anomaly_start_is_kept_across_consecutive_failures() {
    let thresholds = AnomalyThresholds::default();
    let mut state = AgentTargetState::initial(Uuid::new_v4(), Uuid::new_v4(), Utc::now());

    let mut first = entry(false, None, 100.0);
    first.timestamp = Utc::now() - Duration::seconds(90);
    apply_probe(&mut state, None, &first, &thresholds);
    let started = state.anomaly_start;
    assert!(started.is_some());

    let mut second = entry(false, None, 100.0);
    second.timestamp = Utc::now();
    apply_probe(&mut state, None, &second, &thresholds);
    assert_eq!(state.anomaly_start, started, "anomaly_start must not move");
}

#[test]
fn batch_caps_are_the_published_constants() {
    assert_eq!(MAX_BATCH_RESULTS, 10_000);
    assert_eq!(MAX_BATCH_BYTES, 4 * 1024 * 1024);
}

#[test]
fn baseline_window_keeps_percentiles_plausible() {
    let agent = Uuid::new_v4();
    let target = Uuid::new_v4();
    let now = Utc::now();

    let mut baseline = None;
    for latency in [10.0, 11.0, 10.5, 12.0, 10.2, 11.7, 10.9] {
        baseline = Some(update_baseline(baseline, agent, target, latency, 0.0, now));
    }
    let b = baseline.unwrap();
    assert!(b.latency_p50 >= 10.0 && b.latency_p50 <= 12.0);
    assert!(b.latency_p99 >= b.latency_p50);
    assert!(b.latency_p95 <= b.latency_p99);
}

#[test]
fn decode_rejects_empty_gzip_claim() {
    assert!(matches!(
        decode_batch(b"", true),
        Err(IngestError::Decode(_))
    ));
}
