//! Pure per-(agent,target) state updates and anomaly scoring.

use registry_metadata::{AgentTargetState, Baseline, PairStatus};

use crate::types::{AnomalySignals, AnomalyThresholds, ProbeResultEntry};

/// Z-score of a latency observation against the pair baseline. None when
/// the baseline has no usable spread yet.
pub fn z_score(latency_ms: f64, baseline: &Baseline) -> Option<f64> {
    if baseline.stddev <= f64::EPSILON {
        return None;
    }
    Some((latency_ms - baseline.latency_p50) / baseline.stddev)
}

/// Fold one probe into the pair state and report the anomaly signals it
/// raised.
///
/// The caller guarantees `entry.timestamp` is not older than
/// `state.last_probe_time`; stale arrivals are filtered before this point
/// so anomaly state always reflects the highest timestamp seen.
pub fn apply_probe(
    state: &mut AgentTargetState,
    baseline: Option<&Baseline>,
    entry: &ProbeResultEntry,
    thresholds: &AnomalyThresholds,
) -> AnomalySignals {
    let mut signals = AnomalySignals::default();
    state.last_probe_time = Some(match state.last_probe_time {
        Some(prev) => prev.max(entry.timestamp),
        None => entry.timestamp,
    });

    let new_status;
    if entry.success {
        state.consecutive_anomalies = 0;
        state.consecutive_successes += 1;
        state.current_latency_ms = entry.latency_ms;
        state.current_packet_loss = Some(entry.packet_loss_pct);
        state.current_z_score = match (entry.latency_ms, baseline) {
            (Some(latency), Some(baseline)) => z_score(latency, baseline),
            _ => None,
        };

        signals.latency = state
            .current_z_score
            .map(|z| z > thresholds.z_score)
            .unwrap_or(false);
        signals.packet_loss = entry.packet_loss_pct > thresholds.packet_loss_pct;

        if signals.any() {
            state.anomaly_start.get_or_insert(entry.timestamp);
            new_status = PairStatus::Degraded;
        } else {
            state.anomaly_start = None;
            new_status = PairStatus::Healthy;
        }
    } else {
        state.consecutive_anomalies += 1;
        state.consecutive_successes = 0;
        state.current_latency_ms = None;
        // a probe with no response is total loss regardless of what the
        // agent reported for partial samples
        state.current_packet_loss = Some(100.0);
        state.current_z_score = None;
        state.anomaly_start.get_or_insert(entry.timestamp);

        signals.availability = state.consecutive_anomalies >= thresholds.consecutive_failures;
        new_status = if signals.availability {
            PairStatus::Down
        } else {
            PairStatus::Degraded
        };
    }

    if state.status != new_status {
        state.status = new_status;
        state.status_since = entry.timestamp;
    }
    signals
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn entry(success: bool, latency: Option<f64>, loss: f64) -> ProbeResultEntry {
        ProbeResultEntry {
            target_id: Uuid::new_v4(),
            ip: "10.0.0.1".into(),
            timestamp: Utc::now(),
            success,
            latency_ms: latency,
            packet_loss_pct: loss,
            rtt_samples: vec![],
        }
    }

    fn baseline(p50: f64, stddev: f64) -> Baseline {
        let now = Utc::now();
        Baseline {
            agent_id: Uuid::new_v4(),
            target_id: Uuid::new_v4(),
            latency_p50: p50,
            latency_p95: p50 * 1.5,
            latency_p99: p50 * 2.0,
            stddev,
            packet_loss_baseline: 0.0,
            sample_count: 50,
            first_seen: now - Duration::hours(1),
            last_updated: now,
            recent_samples: vec![],
        }
    }

    fn fresh_state() -> AgentTargetState {
        AgentTargetState::initial(Uuid::new_v4(), Uuid::new_v4(), Utc::now())
    }

    #[test]
    fn availability_anomaly_at_exactly_three_failures() {
        let thresholds = AnomalyThresholds::default();
        let mut state = fresh_state();

        let first = apply_probe(&mut state, None, &entry(false, None, 100.0), &thresholds);
        assert!(!first.availability);
        assert_eq!(state.status, PairStatus::Degraded);

        let second = apply_probe(&mut state, None, &entry(false, None, 100.0), &thresholds);
        assert!(!second.availability);

        let third = apply_probe(&mut state, None, &entry(false, None, 100.0), &thresholds);
        assert!(third.availability);
        assert_eq!(state.status, PairStatus::Down);
        assert_eq!(state.consecutive_anomalies, 3);
    }

    #[test]
    fn success_resets_anomaly_counters() {
        let thresholds = AnomalyThresholds::default();
        let mut state = fresh_state();
        for _ in 0..2 {
            apply_probe(&mut state, None, &entry(false, None, 100.0), &thresholds);
        }

        let signals = apply_probe(&mut state, None, &entry(true, Some(10.0), 0.0), &thresholds);
        assert!(!signals.any());
        assert_eq!(state.consecutive_anomalies, 0);
        assert_eq!(state.consecutive_successes, 1);
        assert_eq!(state.status, PairStatus::Healthy);
        assert!(state.anomaly_start.is_none());
    }

    #[test]
    fn latency_anomaly_uses_the_baseline_z_score() {
        let thresholds = AnomalyThresholds::default();
        let mut state = fresh_state();
        let b = baseline(20.0, 5.0);

        // 20 + 3*5 = 35; 36ms crosses z > 3
        let signals = apply_probe(&mut state, Some(&b), &entry(true, Some(36.0), 0.0), &thresholds);
        assert!(signals.latency);
        assert_eq!(state.status, PairStatus::Degraded);

        let calm = apply_probe(&mut state, Some(&b), &entry(true, Some(21.0), 0.0), &thresholds);
        assert!(!calm.latency);
        assert_eq!(state.status, PairStatus::Healthy);
    }

    #[test]
    fn packet_loss_anomaly_over_five_percent() {
        let thresholds = AnomalyThresholds::default();
        let mut state = fresh_state();

        let signals = apply_probe(&mut state, None, &entry(true, Some(10.0), 7.5), &thresholds);
        assert!(signals.packet_loss);
        let ok = apply_probe(&mut state, None, &entry(true, Some(10.0), 4.0), &thresholds);
        assert!(!ok.packet_loss);
    }

    #[test]
    fn no_z_score_without_baseline_spread() {
        let flat = baseline(20.0, 0.0);
        assert!(z_score(100.0, &flat).is_none());
        let spread = baseline(20.0, 4.0);
        assert_eq!(z_score(28.0, &spread), Some(2.0));
    }

    #[test]
    fn final_state_is_order_insensitive_for_replayed_sets() {
        // applying the same results (already time-filtered) twice in the
        // same order converges to the same counters as the dedupe layer
        // guarantees each result is applied once
        let thresholds = AnomalyThresholds::default();
        let mut a = fresh_state();
        let mut b = fresh_state();
        let results = vec![
            entry(true, Some(10.0), 0.0),
            entry(false, None, 100.0),
            entry(true, Some(12.0), 0.0),
        ];
        for r in &results {
            apply_probe(&mut a, None, r, &thresholds);
        }
        for r in &results {
            apply_probe(&mut b, None, r, &thresholds);
        }
        assert_eq!(a.consecutive_successes, b.consecutive_successes);
        assert_eq!(a.status, b.status);
    }
}
