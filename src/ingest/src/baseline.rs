//! Incremental baseline maintenance from successful probes.
//!
//! A rolling window of recent latencies backs the percentiles; packet loss
//! is smoothed exponentially. Baselines only feed anomaly scoring, so
//! approximate percentiles over the window are enough.

use chrono::{DateTime, Utc};

use registry_metadata::{AgentId, Baseline, TargetId};

/// Rolling window size backing the percentile estimates.
pub const BASELINE_WINDOW: usize = 100;

/// Smoothing factor for the packet-loss baseline.
const LOSS_ALPHA: f64 = 0.1;

/// Percentile over a pre-sorted slice (nearest-rank on the closed range).
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    sorted[rank.round() as usize]
}

fn stddev(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    let variance =
        samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (samples.len() - 1) as f64;
    variance.sqrt()
}

/// Fold one successful probe into the pair baseline, creating it on first
/// sight.
pub fn update_baseline(
    existing: Option<Baseline>,
    agent_id: AgentId,
    target_id: TargetId,
    latency_ms: f64,
    packet_loss_pct: f64,
    at: DateTime<Utc>,
) -> Baseline {
    let mut baseline = existing.unwrap_or(Baseline {
        agent_id,
        target_id,
        latency_p50: latency_ms,
        latency_p95: latency_ms,
        latency_p99: latency_ms,
        stddev: 0.0,
        packet_loss_baseline: packet_loss_pct,
        sample_count: 0,
        first_seen: at,
        last_updated: at,
        recent_samples: Vec::new(),
    });

    baseline.recent_samples.push(latency_ms);
    if baseline.recent_samples.len() > BASELINE_WINDOW {
        let excess = baseline.recent_samples.len() - BASELINE_WINDOW;
        baseline.recent_samples.drain(..excess);
    }

    let mut sorted = baseline.recent_samples.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    baseline.latency_p50 = percentile(&sorted, 50.0);
    baseline.latency_p95 = percentile(&sorted, 95.0);
    baseline.latency_p99 = percentile(&sorted, 99.0);
    baseline.stddev = stddev(&baseline.recent_samples);
    baseline.packet_loss_baseline =
        baseline.packet_loss_baseline * (1.0 - LOSS_ALPHA) + packet_loss_pct * LOSS_ALPHA;
    baseline.sample_count += 1;
    baseline.last_updated = at;
    baseline
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn first_sample_seeds_the_baseline() {
        let now = Utc::now();
        let b = update_baseline(None, Uuid::new_v4(), Uuid::new_v4(), 25.0, 0.0, now);
        assert_eq!(b.latency_p50, 25.0);
        assert_eq!(b.sample_count, 1);
        assert_eq!(b.first_seen, now);
        assert_eq!(b.recent_samples, vec![25.0]);
    }

    #[test]
    fn percentiles_track_the_window() {
        let agent = Uuid::new_v4();
        let target = Uuid::new_v4();
        let now = Utc::now();

        let mut baseline = None;
        for i in 1..=100 {
            baseline = Some(update_baseline(
                baseline,
                agent,
                target,
                i as f64,
                0.0,
                now,
            ));
        }
        let b = baseline.unwrap();
        assert_eq!(b.sample_count, 100);
        assert!((b.latency_p50 - 50.0).abs() <= 1.0);
        assert!(b.latency_p95 >= 94.0);
        assert!(b.latency_p99 >= 98.0);
        assert!(b.stddev > 0.0);
    }

    #[test]
    fn window_is_bounded() {
        let agent = Uuid::new_v4();
        let target = Uuid::new_v4();
        let now = Utc::now();

        let mut baseline = None;
        for _ in 0..(BASELINE_WINDOW + 50) {
            baseline = Some(update_baseline(baseline, agent, target, 10.0, 0.0, now));
        }
        let b = baseline.unwrap();
        assert_eq!(b.recent_samples.len(), BASELINE_WINDOW);
        assert_eq!(b.sample_count, (BASELINE_WINDOW + 50) as i64);
    }

    #[test]
    fn loss_baseline_smooths_toward_observations() {
        let agent = Uuid::new_v4();
        let target = Uuid::new_v4();
        let now = Utc::now();

        let mut b = update_baseline(None, agent, target, 10.0, 0.0, now);
        for _ in 0..50 {
            b = update_baseline(Some(b), agent, target, 10.0, 10.0, now);
        }
        assert!(b.packet_loss_baseline > 9.0 && b.packet_loss_baseline <= 10.0);
    }

    #[test]
    fn empty_percentile_is_zero() {
        assert_eq!(percentile(&[], 95.0), 0.0);
    }
}
