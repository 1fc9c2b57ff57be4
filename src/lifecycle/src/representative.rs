//! Representative election for customer IPs.
//!
//! Per subnet at most one customer target is probed at its tier's full
//! cadence; the rest stand by on the hourly recheck tier. Promotion order
//! is deterministic: earliest baseline first, then ascending IP (compared
//! as addresses, not strings).

use std::net::IpAddr;

use chrono::{DateTime, Utc};

use registry_metadata::Target;

/// Ordering key for standby promotion.
fn promotion_key(target: &Target) -> (DateTime<Utc>, Option<IpAddr>, String) {
    (
        target
            .baseline_established_at
            .unwrap_or(DateTime::<Utc>::MAX_UTC),
        target.ip.parse().ok(),
        target.ip.clone(),
    )
}

/// The standby to promote when a representative goes down: oldest
/// `baseline_established_at` wins, ties break on ascending IP.
pub fn pick_promotion(standbys: &[Target]) -> Option<&Target> {
    standbys.iter().min_by_key(|t| promotion_key(t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use registry_metadata::{IpType, MonitoringState, Origin, Ownership};
    use std::collections::HashMap;
    use uuid::Uuid;

    fn standby(ip: &str, baselined_secs_ago: Option<i64>) -> Target {
        let now = Utc::now();
        Target {
            id: Uuid::new_v4(),
            ip: ip.into(),
            subnet_id: Some(Uuid::new_v4()),
            tier: "standard".into(),
            ip_type: IpType::Customer,
            ownership: Ownership::Auto,
            origin: Origin::Sync,
            tags: HashMap::new(),
            display_name: None,
            expected_outcome: None,
            monitoring_state: MonitoringState::Standby,
            state_changed_at: now,
            needs_review: false,
            first_response_at: Some(now - Duration::hours(1)),
            baseline_established_at: baselined_secs_ago.map(|s| now - Duration::seconds(s)),
            last_response_at: Some(now),
            discovery_attempts: 0,
            is_representative: false,
            under_assigned: false,
            archived_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn oldest_baseline_wins() {
        let young = standby("10.0.0.9", Some(100));
        let old = standby("10.0.0.5", Some(5_000));
        let candidates = [young, old.clone()];
        let picked = pick_promotion(&candidates).unwrap();
        assert_eq!(picked.id, old.id);
    }

    #[test]
    fn equal_baselines_tie_break_on_ascending_ip() {
        let now = Utc::now();
        let mut a = standby("10.0.0.20", None);
        let mut b = standby("10.0.0.3", None);
        a.baseline_established_at = Some(now);
        b.baseline_established_at = Some(now);
        // numeric comparison: .3 sorts before .20, string order would not
        let candidates = [a, b.clone()];
        let picked = pick_promotion(&candidates).unwrap();
        assert_eq!(picked.id, b.id);
    }

    #[test]
    fn missing_baselines_sort_last() {
        let baselined = standby("10.0.0.50", Some(10));
        let unbaselined = standby("10.0.0.1", None);
        let candidates = [unbaselined, baselined.clone()];
        let picked = pick_promotion(&candidates).unwrap();
        assert_eq!(picked.id, baselined.id);
    }

    #[test]
    fn empty_standby_pool_yields_none() {
        assert!(pick_promotion(&[]).is_none());
    }
}
