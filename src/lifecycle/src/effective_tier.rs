//! The cadence a target actually runs at, given its monitoring state.

use registry_metadata::{
    MonitoringState, Target, DISCOVERY_TIER, INACTIVE_RECHECK_TIER, SMART_RECHECK_TIER,
    STANDBY_RECHECK_TIER,
};

/// Map a target to its effective tier.
///
/// `subnet_covered` is whether the target's subnet currently has at least
/// one active customer target; unresponsive/excluded targets are only
/// rechecked when it does not (no other way to notice the subnet coming
/// back). `None` means the target is not probed at all.
pub fn effective_tier(target: &Target, subnet_covered: bool) -> Option<&str> {
    match target.monitoring_state {
        MonitoringState::Unknown => Some(DISCOVERY_TIER),
        MonitoringState::Inactive => Some(INACTIVE_RECHECK_TIER),
        MonitoringState::Standby => Some(STANDBY_RECHECK_TIER),
        MonitoringState::Unresponsive | MonitoringState::Excluded => {
            if subnet_covered {
                None
            } else {
                Some(SMART_RECHECK_TIER)
            }
        }
        MonitoringState::Active | MonitoringState::Degraded | MonitoringState::Down => {
            Some(target.tier.as_str())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use registry_metadata::{IpType, Origin, Ownership};
    use std::collections::HashMap;
    use uuid::Uuid;

    fn target(state: MonitoringState) -> Target {
        let now = Utc::now();
        Target {
            id: Uuid::new_v4(),
            ip: "172.16.0.4".into(),
            subnet_id: Some(Uuid::new_v4()),
            tier: "vip".into(),
            ip_type: IpType::Customer,
            ownership: Ownership::Auto,
            origin: Origin::Sync,
            tags: HashMap::new(),
            display_name: None,
            expected_outcome: None,
            monitoring_state: state,
            state_changed_at: now,
            needs_review: false,
            first_response_at: None,
            baseline_established_at: None,
            last_response_at: None,
            discovery_attempts: 0,
            is_representative: false,
            under_assigned: false,
            archived_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn state_overrides_take_precedence_over_the_assigned_tier() {
        assert_eq!(
            effective_tier(&target(MonitoringState::Unknown), true),
            Some(DISCOVERY_TIER)
        );
        assert_eq!(
            effective_tier(&target(MonitoringState::Inactive), true),
            Some(INACTIVE_RECHECK_TIER)
        );
        assert_eq!(
            effective_tier(&target(MonitoringState::Standby), true),
            Some(STANDBY_RECHECK_TIER)
        );
    }

    #[test]
    fn monitored_states_run_at_the_assigned_tier() {
        assert_eq!(effective_tier(&target(MonitoringState::Active), true), Some("vip"));
        assert_eq!(effective_tier(&target(MonitoringState::Down), true), Some("vip"));
        assert_eq!(
            effective_tier(&target(MonitoringState::Degraded), false),
            Some("vip")
        );
    }

    #[test]
    fn smart_recheck_requires_an_uncovered_subnet() {
        assert_eq!(effective_tier(&target(MonitoringState::Excluded), true), None);
        assert_eq!(
            effective_tier(&target(MonitoringState::Excluded), false),
            Some(SMART_RECHECK_TIER)
        );
        assert_eq!(
            effective_tier(&target(MonitoringState::Unresponsive), false),
            Some(SMART_RECHECK_TIER)
        );
    }
}
