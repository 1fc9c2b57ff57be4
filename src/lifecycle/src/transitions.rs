//! Pure transition rules: per-probe and sweep evaluation.
//!
//! These functions never touch the registry; the engine applies whatever
//! they decide. Keeping them pure pins the state machine down in tests
//! without a database.

use chrono::{DateTime, Duration, Utc};

use registry_metadata::{IpType, MonitoringState, Target};

use crate::types::StateThresholds;

/// What a sweep decided for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepAction {
    /// Set `baseline_established_at` and run representative election
    EstablishBaseline,
    /// Apply a state transition
    Transition(MonitoringState),
}

/// State to enter after a successful probe, if any.
///
/// Every non-active monitoring state recovers to `active` on a successful
/// probe; `standby` stays put (its hourly recheck succeeding is the normal
/// case, not a recovery).
pub fn on_probe_success(state: MonitoringState) -> Option<MonitoringState> {
    match state {
        MonitoringState::Unknown
        | MonitoringState::Degraded
        | MonitoringState::Down
        | MonitoringState::Unresponsive
        | MonitoringState::Excluded
        | MonitoringState::Inactive => Some(MonitoringState::Active),
        MonitoringState::Active | MonitoringState::Standby => None,
    }
}

/// State to enter after a failed probe, if any.
///
/// Only discovery reacts per-probe to failure: `unknown` targets give up
/// after exactly `discovery_max_attempts` failed probes. Everything else is
/// the sweep's job.
pub fn on_probe_failure(
    state: MonitoringState,
    attempts: i32,
    thresholds: &StateThresholds,
) -> Option<MonitoringState> {
    match state {
        MonitoringState::Unknown if attempts >= thresholds.discovery_max_attempts => {
            Some(MonitoringState::Unresponsive)
        }
        _ => None,
    }
}

/// Evaluate one target against the time-threshold sweep rules.
pub fn evaluate_sweep(
    target: &Target,
    now: DateTime<Utc>,
    thresholds: &StateThresholds,
) -> Option<SweepAction> {
    if target.archived_at.is_some() {
        return None;
    }

    match target.monitoring_state {
        MonitoringState::Active => {
            let last_success = target
                .last_response_at
                .unwrap_or(target.state_changed_at);
            if now - last_success >= Duration::seconds(thresholds.down_secs) {
                // with a baseline this is an alertable outage; without one
                // the target never proved itself and goes unresponsive
                let to = if target.has_baseline() {
                    MonitoringState::Down
                } else {
                    MonitoringState::Unresponsive
                };
                return Some(SweepAction::Transition(to));
            }

            if target.baseline_established_at.is_none() {
                if let Some(first) = target.first_response_at {
                    if now - first >= Duration::seconds(thresholds.baseline_secs) {
                        return Some(SweepAction::EstablishBaseline);
                    }
                }
            }
            None
        }
        MonitoringState::Down => {
            // gateways and infrastructure stay down forever; exclusion is
            // for customer IPs that are likely gone
            if matches!(target.ip_type, IpType::Gateway | IpType::Infrastructure) {
                return None;
            }
            let last_success = target
                .last_response_at
                .unwrap_or(target.state_changed_at);
            if now - last_success >= Duration::seconds(thresholds.excluded_secs) {
                return Some(SweepAction::Transition(MonitoringState::Excluded));
            }
            None
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_metadata::{Origin, Ownership};
    use std::collections::HashMap;
    use uuid::Uuid;

    fn target(state: MonitoringState, ip_type: IpType) -> Target {
        let now = Utc::now();
        Target {
            id: Uuid::new_v4(),
            ip: "10.9.8.7".into(),
            subnet_id: Some(Uuid::new_v4()),
            tier: "standard".into(),
            ip_type,
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
    fn success_recovers_every_dormant_state() {
        assert_eq!(
            on_probe_success(MonitoringState::Unknown),
            Some(MonitoringState::Active)
        );
        assert_eq!(
            on_probe_success(MonitoringState::Down),
            Some(MonitoringState::Active)
        );
        assert_eq!(
            on_probe_success(MonitoringState::Excluded),
            Some(MonitoringState::Active)
        );
        assert_eq!(
            on_probe_success(MonitoringState::Inactive),
            Some(MonitoringState::Active)
        );
        assert_eq!(on_probe_success(MonitoringState::Active), None);
        assert_eq!(on_probe_success(MonitoringState::Standby), None);
    }

    #[test]
    fn discovery_gives_up_at_exactly_max_attempts() {
        let thresholds = StateThresholds::default();

        assert_eq!(
            on_probe_failure(MonitoringState::Unknown, 4, &thresholds),
            None
        );
        assert_eq!(
            on_probe_failure(MonitoringState::Unknown, 5, &thresholds),
            Some(MonitoringState::Unresponsive)
        );
        assert_eq!(
            on_probe_failure(MonitoringState::Active, 50, &thresholds),
            None
        );
    }

    #[test]
    fn baseline_establishes_after_the_threshold() {
        let thresholds = StateThresholds::default();
        let now = Utc::now();
        let mut t = target(MonitoringState::Active, IpType::Customer);
        t.first_response_at = Some(now - Duration::seconds(90));
        t.last_response_at = Some(now - Duration::seconds(5));

        assert_eq!(
            evaluate_sweep(&t, now, &thresholds),
            Some(SweepAction::EstablishBaseline)
        );

        // too fresh: nothing happens yet
        t.first_response_at = Some(now - Duration::seconds(30));
        assert_eq!(evaluate_sweep(&t, now, &thresholds), None);
    }

    #[test]
    fn stale_active_target_goes_down_with_baseline_else_unresponsive() {
        let thresholds = StateThresholds::default();
        let now = Utc::now();

        let mut with_baseline = target(MonitoringState::Active, IpType::Customer);
        with_baseline.baseline_established_at = Some(now - Duration::minutes(60));
        with_baseline.first_response_at = Some(now - Duration::minutes(61));
        with_baseline.last_response_at = Some(now - Duration::minutes(16));
        assert_eq!(
            evaluate_sweep(&with_baseline, now, &thresholds),
            Some(SweepAction::Transition(MonitoringState::Down))
        );

        let mut without = target(MonitoringState::Active, IpType::Customer);
        without.first_response_at = Some(now - Duration::minutes(61));
        without.last_response_at = Some(now - Duration::minutes(16));
        assert_eq!(
            evaluate_sweep(&without, now, &thresholds),
            Some(SweepAction::Transition(MonitoringState::Unresponsive))
        );
    }

    #[test]
    fn exclusion_spares_gateway_and_infrastructure() {
        let thresholds = StateThresholds::default();
        let now = Utc::now();

        let mut customer = target(MonitoringState::Down, IpType::Customer);
        customer.last_response_at = Some(now - Duration::hours(25));
        assert_eq!(
            evaluate_sweep(&customer, now, &thresholds),
            Some(SweepAction::Transition(MonitoringState::Excluded))
        );

        let mut gateway = target(MonitoringState::Down, IpType::Gateway);
        gateway.last_response_at = Some(now - Duration::hours(25));
        assert_eq!(evaluate_sweep(&gateway, now, &thresholds), None);

        let mut infra = target(MonitoringState::Down, IpType::Infrastructure);
        infra.last_response_at = Some(now - Duration::hours(25));
        assert_eq!(evaluate_sweep(&infra, now, &thresholds), None);
    }

    #[test]
    fn archived_targets_are_invisible_to_the_sweep() {
        let thresholds = StateThresholds::default();
        let now = Utc::now();
        let mut t = target(MonitoringState::Active, IpType::Customer);
        t.last_response_at = Some(now - Duration::hours(2));
        t.archived_at = Some(now);
        assert_eq!(evaluate_sweep(&t, now, &thresholds), None);
    }
}
