//! # Lifecycle Unit Tests
//!
//! Transition-rule coverage over the monitoring state machine, including
//! the boundary behaviors: five-failure discovery exhaustion, the
//! baseline→down→excluded timeline, and deterministic promotion.

use chrono::{Duration, Utc};
use registry_metadata::{IpType, MonitoringState, Origin, Ownership, Target};
use std::collections::HashMap;
use target_lifecycle::*;
use uuid::Uuid;

fn target(state: MonitoringState, ip_type: IpType) -> Target {
    let now = Utc::now();
    Target {
        id: Uuid::new_v4(),
        ip: "100.64.0.8".into(),
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
fn unknown_turns_active_on_first_success() {
    assert_eq!(
        on_probe_success(MonitoringState::Unknown),
        Some(MonitoringState::Active)
    );
}

#[test]
fn discovery_exhaustion_is_exact() {
    let thresholds = StateThresholds::default();
    // not at 4 failures, exactly at 5, still at 6
    assert_eq!(on_probe_failure(MonitoringState::Unknown, 4, &thresholds), None);
    assert_eq!(
        on_probe_failure(MonitoringState::Unknown, 5, &thresholds),
        Some(MonitoringState::Unresponsive)
    );
    assert_eq!(
        on_probe_failure(MonitoringState::Unknown, 6, &thresholds),
        Some(MonitoringState::Unresponsive)
    );
}

#[test]
fn baseline_then_down_then_excluded_timeline() {
    let thresholds = StateThresholds::default();
    let start = Utc::now();
    let mut t = target(MonitoringState::Active, IpType::Customer);
    t.first_response_at = Some(start);
    t.last_response_at = Some(start + Duration::minutes(2));

    // sweep at t=1m: baseline establishes
    assert_eq!(
        evaluate_sweep(&t, start + Duration::minutes(1), &thresholds),
        Some(SweepAction::EstablishBaseline)
    );
    t.baseline_established_at = Some(start + Duration::minutes(1));

    // sweep at t=10m: still inside the down window
    assert_eq!(evaluate_sweep(&t, start + Duration::minutes(10), &thresholds), None);

    // sweep at t=17m: 15 minutes without a response, goes down
    assert_eq!(
        evaluate_sweep(&t, start + Duration::minutes(17), &thresholds),
        Some(SweepAction::Transition(MonitoringState::Down))
    );
    t.monitoring_state = MonitoringState::Down;

    // sweep at 24h+2m after the last response: excluded
    assert_eq!(
        evaluate_sweep(
            &t,
            start + Duration::minutes(2) + Duration::hours(24) + Duration::minutes(2),
            &thresholds
        ),
        Some(SweepAction::Transition(MonitoringState::Excluded))
    );
}

#[test]
fn effective_tier_mapping_matches_states() {
    let mut t = target(MonitoringState::Active, IpType::Customer);
    assert_eq!(effective_tier(&t, true), Some("standard"));

    t.monitoring_state = MonitoringState::Unknown;
    assert_eq!(effective_tier(&t, true), Some("discovery"));

    t.monitoring_state = MonitoringState::Standby;
    assert_eq!(effective_tier(&t, true), Some("standby_recheck"));

    t.monitoring_state = MonitoringState::Excluded;
    assert_eq!(effective_tier(&t, true), None);
    assert_eq!(effective_tier(&t, false), Some("smart_recheck"));
}

#[test]
fn promotion_is_deterministic_under_same_tick_baselines() {
    let now = Utc::now();
    let mut c1 = target(MonitoringState::Standby, IpType::Customer);
    c1.ip = "10.2.0.11".into();
    c1.baseline_established_at = Some(now);
    let mut c3 = target(MonitoringState::Standby, IpType::Customer);
    c3.ip = "10.2.0.2".into();
    c3.baseline_established_at = Some(now);

    // identical baseline instants fall back to ascending IP
    let candidates = [c1, c3.clone()];
    let picked = pick_promotion(&candidates).unwrap();
    assert_eq!(picked.id, c3.id);
}

#[test]
fn oldest_standby_is_promoted_first() {
    let now = Utc::now();
    let mut newer = target(MonitoringState::Standby, IpType::Customer);
    newer.baseline_established_at = Some(now - Duration::minutes(2));
    let mut older = target(MonitoringState::Standby, IpType::Customer);
    older.baseline_established_at = Some(now - Duration::minutes(50));

    let candidates = [newer, older.clone()];
    let picked = pick_promotion(&candidates).unwrap();
    assert_eq!(picked.id, older.id);
}
