//! # Registry Unit Tests
//!
//! Pure-logic coverage for the entity model: derived agent status, CIDR
//! invariants, policy parsing, and threshold defaults. Store round-trips
//! against a live database are exercised in deployment, not here.

use chrono::{Duration, Utc};
use registry_metadata::*;
use std::collections::HashMap;
use uuid::Uuid;

fn sample_agent() -> Agent {
    Agent {
        id: Uuid::new_v4(),
        name: "edge-nyc-1".into(),
        region: "us-east".into(),
        location: "nyc1".into(),
        provider: "equinix".into(),
        tags: HashMap::new(),
        public_ip: Some("198.51.100.10".into()),
        version: Some("1.7.2".into()),
        executors: vec!["icmp".into()],
        max_targets: 1000,
        api_key_hash: "$argon2id$v=19$stub".into(),
        last_heartbeat: None,
        archived_at: None,
        assignment_version_seen: 12,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[test]
fn agent_status_is_pure_function_of_heartbeat_age() {
    let now = Utc::now();
    let mut agent = sample_agent();

    agent.last_heartbeat = Some(now - Duration::seconds(10));
    assert_eq!(agent.status_at(now), AgentStatus::Active);

    agent.last_heartbeat = Some(now - Duration::seconds(45));
    assert_eq!(agent.status_at(now), AgentStatus::Degraded);

    agent.last_heartbeat = Some(now - Duration::seconds(90));
    assert_eq!(agent.status_at(now), AgentStatus::Offline);

    agent.last_heartbeat = None;
    assert_eq!(agent.status_at(now), AgentStatus::Offline);
}

#[test]
fn agent_status_offline_boundary_is_inclusive() {
    let now = Utc::now();
    let mut agent = sample_agent();

    agent.last_heartbeat = Some(now - Duration::seconds(60));
    assert_eq!(agent.status_at(now), AgentStatus::Offline);

    agent.last_heartbeat = Some(now - Duration::milliseconds(59_900));
    assert_eq!(agent.status_at(now), AgentStatus::Degraded);
}

#[test]
fn subnet_network_must_be_canonical() {
    assert!(parse_canonical_network("203.0.113.0/26").is_ok());
    assert!(parse_canonical_network("203.0.113.32/26").is_ok());
    assert!(parse_canonical_network("203.0.113.33/26").is_err());
    assert!(parse_canonical_network("not-a-network").is_err());
}

#[test]
fn usable_range_is_consistent_with_prefix() {
    let net = parse_canonical_network("10.1.2.0/24").unwrap();
    let (first, last) = usable_range(&net);
    assert_eq!(first.to_string(), "10.1.2.1");
    assert_eq!(last.to_string(), "10.1.2.254");
}

#[test]
fn selection_policy_round_trips_through_json() {
    for policy in [
        SelectionPolicy::All,
        SelectionPolicy::Distributed { count: 2 },
        SelectionPolicy::Region {
            regions: vec!["us-east".into()],
            count: 1,
        },
    ] {
        let json = serde_json::to_string(&policy).unwrap();
        let back: SelectionPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(policy, back);
    }
}

#[test]
fn monitoring_state_text_is_stable() {
    for (state, text) in [
        (MonitoringState::Unknown, "unknown"),
        (MonitoringState::Active, "active"),
        (MonitoringState::Degraded, "degraded"),
        (MonitoringState::Down, "down"),
        (MonitoringState::Unresponsive, "unresponsive"),
        (MonitoringState::Excluded, "excluded"),
        (MonitoringState::Inactive, "inactive"),
        (MonitoringState::Standby, "standby"),
    ] {
        assert_eq!(state.as_str(), text);
        assert_eq!(text.parse::<MonitoringState>().unwrap(), state);
    }
}

#[test]
fn alert_threshold_defaults() {
    let thresholds = AlertThresholds::default();
    assert_eq!(thresholds.latency_warning_ms, 100.0);
    assert_eq!(thresholds.packet_loss_critical_pct, 20.0);
    assert_eq!(thresholds.incident_creation_threshold, 2);
}

#[test]
fn reserved_tiers_cover_every_recheck_state() {
    assert!(RESERVED_TIERS.contains(&DISCOVERY_TIER));
    assert!(RESERVED_TIERS.contains(&SMART_RECHECK_TIER));
    assert!(RESERVED_TIERS.contains(&INACTIVE_RECHECK_TIER));
    assert!(RESERVED_TIERS.contains(&STANDBY_RECHECK_TIER));
}
