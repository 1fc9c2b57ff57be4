//! # Fleet Gateway Unit Tests
//!
//! Edge detection and flap suppression; registry-backed paths are covered
//! operationally.

use chrono::{Duration, Utc};
use fleet_gateway::*;
use registry_metadata::AgentStatus;
use uuid::Uuid;

#[test]
fn degraded_agent_is_not_an_edge() {
    let id = Uuid::new_v4();
    assert_eq!(
        transition_for(Some(AgentStatus::Active), AgentStatus::Degraded, id),
        None
    );
    assert_eq!(
        transition_for(Some(AgentStatus::Degraded), AgentStatus::Active, id),
        None
    );
}

#[test]
fn offline_to_active_is_recovery() {
    let id = Uuid::new_v4();
    assert_eq!(
        transition_for(Some(AgentStatus::Offline), AgentStatus::Active, id),
        Some(AgentTransition::Recovered(id))
    );
}

#[test]
fn transition_carries_its_agent() {
    let id = Uuid::new_v4();
    assert_eq!(AgentTransition::Offline(id).agent_id(), id);
    assert_eq!(AgentTransition::Recovered(id).agent_id(), id);
}

#[tokio::test]
async fn flap_suppression_resumes_after_quiet_period() {
    let suppressor = FlapSuppressor::new(Duration::minutes(5), 3);
    let id = Uuid::new_v4();
    let base = Utc::now();

    for i in 0..4 {
        suppressor.record(id, base + Duration::seconds(i * 20)).await;
    }
    assert!(suppressor.is_suppressed(id, base + Duration::seconds(70)).await);

    // all four transitions age out after the five-minute window
    assert!(!suppressor.is_suppressed(id, base + Duration::minutes(6)).await);
}
