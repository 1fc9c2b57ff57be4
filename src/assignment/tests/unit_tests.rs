//! # Assignment Engine Unit Tests
//!
//! Planner invariants from the selection policies: bounded counts,
//! diversity, stickiness, and capacity.

use assignment_engine::*;
use registry_metadata::{AgentId, SelectionPolicy};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

fn agent(region: &str, provider: &str) -> AgentSnapshot {
    AgentSnapshot {
        agent_id: Uuid::new_v4(),
        region: region.into(),
        provider: provider.into(),
        max_targets: 100,
        executors: vec!["icmp".into()],
        active: true,
    }
}

fn spec(policy: SelectionPolicy) -> TargetSpec {
    TargetSpec {
        target_id: Uuid::new_v4(),
        subnet_id: None,
        effective_tier: "standard".into(),
        policy: Some(policy),
        required_executor: ICMP_EXECUTOR.into(),
    }
}

#[test]
fn distributed_selects_exactly_n_when_possible() {
    let agents: Vec<AgentSnapshot> = (0..5).map(|i| agent(&format!("r{i}"), "p")).collect();
    let sel = select_agents(
        &spec(SelectionPolicy::Distributed { count: 3 }),
        &agents,
        &HashMap::new(),
        &HashSet::new(),
    );
    assert_eq!(sel.desired.len(), 3);
    assert!(!sel.under_assigned);
}

#[test]
fn distributed_count_never_exceeds_candidates() {
    let agents = vec![agent("us-east", "a"), agent("us-west", "b")];
    let sel = select_agents(
        &spec(SelectionPolicy::Distributed { count: 4 }),
        &agents,
        &HashMap::new(),
        &HashSet::new(),
    );
    assert_eq!(sel.desired.len(), 2);
    assert!(sel.under_assigned);
}

#[test]
fn diversity_beats_spare_capacity() {
    // two agents in us-east with huge headroom, one in us-west almost full:
    // the second slot still goes west for the distinct (region, provider) pair
    let east1 = agent("us-east", "colo");
    let east2 = agent("us-east", "colo");
    let mut west = agent("us-west", "colo");
    west.max_targets = 10;
    let load: HashMap<AgentId, i64> = [(west.agent_id, 9)].into_iter().collect();
    let agents = vec![east1, east2, west.clone()];

    let sel = select_agents(
        &spec(SelectionPolicy::Distributed { count: 2 }),
        &agents,
        &load,
        &HashSet::new(),
    );
    assert!(sel.desired.contains(&west.agent_id));
}

#[test]
fn plans_are_deterministic_for_identical_inputs() {
    let agents: Vec<AgentSnapshot> = (0..8).map(|_| agent("us-east", "a")).collect();
    let target = spec(SelectionPolicy::Distributed { count: 2 });

    let a = select_agents(&target, &agents, &HashMap::new(), &HashSet::new());
    let b = select_agents(&target, &agents, &HashMap::new(), &HashSet::new());
    assert_eq!(a, b);
}

#[test]
fn current_assignees_survive_reruns_without_churn() {
    let agents: Vec<AgentSnapshot> = (0..4).map(|_| agent("us-east", "a")).collect();
    let target = spec(SelectionPolicy::Distributed { count: 2 });

    let first = select_agents(&target, &agents, &HashMap::new(), &HashSet::new());
    let current: HashSet<AgentId> = first.desired.iter().copied().collect();
    let load: HashMap<AgentId, i64> = current.iter().map(|id| (*id, 1)).collect();

    let rerun = select_agents(&target, &agents, &load, &current);
    let rerun_set: HashSet<AgentId> = rerun.desired.iter().copied().collect();
    assert_eq!(current, rerun_set, "idempotent re-plan must not move targets");
}

#[test]
fn scope_resolution_covers_every_entity_family() {
    use chrono::Utc;
    use registry_metadata::{ChangeKind, EntityChange, EntityKind};

    let tier_change = EntityChange {
        version: 41,
        entity_kind: EntityKind::Tier,
        entity_id: "vip".into(),
        change: ChangeKind::Updated,
        occurred_at: Utc::now(),
    };
    let garbage_agent = EntityChange {
        version: 42,
        entity_kind: EntityKind::Agent,
        entity_id: "not-a-uuid".into(),
        change: ChangeKind::Updated,
        occurred_at: Utc::now(),
    };

    let scope = AffectedScope::from_changes(&[tier_change, garbage_agent]);
    assert!(scope.tier_names.contains("vip"));
    // unparseable ids are dropped rather than wedging the worker
    assert!(scope.agent_ids.is_empty());
    assert_eq!(scope.through_version, 42);
}
