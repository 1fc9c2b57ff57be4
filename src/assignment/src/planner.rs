//! Pure selection logic: candidate filtering, diversity maximization, and
//! sticky tie-breaking.
//!
//! Selection has no side effects and no clock; the engine feeds it
//! snapshots and applies the resulting delta. Re-running against unchanged
//! state always reproduces the same plan.

use std::collections::{HashMap, HashSet};

use registry_metadata::{AgentId, SelectionPolicy, TargetId};

use crate::types::{AgentSnapshot, Selection, TargetSpec};

/// Stable FNV-1a hash of a (target, agent) pair.
///
/// The last tie-break in candidate ordering; because it depends only on the
/// two ids, plans stay sticky across reruns.
pub fn stable_pair_hash(target_id: TargetId, agent_id: AgentId) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for byte in target_id.as_bytes().iter().chain(agent_id.as_bytes()) {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Pick the agent set for one target under its tier policy.
///
/// Candidates are active agents that support the required executor (and
/// fall inside the policy's region set). Capacity excludes agents already
/// at `max_targets`, except agents currently holding this target, whose
/// load already counts it.
///
/// For bounded policies the greedy order is: new (region, provider) pair
/// first, then currently-assigned (stickiness), then spare capacity, then
/// the stable pair hash. A recovered agent therefore only displaces a
/// current assignee when it improves diversity.
pub fn select_agents(
    spec: &TargetSpec,
    agents: &[AgentSnapshot],
    load: &HashMap<AgentId, i64>,
    current: &HashSet<AgentId>,
) -> Selection {
    let Some(policy) = &spec.policy else {
        return Selection {
            desired: Vec::new(),
            under_assigned: false,
        };
    };

    let region_filter = policy.region_filter();
    let candidates: Vec<&AgentSnapshot> = agents
        .iter()
        .filter(|a| a.active)
        .filter(|a| a.executors.iter().any(|e| e == &spec.required_executor))
        .filter(|a| match region_filter {
            Some(regions) => regions.iter().any(|r| r == &a.region),
            None => true,
        })
        .filter(|a| {
            let used = load.get(&a.agent_id).copied().unwrap_or(0);
            used < a.max_targets || current.contains(&a.agent_id)
        })
        .collect();

    match policy {
        SelectionPolicy::All => Selection {
            desired: candidates.iter().map(|a| a.agent_id).collect(),
            under_assigned: false,
        },
        SelectionPolicy::Distributed { count } | SelectionPolicy::Region { count, .. } => {
            let wanted = *count as usize;
            let mut chosen: Vec<AgentId> = Vec::with_capacity(wanted);
            let mut chosen_pairs: HashSet<(&str, &str)> = HashSet::new();

            while chosen.len() < wanted {
                let next = candidates
                    .iter()
                    .filter(|a| !chosen.contains(&a.agent_id))
                    .max_by_key(|a| {
                        let adds_pair =
                            !chosen_pairs.contains(&(a.region.as_str(), a.provider.as_str()));
                        let sticky = current.contains(&a.agent_id);
                        let spare =
                            a.max_targets - load.get(&a.agent_id).copied().unwrap_or(0);
                        (
                            adds_pair,
                            sticky,
                            spare,
                            stable_pair_hash(spec.target_id, a.agent_id),
                        )
                    });
                match next {
                    Some(agent) => {
                        chosen_pairs.insert((agent.region.as_str(), agent.provider.as_str()));
                        chosen.push(agent.agent_id);
                    }
                    None => break,
                }
            }

            Selection {
                under_assigned: chosen.len() < wanted,
                desired: chosen,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn agent(region: &str, provider: &str, max: i64) -> AgentSnapshot {
        AgentSnapshot {
            agent_id: Uuid::new_v4(),
            region: region.into(),
            provider: provider.into(),
            max_targets: max,
            executors: vec!["icmp".into(), "mtr".into()],
            active: true,
        }
    }

    fn spec(policy: SelectionPolicy) -> TargetSpec {
        TargetSpec {
            target_id: Uuid::new_v4(),
            subnet_id: None,
            effective_tier: "vip".into(),
            policy: Some(policy),
            required_executor: "icmp".into(),
        }
    }

    #[test]
    fn all_policy_takes_every_candidate() {
        let agents = vec![agent("us-east", "a", 10), agent("us-west", "b", 10)];
        let sel = select_agents(
            &spec(SelectionPolicy::All),
            &agents,
            &HashMap::new(),
            &HashSet::new(),
        );
        assert_eq!(sel.desired.len(), 2);
        assert!(!sel.under_assigned);
    }

    #[test]
    fn distributed_prefers_region_provider_diversity() {
        let east1 = agent("us-east", "colo", 10);
        let east2 = agent("us-east", "colo", 10);
        let west = agent("us-west", "colo", 10);
        let agents = vec![east1.clone(), east2.clone(), west.clone()];

        let sel = select_agents(
            &spec(SelectionPolicy::Distributed { count: 2 }),
            &agents,
            &HashMap::new(),
            &HashSet::new(),
        );
        assert_eq!(sel.desired.len(), 2);
        // one east, one west: two distinct (region, provider) pairs
        assert!(sel.desired.contains(&west.agent_id));
        assert!(!sel.under_assigned);
    }

    #[test]
    fn under_assignment_is_flagged_when_fleet_is_short() {
        let agents = vec![agent("us-east", "a", 10)];
        let sel = select_agents(
            &spec(SelectionPolicy::Distributed { count: 3 }),
            &agents,
            &HashMap::new(),
            &HashSet::new(),
        );
        assert_eq!(sel.desired.len(), 1);
        assert!(sel.under_assigned);
    }

    #[test]
    fn region_policy_restricts_candidates() {
        let east = agent("us-east", "a", 10);
        let west = agent("us-west", "a", 10);
        let agents = vec![east.clone(), west];

        let sel = select_agents(
            &spec(SelectionPolicy::Region {
                regions: vec!["us-east".into()],
                count: 2,
            }),
            &agents,
            &HashMap::new(),
            &HashSet::new(),
        );
        assert_eq!(sel.desired, vec![east.agent_id]);
        assert!(sel.under_assigned);
    }

    #[test]
    fn capacity_excludes_full_agents_but_keeps_current_holders() {
        let full = agent("us-east", "a", 5);
        let open = agent("us-west", "b", 5);
        let agents = vec![full.clone(), open.clone()];
        let load: HashMap<AgentId, i64> = [(full.agent_id, 5)].into_iter().collect();

        // full agent not currently holding the target is filtered out
        let sel = select_agents(
            &spec(SelectionPolicy::Distributed { count: 2 }),
            &agents,
            &load,
            &HashSet::new(),
        );
        assert_eq!(sel.desired, vec![open.agent_id]);
        assert!(sel.under_assigned);

        // but a current holder at capacity keeps the target
        let current: HashSet<AgentId> = [full.agent_id].into_iter().collect();
        let sel = select_agents(
            &spec(SelectionPolicy::Distributed { count: 2 }),
            &agents,
            &load,
            &current,
        );
        assert_eq!(sel.desired.len(), 2);
    }

    #[test]
    fn inactive_agents_and_missing_executors_are_filtered() {
        let mut offline = agent("us-east", "a", 10);
        offline.active = false;
        let mut no_icmp = agent("us-west", "b", 10);
        no_icmp.executors = vec!["mtr".into()];
        let good = agent("eu-west", "c", 10);
        let agents = vec![offline, no_icmp, good.clone()];

        let sel = select_agents(
            &spec(SelectionPolicy::Distributed { count: 3 }),
            &agents,
            &HashMap::new(),
            &HashSet::new(),
        );
        assert_eq!(sel.desired, vec![good.agent_id]);
    }

    #[test]
    fn selection_is_sticky_across_reruns() {
        let agents: Vec<AgentSnapshot> = (0..6).map(|_| agent("us-east", "a", 100)).collect();
        let target = spec(SelectionPolicy::Distributed { count: 2 });

        let first = select_agents(&target, &agents, &HashMap::new(), &HashSet::new());
        let current: HashSet<AgentId> = first.desired.iter().copied().collect();

        // with the first pick now current, a rerun keeps it
        let second = select_agents(&target, &agents, &HashMap::new(), &current);
        let second_set: HashSet<AgentId> = second.desired.iter().copied().collect();
        assert_eq!(current, second_set);
    }

    #[test]
    fn recovered_agent_displaces_only_for_diversity() {
        // scenario: T was on {A1(us-east), A2(us-east)}; A1 died and A3
        // (us-west) took over; A1 comes back
        let a1 = agent("us-east", "colo", 100);
        let a2 = agent("us-east", "colo", 100);
        let a3 = agent("us-west", "colo", 100);
        let agents = vec![a1.clone(), a2.clone(), a3.clone()];
        let target = spec(SelectionPolicy::Distributed { count: 2 });
        let current: HashSet<AgentId> = [a2.agent_id, a3.agent_id].into_iter().collect();

        let sel = select_agents(&target, &agents, &HashMap::new(), &current);
        let desired: HashSet<AgentId> = sel.desired.iter().copied().collect();
        // {A2, A3} already maximizes diversity; A1 must not churn the plan
        assert_eq!(desired, current);
    }

    #[test]
    fn no_policy_means_no_assignments() {
        let agents = vec![agent("us-east", "a", 10)];
        let mut target = spec(SelectionPolicy::All);
        target.policy = None;
        let sel = select_agents(&target, &agents, &HashMap::new(), &HashSet::new());
        assert!(sel.desired.is_empty());
        assert!(!sel.under_assigned);
    }

    #[test]
    fn pair_hash_is_stable_and_order_sensitive() {
        let t = Uuid::new_v4();
        let a = Uuid::new_v4();
        assert_eq!(stable_pair_hash(t, a), stable_pair_hash(t, a));
        if t != a {
            assert_ne!(stable_pair_hash(t, a), stable_pair_hash(a, t));
        }
    }
}
