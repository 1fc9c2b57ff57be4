//! Change-feed interpretation: which targets does a batch of registry
//! changes force the planner to revisit?

use std::collections::HashSet;

use registry_metadata::{AgentId, EntityChange, EntityKind, SubnetId, TargetId};

/// Scope of a delta recompute. Identifiers are collected per entity family;
/// the worker resolves them to concrete target lists (all targets of a
/// subnet for subnet changes, all targets of a tier for tier changes, all
/// targets held by an agent for agent changes).
#[derive(Debug, Default, Clone)]
pub struct AffectedScope {
    pub target_ids: HashSet<TargetId>,
    pub subnet_ids: HashSet<SubnetId>,
    pub tier_names: HashSet<String>,
    pub agent_ids: HashSet<AgentId>,
    /// Highest change version folded into this scope
    pub through_version: i64,
}

impl AffectedScope {
    /// Fold a batch of change rows into a recompute scope.
    pub fn from_changes(changes: &[EntityChange]) -> Self {
        let mut scope = Self::default();
        for change in changes {
            scope.through_version = scope.through_version.max(change.version);
            match change.entity_kind {
                EntityKind::Target => {
                    if let Ok(id) = change.entity_id.parse() {
                        scope.target_ids.insert(id);
                    }
                }
                EntityKind::Subnet => {
                    if let Ok(id) = change.entity_id.parse() {
                        scope.subnet_ids.insert(id);
                    }
                }
                EntityKind::Tier => {
                    scope.tier_names.insert(change.entity_id.clone());
                }
                EntityKind::Agent => {
                    if let Ok(id) = change.entity_id.parse() {
                        scope.agent_ids.insert(id);
                    }
                }
                // assignment rows never appear on the feed; the version bump
                // alone tells agents to re-fetch
                EntityKind::Assignment => {}
            }
        }
        scope
    }

    pub fn is_empty(&self) -> bool {
        self.target_ids.is_empty()
            && self.subnet_ids.is_empty()
            && self.tier_names.is_empty()
            && self.agent_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use registry_metadata::ChangeKind;
    use uuid::Uuid;

    fn change(version: i64, kind: EntityKind, id: String) -> EntityChange {
        EntityChange {
            version,
            entity_kind: kind,
            entity_id: id,
            change: ChangeKind::Updated,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn changes_fold_into_scoped_sets() {
        let target = Uuid::new_v4();
        let subnet = Uuid::new_v4();
        let agent = Uuid::new_v4();
        let changes = vec![
            change(5, EntityKind::Target, target.to_string()),
            change(6, EntityKind::Subnet, subnet.to_string()),
            change(7, EntityKind::Tier, "vip".into()),
            change(8, EntityKind::Agent, agent.to_string()),
        ];

        let scope = AffectedScope::from_changes(&changes);
        assert!(scope.target_ids.contains(&target));
        assert!(scope.subnet_ids.contains(&subnet));
        assert!(scope.tier_names.contains("vip"));
        assert!(scope.agent_ids.contains(&agent));
        assert_eq!(scope.through_version, 8);
        assert!(!scope.is_empty());
    }

    #[test]
    fn empty_feed_yields_empty_scope() {
        let scope = AffectedScope::from_changes(&[]);
        assert!(scope.is_empty());
        assert_eq!(scope.through_version, 0);
    }
}
