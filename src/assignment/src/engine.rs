//! The assignment engine: serialized planning passes over target specs.
//!
//! One pass at a time per process (the assignment mutex); full
//! materializations additionally hold a single-flight flag so a second
//! trigger reports busy instead of queueing.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{info, warn};

use registry_metadata::{
    AgentId, AssignedBy, MetadataRegistry, NewAssignment, TargetId,
};

use crate::metrics;
use crate::planner::select_agents;
use crate::types::{AgentSnapshot, AssignmentError, AssignmentResult, PlanOutcome, TargetSpec};

pub struct AssignmentEngine {
    registry: MetadataRegistry,
    /// Serializes every planning pass in this process
    pass_lock: Mutex<()>,
    /// Single-flight gate for full materializations
    materializing: AtomicBool,
}

impl AssignmentEngine {
    pub fn new(registry: MetadataRegistry) -> Self {
        Self {
            registry,
            pass_lock: Mutex::new(()),
            materializing: AtomicBool::new(false),
        }
    }

    /// Whether a full materialization is currently in flight.
    pub fn is_materializing(&self) -> bool {
        self.materializing.load(Ordering::SeqCst)
    }

    /// Full materialization over every monitorable target. Idempotent: with
    /// no underlying changes the applied plan is empty and the version is
    /// untouched. Returns `Busy` when one is already running.
    pub async fn materialize(&self, specs: &[TargetSpec]) -> AssignmentResult<PlanOutcome> {
        if self.materializing.swap(true, Ordering::SeqCst) {
            return Err(AssignmentError::Busy);
        }
        let outcome = self.apply(specs, AssignedBy::Initial).await;
        self.materializing.store(false, Ordering::SeqCst);
        if let Ok(outcome) = &outcome {
            info!(
                inserted = outcome.applied.inserted,
                deleted = outcome.applied.deleted,
                under_assigned = outcome.under_assigned.len(),
                "full materialization finished"
            );
        }
        outcome
    }

    /// One planning pass over the given specs. The specs are authoritative
    /// for exactly those targets: agents not in a target's desired set are
    /// unassigned, missing ones are inserted, untouched targets are never
    /// read or written.
    pub async fn apply(
        &self,
        specs: &[TargetSpec],
        assigned_by: AssignedBy,
    ) -> AssignmentResult<PlanOutcome> {
        let _guard = self.pass_lock.lock().await;
        self.apply_locked(specs, assigned_by).await
    }

    async fn apply_locked(
        &self,
        specs: &[TargetSpec],
        assigned_by: AssignedBy,
    ) -> AssignmentResult<PlanOutcome> {
        let now = Utc::now();

        let agents = self.registry.list_agents().await?;
        let snapshots: Vec<AgentSnapshot> = agents
            .iter()
            .map(|a| AgentSnapshot::from_agent(a, now))
            .collect();

        let mut load: HashMap<AgentId, i64> = self
            .registry
            .assignment_counts_by_agent()
            .await?
            .into_iter()
            .collect();

        // current agents per target, with the tier each assignment runs at
        let mut current_by_target: HashMap<TargetId, HashMap<AgentId, String>> = HashMap::new();
        for assignment in self.registry.list_assignments().await? {
            current_by_target
                .entry(assignment.target_id)
                .or_default()
                .insert(assignment.agent_id, assignment.tier);
        }

        let mut inserts: Vec<NewAssignment> = Vec::new();
        let mut deletes: Vec<(TargetId, AgentId, AssignedBy)> = Vec::new();
        let mut under_assigned: Vec<TargetId> = Vec::new();
        let mut satisfied: Vec<TargetId> = Vec::new();
        let mut orphaned: Vec<TargetId> = Vec::new();
        let mut skipped = 0usize;

        for spec in specs {
            let current = current_by_target
                .remove(&spec.target_id)
                .unwrap_or_default();

            if spec.policy.is_none() && current.is_empty() {
                continue;
            }
            if spec
                .policy
                .as_ref()
                .and_then(|p| p.required_count())
                .map(|c| c == 0)
                .unwrap_or(false)
            {
                warn!(target = %spec.target_id, "skipping target with zero-count policy");
                skipped += 1;
                continue;
            }

            let current_agents: HashSet<AgentId> = current.keys().copied().collect();
            let selection = select_agents(spec, &snapshots, &load, &current_agents);
            let desired: HashSet<AgentId> = selection.desired.iter().copied().collect();

            for agent_id in &selection.desired {
                match current.get(agent_id) {
                    None => {
                        inserts.push(NewAssignment {
                            target_id: spec.target_id,
                            agent_id: *agent_id,
                            tier: spec.effective_tier.clone(),
                            assigned_by,
                        });
                        *load.entry(*agent_id).or_insert(0) += 1;
                    }
                    // kept pair whose effective tier moved: re-emit so the
                    // store updates the cadence in place
                    Some(tier) if *tier != spec.effective_tier => {
                        inserts.push(NewAssignment {
                            target_id: spec.target_id,
                            agent_id: *agent_id,
                            tier: spec.effective_tier.clone(),
                            assigned_by,
                        });
                    }
                    Some(_) => {}
                }
            }
            for agent_id in current.keys() {
                if !desired.contains(agent_id) {
                    deletes.push((spec.target_id, *agent_id, assigned_by));
                    if let Some(n) = load.get_mut(agent_id) {
                        *n -= 1;
                    }
                }
            }

            if selection.under_assigned {
                under_assigned.push(spec.target_id);
            } else {
                satisfied.push(spec.target_id);
            }
            if desired.is_empty() && !current.is_empty() {
                orphaned.push(spec.target_id);
            }
        }

        let applied = self
            .registry
            .apply_assignment_plan(&inserts, &deletes)
            .await?;

        self.registry.set_under_assigned(&under_assigned, true).await?;
        self.registry.set_under_assigned(&satisfied, false).await?;

        metrics::PLAN_PASSES_TOTAL.inc();
        metrics::UNDER_ASSIGNED_TARGETS.set(under_assigned.len() as i64);

        Ok(PlanOutcome {
            applied,
            under_assigned,
            orphaned,
            skipped,
        })
    }
}
