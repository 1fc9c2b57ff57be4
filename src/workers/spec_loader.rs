//! Builds planner inputs: one `TargetSpec` per target, with the lifecycle
//! engine's effective-tier override already applied.

use std::collections::HashMap;
use tracing::warn;

use assignment_engine::{TargetSpec, ICMP_EXECUTOR};
use registry_metadata::{
    RegistryResult, SelectionPolicy, SubnetId, Target, TargetId, Tier,
};
use target_lifecycle::effective_tier;

use crate::platform::context::AppContext;

/// Specs for every non-archived target; feeds full materialization.
pub async fn load_all_specs(ctx: &AppContext) -> RegistryResult<Vec<TargetSpec>> {
    let targets = ctx.registry().list_targets().await?;
    build_specs(ctx, targets).await
}

/// Specs for a specific set of targets; feeds delta and failover passes.
pub async fn load_specs_for(
    ctx: &AppContext,
    ids: &[TargetId],
) -> RegistryResult<Vec<TargetSpec>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let targets = ctx.registry().get_targets(ids).await?;
    build_specs(ctx, targets).await
}

async fn build_specs(ctx: &AppContext, targets: Vec<Target>) -> RegistryResult<Vec<TargetSpec>> {
    let tiers: HashMap<String, Tier> = ctx
        .registry()
        .list_tiers()
        .await?
        .into_iter()
        .map(|t| (t.name.clone(), t))
        .collect();
    let coverage: HashMap<SubnetId, i64> = ctx
        .registry()
        .active_customer_counts()
        .await?
        .into_iter()
        .collect();

    let mut specs = Vec::with_capacity(targets.len());
    for target in &targets {
        if target.archived_at.is_some() {
            continue;
        }
        let covered = target
            .subnet_id
            .and_then(|s| coverage.get(&s))
            .copied()
            .unwrap_or(0)
            > 0;

        let policy: Option<SelectionPolicy> = match effective_tier(target, covered) {
            Some(tier_name) => match tiers.get(tier_name) {
                Some(tier) => Some(tier.selection_policy.clone()),
                None => {
                    warn!(target = %target.id, tier = %tier_name, "tier missing, target unplanned");
                    None
                }
            },
            None => None,
        };

        let effective = effective_tier(target, covered)
            .unwrap_or(target.tier.as_str())
            .to_string();
        specs.push(TargetSpec {
            target_id: target.id,
            subnet_id: target.subnet_id,
            effective_tier: effective,
            policy,
            required_executor: ICMP_EXECUTOR.to_string(),
        });
    }
    Ok(specs)
}
