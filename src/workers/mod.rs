//! # Background Worker Supervisor
//!
//! One service per periodic concern: the heartbeat sweep, the assignment
//! worker (transitions + change-feed deltas), the target state sweep, the
//! alert/incident cycle, and command expiry. Every loop runs its ticks
//! serially (a tick that overruns simply delays the next), stops at the
//! cancellation token, and survives panics by logging and continuing.

pub mod spec_loader;

pub use spec_loader::{load_all_specs, load_specs_for};

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use assignment_engine::{AffectedScope, AssignmentError, PlanOutcome};
use fleet_gateway::AgentTransition;
use registry_metadata::{AssignedBy, MonitoringState, TargetId};

use crate::platform::config::WorkerSettings;
use crate::platform::context::AppContext;
use crate::platform::service::ServiceRegistration;

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

macro_rules! guarded_tick {
    ($name:literal, $body:expr) => {
        match AssertUnwindSafe($body).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(worker = $name, error = %err, "tick failed"),
            Err(payload) => {
                error!(worker = $name, panic = %panic_message(payload), "tick panicked")
            }
        }
    };
}

// ---------------------------------------------------------------------------
// heartbeat sweep
// ---------------------------------------------------------------------------

pub fn heartbeat_service(settings: &WorkerSettings) -> ServiceRegistration {
    let every = Duration::from_secs(settings.heartbeat_interval_secs);
    ServiceRegistration::new(
        "heartbeat-sweep",
        Arc::new(move |ctx: AppContext, token: CancellationToken| {
            tokio::spawn(run_heartbeat(ctx, token, every))
        }),
    )
}

async fn run_heartbeat(
    ctx: AppContext,
    token: CancellationToken,
    every: Duration,
) -> anyhow::Result<()> {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("heartbeat sweep stopped");
                return Ok(());
            }
            _ = ticker.tick() => {
                let tracker = ctx.tracker();
                guarded_tick!("heartbeat-sweep", async {
                    tracker.sweep().await.map(|_| ()).map_err(anyhow::Error::from)
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// assignment worker
// ---------------------------------------------------------------------------

pub fn assignment_service(settings: &WorkerSettings) -> ServiceRegistration {
    let every = Duration::from_secs(settings.assignment_interval_secs);
    ServiceRegistration::new(
        "assignment",
        Arc::new(move |ctx: AppContext, token: CancellationToken| {
            tokio::spawn(run_assignment(ctx, token, every))
        }),
    )
}

async fn run_assignment(
    ctx: AppContext,
    token: CancellationToken,
    every: Duration,
) -> anyhow::Result<()> {
    let mut transitions = ctx.take_transitions().await;
    let mut last_version = ctx
        .registry()
        .current_assignment_version()
        .await
        .unwrap_or(0);

    // cold start: one full materialization brings the plan in line before
    // deltas take over
    match load_all_specs(&ctx).await {
        Ok(specs) => match ctx.assignment().materialize(&specs).await {
            Ok(outcome) => {
                last_version = last_version.max(outcome.applied.version);
                raise_orphan_alerts(&ctx, &outcome).await;
            }
            Err(AssignmentError::Busy) => {}
            Err(err) => warn!(error = %err, "startup materialization failed"),
        },
        Err(err) => warn!(error = %err, "startup spec load failed"),
    }

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("assignment worker stopped");
                return Ok(());
            }
            _ = ticker.tick() => {
                guarded_tick!("assignment", assignment_tick(&ctx, transitions.as_mut(), &mut last_version));
            }
        }
    }
}

async fn assignment_tick(
    ctx: &AppContext,
    transitions: Option<&mut mpsc::Receiver<AgentTransition>>,
    last_version: &mut i64,
) -> anyhow::Result<()> {
    if let Some(rx) = transitions {
        while let Ok(event) = rx.try_recv() {
            let now = Utc::now();
            if ctx.flap().record(event.agent_id(), now).await {
                continue;
            }
            match event {
                AgentTransition::Offline(agent_id) => {
                    // one pass: the offline agent fails the candidate filter,
                    // so its targets are stripped and re-placed together
                    // under a single version bump
                    let freed = ctx
                        .registry()
                        .target_ids_assigned_to_agent(agent_id)
                        .await?;
                    if !freed.is_empty() {
                        let specs = load_specs_for(ctx, &freed).await?;
                        let outcome = ctx
                            .assignment()
                            .apply(&specs, AssignedBy::Failover)
                            .await?;
                        assignment_engine::metrics::FAILOVERS_TOTAL.inc();
                        info!(
                            agent = %agent_id,
                            released = outcome.applied.deleted,
                            reassigned = outcome.applied.inserted,
                            "failover pass finished"
                        );
                        raise_orphan_alerts(ctx, &outcome).await;
                    }
                }
                AgentTransition::Recovered(agent_id) => {
                    let mut ids: HashSet<TargetId> = ctx
                        .registry()
                        .list_under_assigned_targets()
                        .await?
                        .into_iter()
                        .map(|t| t.id)
                        .collect();
                    ids.extend(over_concentrated_targets(ctx).await?);
                    if !ids.is_empty() {
                        let ids: Vec<TargetId> = ids.into_iter().collect();
                        let specs = load_specs_for(ctx, &ids).await?;
                        let outcome = ctx
                            .assignment()
                            .apply(&specs, AssignedBy::Rebalancer)
                            .await?;
                        info!(
                            agent = %agent_id,
                            targets = specs.len(),
                            inserted = outcome.applied.inserted,
                            "recovery rebalance finished"
                        );
                    }
                }
            }
        }
    }

    // change-feed delta: recompute only what the feed touched
    let changes = ctx.registry().changes_since(*last_version, 1_000).await?;
    if changes.is_empty() {
        return Ok(());
    }

    let scope = AffectedScope::from_changes(&changes);
    let mut ids: HashSet<TargetId> = scope.target_ids.clone();
    for subnet_id in &scope.subnet_ids {
        for target in ctx.registry().list_targets_in_subnet(*subnet_id).await? {
            ids.insert(target.id);
        }
    }
    for tier in &scope.tier_names {
        for target in ctx.registry().list_targets_of_tier(tier).await? {
            ids.insert(target.id);
        }
    }
    for agent_id in &scope.agent_ids {
        for target_id in ctx
            .registry()
            .target_ids_assigned_to_agent(*agent_id)
            .await?
        {
            ids.insert(target_id);
        }
        // changed capacity or executors may satisfy starved targets
        for target in ctx.registry().list_under_assigned_targets().await? {
            ids.insert(target.id);
        }
    }

    if !ids.is_empty() {
        let ids: Vec<TargetId> = ids.into_iter().collect();
        let specs = load_specs_for(ctx, &ids).await?;
        let outcome = ctx
            .assignment()
            .apply(&specs, AssignedBy::Rebalancer)
            .await?;
        raise_orphan_alerts(ctx, &outcome).await;
    }
    *last_version = scope.through_version.max(*last_version);
    Ok(())
}

/// Targets whose assigned agents collapse onto fewer (region, provider)
/// pairs than their assignment count; candidates for diversity repair when
/// an agent recovers.
async fn over_concentrated_targets(ctx: &AppContext) -> anyhow::Result<Vec<TargetId>> {
    use std::collections::HashMap;

    let agents: HashMap<_, _> = ctx
        .registry()
        .list_agents()
        .await?
        .into_iter()
        .map(|a| (a.id, (a.region, a.provider)))
        .collect();

    let mut per_target: HashMap<TargetId, Vec<(String, String)>> = HashMap::new();
    for assignment in ctx.registry().list_assignments().await? {
        if let Some(pair) = agents.get(&assignment.agent_id) {
            per_target
                .entry(assignment.target_id)
                .or_default()
                .push(pair.clone());
        }
    }

    let mut over = Vec::new();
    for (target_id, pairs) in per_target {
        let distinct: HashSet<&(String, String)> = pairs.iter().collect();
        if distinct.len() < pairs.len() {
            over.push(target_id);
        }
    }
    Ok(over)
}

/// Previously monitored targets the planner had to leave with nothing get
/// an agent_down-style alert.
async fn raise_orphan_alerts(ctx: &AppContext, outcome: &PlanOutcome) {
    for target_id in outcome.orphaned.iter().chain(&outcome.under_assigned) {
        let Ok(target) = ctx.registry().get_target(*target_id).await else {
            continue;
        };
        let was_monitored = matches!(
            target.monitoring_state,
            MonitoringState::Active | MonitoringState::Degraded | MonitoringState::Down
        );
        let Ok(assignments) = ctx.registry().assignments_for_target(*target_id).await else {
            continue;
        };
        if was_monitored && assignments.is_empty() {
            if let Err(err) = ctx.alerts().raise_agent_down_alert(&target).await {
                warn!(target = %target_id, error = %err, "agent_down alert failed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// target state sweep
// ---------------------------------------------------------------------------

pub fn state_service(settings: &WorkerSettings) -> ServiceRegistration {
    let every = Duration::from_secs(settings.state_interval_secs);
    ServiceRegistration::new(
        "state-sweep",
        Arc::new(move |ctx: AppContext, token: CancellationToken| {
            tokio::spawn(run_state(ctx, token, every))
        }),
    )
}

async fn run_state(
    ctx: AppContext,
    token: CancellationToken,
    every: Duration,
) -> anyhow::Result<()> {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("state sweep stopped");
                return Ok(());
            }
            _ = ticker.tick() => {
                guarded_tick!("state-sweep", state_tick(&ctx));
            }
        }
    }
}

async fn state_tick(ctx: &AppContext) -> anyhow::Result<()> {
    let summary = ctx.lifecycle().sweep().await?;

    // schedule smart rechecks for uncovered subnets, retire the ones whose
    // subnet regained coverage
    let mut ids: Vec<TargetId> = summary.recheck_eligible.clone();
    ids.extend(&summary.recheck_retired);
    if !ids.is_empty() {
        let specs = load_specs_for(ctx, &ids).await?;
        ctx.assignment()
            .apply(&specs, AssignedBy::Rebalancer)
            .await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// alert/incident cycle
// ---------------------------------------------------------------------------

pub fn alert_service(settings: &WorkerSettings) -> ServiceRegistration {
    let every = Duration::from_secs(settings.alert_interval_secs);
    let reload = Duration::from_secs(settings.config_reload_secs);
    ServiceRegistration::new(
        "alerts",
        Arc::new(move |ctx: AppContext, token: CancellationToken| {
            tokio::spawn(run_alerts(ctx, token, every, reload))
        }),
    )
}

async fn run_alerts(
    ctx: AppContext,
    token: CancellationToken,
    every: Duration,
    reload: Duration,
) -> anyhow::Result<()> {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut thresholds = ctx.registry().load_alert_thresholds().await?;
    let mut last_reload = Instant::now();

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("alert worker stopped");
                return Ok(());
            }
            _ = ticker.tick() => {
                // thresholds are hot-reloadable; pick up operator edits
                // without a restart
                if last_reload.elapsed() >= reload {
                    match ctx.registry().load_alert_thresholds().await {
                        Ok(fresh) => {
                            if fresh != thresholds {
                                info!("alert thresholds reloaded");
                            }
                            thresholds = fresh;
                        }
                        Err(err) => warn!(error = %err, "threshold reload failed"),
                    }
                    last_reload = Instant::now();
                }

                let alerts = ctx.alerts();
                let current = thresholds;
                guarded_tick!("alerts", async move {
                    alerts
                        .run_cycle(&current)
                        .await
                        .map(|_| ())
                        .map_err(anyhow::Error::from)
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// command expiry
// ---------------------------------------------------------------------------

pub fn command_expiry_service(settings: &WorkerSettings) -> ServiceRegistration {
    let every = Duration::from_secs(settings.command_expiry_interval_secs);
    ServiceRegistration::new(
        "command-expiry",
        Arc::new(move |ctx: AppContext, token: CancellationToken| {
            tokio::spawn(run_command_expiry(ctx, token, every))
        }),
    )
}

async fn run_command_expiry(
    ctx: AppContext,
    token: CancellationToken,
    every: Duration,
) -> anyhow::Result<()> {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("command expiry stopped");
                return Ok(());
            }
            _ = ticker.tick() => {
                let dispatcher = ctx.dispatcher();
                let registry = ctx.registry().clone();
                guarded_tick!("command-expiry", async move {
                    dispatcher.expire_overdue().await?;
                    // housekeeping: the change feed is a buffer, not history
                    let horizon = Utc::now() - chrono::Duration::days(7);
                    registry.prune_changes_before(horizon).await?;
                    Ok::<(), anyhow::Error>(())
                });
            }
        }
    }
}
