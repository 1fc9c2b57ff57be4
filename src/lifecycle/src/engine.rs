//! The lifecycle engine: applies per-probe and sweep decisions through the
//! registry.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{info, warn};

use registry_metadata::{
    IpType, MetadataRegistry, MonitoringState, SubnetId, Target, TargetId, TransitionTrigger,
};

use crate::metrics;
use crate::representative::pick_promotion;
use crate::transitions::{evaluate_sweep, on_probe_failure, on_probe_success, SweepAction};
use crate::types::{LifecycleResult, PlannedTransition, StateThresholds, SweepSummary};

pub struct LifecycleEngine {
    registry: MetadataRegistry,
    thresholds: StateThresholds,
}

impl LifecycleEngine {
    pub fn new(registry: MetadataRegistry, thresholds: StateThresholds) -> Self {
        Self {
            registry,
            thresholds,
        }
    }

    pub fn thresholds(&self) -> &StateThresholds {
        &self.thresholds
    }

    /// Per-probe transition, invoked by the ingest pipeline for every
    /// result. Returns the state entered, if the probe caused a transition.
    pub async fn handle_probe(
        &self,
        target_id: TargetId,
        success: bool,
        at: DateTime<Utc>,
    ) -> LifecycleResult<Option<MonitoringState>> {
        let target = self.registry.get_target(target_id).await?;
        if target.archived_at.is_some() {
            return Ok(None);
        }

        if success {
            self.registry.mark_response(target_id, at).await?;

            if let Some(mut to) = on_probe_success(target.monitoring_state) {
                if target.monitoring_state == MonitoringState::Inactive {
                    info!(
                        target = %target_id,
                        ip = %target.ip,
                        "inactive target responded unexpectedly"
                    );
                }

                // a recovering baselined customer target rejoins as standby
                // when its subnet already has a representative
                if to == MonitoringState::Active
                    && target.ip_type == IpType::Customer
                    && target.has_baseline()
                    && !target.is_representative
                {
                    if let Some(subnet_id) = target.subnet_id {
                        if let Some(rep) = self.registry.representative_of_subnet(subnet_id).await?
                        {
                            if rep.id != target.id {
                                to = MonitoringState::Standby;
                            }
                        }
                    }
                }
                if target.discovery_attempts > 0 {
                    self.registry.reset_discovery_attempts(target_id).await?;
                }
                self.registry
                    .transition_target_state(target_id, to, TransitionTrigger::Probe)
                    .await?;
                metrics::PROBE_TRANSITIONS_TOTAL.inc();
                return Ok(Some(to));
            }
            return Ok(None);
        }

        if target.monitoring_state == MonitoringState::Unknown {
            let attempts = self.registry.increment_discovery_attempts(target_id).await?;
            if let Some(to) = on_probe_failure(MonitoringState::Unknown, attempts, &self.thresholds)
            {
                self.registry
                    .transition_target_state(target_id, to, TransitionTrigger::Probe)
                    .await?;
                metrics::PROBE_TRANSITIONS_TOTAL.inc();
                return Ok(Some(to));
            }
        }
        Ok(None)
    }

    /// The periodic time-threshold sweep: baseline establishment (with
    /// representative election), down/excluded detection (with standby
    /// promotion), and smart-recheck eligibility.
    pub async fn sweep(&self) -> LifecycleResult<SweepSummary> {
        let now = Utc::now();
        let mut summary = SweepSummary::default();

        let targets = self.registry.list_targets().await?;
        let coverage: HashMap<SubnetId, i64> = self
            .registry
            .active_customer_counts()
            .await?
            .into_iter()
            .collect();

        for target in &targets {
            match evaluate_sweep(target, now, &self.thresholds) {
                Some(SweepAction::EstablishBaseline) => {
                    match self.establish_baseline(target, now).await {
                        Ok(elected) => {
                            summary.baselines_established += 1;
                            if elected {
                                summary.representatives_elected += 1;
                            }
                        }
                        Err(err) => {
                            warn!(target = %target.id, error = %err, "baseline establishment failed");
                            summary.errors += 1;
                        }
                    }
                }
                Some(SweepAction::Transition(to)) => {
                    match self
                        .registry
                        .transition_target_state(target.id, to, TransitionTrigger::Sweep)
                        .await
                    {
                        Ok(_) => {
                            metrics::SWEEP_TRANSITIONS_TOTAL.inc();
                            summary.transitions.push(PlannedTransition {
                                target_id: target.id,
                                to,
                                trigger: TransitionTrigger::Sweep,
                            });
                            if to == MonitoringState::Down && target.is_representative {
                                match self.promote_replacement(target).await {
                                    Ok(true) => summary.promotions += 1,
                                    Ok(false) => {}
                                    Err(err) => {
                                        warn!(target = %target.id, error = %err, "standby promotion failed");
                                        summary.errors += 1;
                                    }
                                }
                            }
                        }
                        Err(err) => {
                            warn!(target = %target.id, to = %to, error = %err, "sweep transition failed");
                            summary.errors += 1;
                        }
                    }
                }
                None => {}
            }
        }

        // smart-recheck eligibility from the pre-sweep snapshot; the next
        // sweep corrects any state that moved underneath us
        for target in &targets {
            if !matches!(
                target.monitoring_state,
                MonitoringState::Unresponsive | MonitoringState::Excluded
            ) {
                continue;
            }
            let covered = target
                .subnet_id
                .and_then(|s| coverage.get(&s))
                .copied()
                .unwrap_or(0)
                > 0;
            if covered {
                summary.recheck_retired.push(target.id);
            } else {
                summary.recheck_eligible.push(target.id);
            }
        }

        metrics::SWEEPS_TOTAL.inc();
        info!(
            baselines = summary.baselines_established,
            transitions = summary.transitions.len(),
            promotions = summary.promotions,
            recheck = summary.recheck_eligible.len(),
            errors = summary.errors,
            "lifecycle sweep finished"
        );
        Ok(summary)
    }

    /// Mark the baseline established and, for customer IPs, run
    /// representative election: the first baseline-establisher of a subnet
    /// becomes its representative, later ones go standby. Returns whether
    /// this target was elected.
    async fn establish_baseline(&self, target: &Target, now: DateTime<Utc>) -> LifecycleResult<bool> {
        self.registry.set_baseline_established(target.id, now).await?;
        metrics::BASELINES_ESTABLISHED_TOTAL.inc();

        if target.ip_type != IpType::Customer {
            return Ok(false);
        }
        let Some(subnet_id) = target.subnet_id else {
            return Ok(false);
        };

        match self.registry.representative_of_subnet(subnet_id).await? {
            None => {
                self.registry.set_representative(target.id, true).await?;
                info!(target = %target.id, subnet = %subnet_id, "representative elected");
                Ok(true)
            }
            Some(rep) if rep.id == target.id => Ok(false),
            Some(_) => {
                self.registry
                    .transition_target_state(
                        target.id,
                        MonitoringState::Standby,
                        TransitionTrigger::Sweep,
                    )
                    .await?;
                Ok(false)
            }
        }
    }

    /// Promote the oldest standby when a representative goes down. Logs and
    /// returns false when the subnet has no standby left.
    async fn promote_replacement(&self, downed: &Target) -> LifecycleResult<bool> {
        let Some(subnet_id) = downed.subnet_id else {
            return Ok(false);
        };
        let standbys = self.registry.standbys_of_subnet(subnet_id).await?;
        match pick_promotion(&standbys) {
            Some(next) => {
                self.registry.promote_standby(next.id, Some(downed.id)).await?;
                metrics::PROMOTIONS_TOTAL.inc();
                info!(
                    subnet = %subnet_id,
                    promoted = %next.id,
                    demoted = %downed.id,
                    "standby promoted to representative"
                );
                Ok(true)
            }
            None => {
                warn!(
                    subnet = %subnet_id,
                    representative = %downed.id,
                    "representative down with no standby available"
                );
                Ok(false)
            }
        }
    }
}
