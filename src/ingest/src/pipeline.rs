//! The ingest pipeline: batch admission, dedupe, state updates, baselines,
//! and per-probe lifecycle transitions.

use chrono::{Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use registry_metadata::{
    AgentId, AgentTargetState, MetadataRegistry, ProbeSample, Subnet, SubnetId, Target, TargetId,
};
use target_lifecycle::LifecycleEngine;

use crate::baseline::update_baseline;
use crate::metrics;
use crate::sink::ProbeTimeseries;
use crate::state::apply_probe;
use crate::types::{
    AnomalyThresholds, IngestError, IngestResult, IngestSummary, ProbeResultEntry, ResultBatch,
    MAX_BATCH_RESULTS,
};

pub struct IngestPipeline {
    registry: MetadataRegistry,
    lifecycle: Arc<LifecycleEngine>,
    sink: Arc<dyn ProbeTimeseries>,
    thresholds: AnomalyThresholds,
    /// Bounded worker pool; admission fails fast when it saturates
    permits: Arc<Semaphore>,
}

impl IngestPipeline {
    pub fn new(
        registry: MetadataRegistry,
        lifecycle: Arc<LifecycleEngine>,
        sink: Arc<dyn ProbeTimeseries>,
        thresholds: AnomalyThresholds,
        workers: usize,
    ) -> Self {
        Self {
            registry,
            lifecycle,
            sink,
            thresholds,
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Ingest one result batch from an agent.
    ///
    /// Idempotent by (agent, target, timestamp): replayed batches change
    /// neither the time-series store nor the final pair state. Returns
    /// `Saturated` when the worker pool has no free slot, which the API
    /// layer maps to a slow-down signal.
    pub async fn ingest(&self, batch: ResultBatch) -> IngestResult<IngestSummary> {
        let agent_id: AgentId = batch.agent_id;
        if batch.results.len() > MAX_BATCH_RESULTS {
            metrics::REJECTED_BATCHES_TOTAL.inc();
            return Err(IngestError::BatchTooLarge {
                count: batch.results.len(),
                bytes: 0,
            });
        }

        let _permit = self.permits.try_acquire().map_err(|_| {
            metrics::REJECTED_BATCHES_TOTAL.inc();
            IngestError::Saturated
        })?;
        metrics::BATCHES_TOTAL.inc();

        let agent = self.registry.get_agent(agent_id).await?;
        let mut summary = IngestSummary::default();

        // resolve targets once per batch
        let mut wanted: Vec<TargetId> = batch.results.iter().map(|r| r.target_id).collect();
        wanted.sort();
        wanted.dedup();
        let targets: HashMap<TargetId, Target> = self
            .registry
            .get_targets(&wanted)
            .await?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        let subnets = self.resolve_subnets(targets.values()).await?;

        // group per target in observed time order
        let mut by_target: BTreeMap<TargetId, Vec<ProbeResultEntry>> = BTreeMap::new();
        for entry in batch.results {
            if !targets.contains_key(&entry.target_id) {
                summary.unknown_targets += 1;
                continue;
            }
            by_target.entry(entry.target_id).or_default().push(entry);
        }

        let late_window = Duration::seconds(self.thresholds.late_window_secs);
        let mut samples: Vec<ProbeSample> = Vec::new();

        for (target_id, mut entries) in by_target {
            entries.sort_by_key(|e| e.timestamp);
            let target = &targets[&target_id];
            let target_region = target
                .subnet_id
                .and_then(|s| subnets.get(&s))
                .and_then(|s| s.region.clone())
                .unwrap_or_default();

            let mut state = match self.registry.get_pair_state(agent_id, target_id).await? {
                Some(state) => state,
                None => AgentTargetState::initial(agent_id, target_id, Utc::now()),
            };
            let mut baseline = self.registry.get_baseline(agent_id, target_id).await?;
            let mut touched = false;

            for entry in entries {
                // the late-arrival window bounds how far back we accept
                // out-of-order results at all
                if let Some(last) = state.last_probe_time {
                    if entry.timestamp < last - late_window {
                        summary.duplicates += 1;
                        continue;
                    }
                }

                samples.push(ProbeSample {
                    agent_id,
                    target_id,
                    ts: entry.timestamp,
                    success: entry.success,
                    latency_ms: entry.latency_ms,
                    packet_loss_pct: entry.packet_loss_pct,
                    rtt_samples: entry.rtt_samples.clone(),
                    agent_region: agent.region.clone(),
                    target_region: target_region.clone(),
                    is_in_market: !target_region.is_empty() && agent.region == target_region,
                });

                // anomaly state only moves strictly forward in time; a
                // replayed result at the same timestamp is a no-op here and
                // gets dropped by the sink's primary key
                if state
                    .last_probe_time
                    .map(|last| entry.timestamp <= last)
                    .unwrap_or(false)
                {
                    continue;
                }

                apply_probe(&mut state, baseline.as_ref(), &entry, &self.thresholds);
                touched = true;
                summary.accepted += 1;

                if entry.success {
                    if let Some(latency) = entry.latency_ms {
                        baseline = Some(update_baseline(
                            baseline.take(),
                            agent_id,
                            target_id,
                            latency,
                            entry.packet_loss_pct,
                            entry.timestamp,
                        ));
                    }
                }

                match self
                    .lifecycle
                    .handle_probe(target_id, entry.success, entry.timestamp)
                    .await
                {
                    Ok(Some(_)) => summary.transitions += 1,
                    Ok(None) => {}
                    Err(err) => {
                        // per-item failures never abort the batch
                        warn!(target = %target_id, error = %err, "per-probe transition failed");
                    }
                }
            }

            if touched {
                self.registry.upsert_pair_state(&state).await?;
                if let Some(b) = &baseline {
                    self.registry.upsert_baseline(b).await?;
                }
            }
        }

        let written = self.sink.append(&samples).await?;
        let replayed = samples.len() as u64 - written;
        summary.duplicates += replayed as usize;

        metrics::RESULTS_INGESTED_TOTAL.inc_by(summary.accepted as f64);
        if summary.unknown_targets > 0 {
            debug!(
                agent = %agent_id,
                unknown = summary.unknown_targets,
                "batch referenced unknown targets"
            );
        }
        Ok(summary)
    }

    async fn resolve_subnets<'a, I>(&self, targets: I) -> IngestResult<HashMap<SubnetId, Subnet>>
    where
        I: Iterator<Item = &'a Target>,
    {
        let mut ids: Vec<SubnetId> = targets.filter_map(|t| t.subnet_id).collect();
        ids.sort();
        ids.dedup();

        let mut subnets = HashMap::with_capacity(ids.len());
        for id in ids {
            match self.registry.get_subnet(id).await {
                Ok(subnet) => {
                    subnets.insert(id, subnet);
                }
                Err(err) => {
                    warn!(subnet = %id, error = %err, "subnet lookup failed during ingest");
                }
            }
        }
        Ok(subnets)
    }
}
