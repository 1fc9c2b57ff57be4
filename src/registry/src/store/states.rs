//! Per-(agent,target) probe state and baselines.

use crate::model::{AgentTargetState, Baseline};
use crate::types::{AgentId, PairStatus, RegistryResult, TargetId};

use sqlx::types::Json;

use super::MetadataRegistry;

impl MetadataRegistry {
    pub async fn get_pair_state(
        &self,
        agent_id: AgentId,
        target_id: TargetId,
    ) -> RegistryResult<Option<AgentTargetState>> {
        let state = sqlx::query_as::<_, AgentTargetState>(
            "SELECT * FROM agent_target_state WHERE agent_id = $1 AND target_id = $2",
        )
        .bind(agent_id)
        .bind(target_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(state)
    }

    pub async fn upsert_pair_state(&self, state: &AgentTargetState) -> RegistryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO agent_target_state (
                agent_id, target_id, status, status_since, current_z_score,
                current_packet_loss, current_latency_ms, anomaly_start,
                consecutive_anomalies, consecutive_successes, last_probe_time
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (agent_id, target_id) DO UPDATE SET
                status = EXCLUDED.status,
                status_since = EXCLUDED.status_since,
                current_z_score = EXCLUDED.current_z_score,
                current_packet_loss = EXCLUDED.current_packet_loss,
                current_latency_ms = EXCLUDED.current_latency_ms,
                anomaly_start = EXCLUDED.anomaly_start,
                consecutive_anomalies = EXCLUDED.consecutive_anomalies,
                consecutive_successes = EXCLUDED.consecutive_successes,
                last_probe_time = EXCLUDED.last_probe_time
            "#,
        )
        .bind(state.agent_id)
        .bind(state.target_id)
        .bind(state.status.as_str())
        .bind(state.status_since)
        .bind(state.current_z_score)
        .bind(state.current_packet_loss)
        .bind(state.current_latency_ms)
        .bind(state.anomaly_start)
        .bind(state.consecutive_anomalies)
        .bind(state.consecutive_successes)
        .bind(state.last_probe_time)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// All pairs currently not healthy; the alert worker's phase-1 input.
    pub async fn list_unhealthy_states(&self) -> RegistryResult<Vec<AgentTargetState>> {
        let states = sqlx::query_as::<_, AgentTargetState>(
            "SELECT * FROM agent_target_state WHERE status <> $1",
        )
        .bind(PairStatus::Healthy.as_str())
        .fetch_all(self.pool())
        .await?;
        Ok(states)
    }

    pub async fn states_for_target(&self, target_id: TargetId) -> RegistryResult<Vec<AgentTargetState>> {
        let states = sqlx::query_as::<_, AgentTargetState>(
            "SELECT * FROM agent_target_state WHERE target_id = $1",
        )
        .bind(target_id)
        .fetch_all(self.pool())
        .await?;
        Ok(states)
    }

    pub async fn get_baseline(
        &self,
        agent_id: AgentId,
        target_id: TargetId,
    ) -> RegistryResult<Option<Baseline>> {
        let baseline = sqlx::query_as::<_, Baseline>(
            "SELECT * FROM baselines WHERE agent_id = $1 AND target_id = $2",
        )
        .bind(agent_id)
        .bind(target_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(baseline)
    }

    pub async fn upsert_baseline(&self, baseline: &Baseline) -> RegistryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO baselines (
                agent_id, target_id, latency_p50, latency_p95, latency_p99,
                stddev, packet_loss_baseline, sample_count, first_seen,
                last_updated, recent_samples
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (agent_id, target_id) DO UPDATE SET
                latency_p50 = EXCLUDED.latency_p50,
                latency_p95 = EXCLUDED.latency_p95,
                latency_p99 = EXCLUDED.latency_p99,
                stddev = EXCLUDED.stddev,
                packet_loss_baseline = EXCLUDED.packet_loss_baseline,
                sample_count = EXCLUDED.sample_count,
                last_updated = EXCLUDED.last_updated,
                recent_samples = EXCLUDED.recent_samples
            "#,
        )
        .bind(baseline.agent_id)
        .bind(baseline.target_id)
        .bind(baseline.latency_p50)
        .bind(baseline.latency_p95)
        .bind(baseline.latency_p99)
        .bind(baseline.stddev)
        .bind(baseline.packet_loss_baseline)
        .bind(baseline.sample_count)
        .bind(baseline.first_seen)
        .bind(baseline.last_updated)
        .bind(Json(&baseline.recent_samples))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn baselines_for_target(&self, target_id: TargetId) -> RegistryResult<Vec<Baseline>> {
        let baselines =
            sqlx::query_as::<_, Baseline>("SELECT * FROM baselines WHERE target_id = $1")
                .bind(target_id)
                .fetch_all(self.pool())
                .await?;
        Ok(baselines)
    }

    /// Drop baselines for a target so they rebuild from fresh probes; used
    /// by the operator recalc trigger.
    pub async fn delete_baselines_for_target(&self, target_id: TargetId) -> RegistryResult<u64> {
        let done = sqlx::query("DELETE FROM baselines WHERE target_id = $1")
            .bind(target_id)
            .execute(self.pool())
            .await?;
        Ok(done.rows_affected())
    }
}
