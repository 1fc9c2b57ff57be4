//! Raw probe rows. Insert-only from the control plane's point of view;
//! retention is the persistence engine's concern.

use crate::model::ProbeSample;
use crate::types::{AgentId, RegistryResult, TargetId};

use sqlx::types::Json;

use super::MetadataRegistry;

impl MetadataRegistry {
    /// Append probe samples. Duplicate (agent, target, ts) rows are silently
    /// dropped, which makes batch replay a no-op. Returns how many rows were
    /// actually written.
    pub async fn insert_probe_samples(&self, samples: &[ProbeSample]) -> RegistryResult<u64> {
        if samples.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool().begin().await?;
        let mut written = 0u64;
        for sample in samples {
            let done = sqlx::query(
                r#"
                INSERT INTO probe_results (
                    agent_id, target_id, ts, success, latency_ms, packet_loss_pct,
                    rtt_samples, agent_region, target_region, is_in_market
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (agent_id, target_id, ts) DO NOTHING
                "#,
            )
            .bind(sample.agent_id)
            .bind(sample.target_id)
            .bind(sample.ts)
            .bind(sample.success)
            .bind(sample.latency_ms)
            .bind(sample.packet_loss_pct)
            .bind(Json(&sample.rtt_samples))
            .bind(&sample.agent_region)
            .bind(&sample.target_region)
            .bind(sample.is_in_market)
            .execute(&mut *tx)
            .await?;
            written += done.rows_affected();
        }
        tx.commit().await?;
        Ok(written)
    }

    /// Most recent samples for one (agent, target), newest first; feeds the
    /// operator baseline-recalc trigger.
    pub async fn recent_probe_samples(
        &self,
        agent_id: AgentId,
        target_id: TargetId,
        limit: i64,
    ) -> RegistryResult<Vec<ProbeSample>> {
        let samples = sqlx::query_as::<_, ProbeSample>(
            r#"
            SELECT * FROM probe_results
            WHERE agent_id = $1 AND target_id = $2
            ORDER BY ts DESC
            LIMIT $3
            "#,
        )
        .bind(agent_id)
        .bind(target_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(samples)
    }
}
