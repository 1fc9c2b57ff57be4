//! Assignment persistence: plan application, failover cleanup, history.
//!
//! Every mutating entry point bumps assignment_version exactly once per
//! logical pass, never per row.

use chrono::Utc;
use sqlx::{Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::model::{Assignment, AssignmentHistoryEntry, NewAssignment, PlanApplied};
use crate::types::{AgentId, AssignedBy, RegistryResult, TargetId};

use super::changes::bump_version;
use super::MetadataRegistry;

impl MetadataRegistry {
    /// Apply a planner pass: batched deletes then inserts, one history row
    /// per change, a single version bump. Empty plans commit nothing and
    /// keep the version untouched.
    pub async fn apply_assignment_plan(
        &self,
        inserts: &[NewAssignment],
        deletes: &[(TargetId, AgentId, AssignedBy)],
    ) -> RegistryResult<PlanApplied> {
        if inserts.is_empty() && deletes.is_empty() {
            return Ok(PlanApplied {
                inserted: 0,
                deleted: 0,
                version: self.current_assignment_version().await?,
            });
        }

        let now = Utc::now();
        let mut tx = self.pool().begin().await?;
        let mut deleted = 0u64;
        let mut inserted = 0u64;

        for (target_id, agent_id, by) in deletes {
            let done = sqlx::query("DELETE FROM assignments WHERE target_id = $1 AND agent_id = $2")
                .bind(target_id)
                .bind(agent_id)
                .execute(&mut *tx)
                .await?;
            if done.rows_affected() > 0 {
                deleted += 1;
                history_row(&mut tx, *target_id, *agent_id, "unassigned", *by).await?;
            }
        }

        for new in inserts {
            // an existing pair re-planned under a new effective tier takes
            // the new cadence; an identical row is a no-op
            let done = sqlx::query(
                r#"
                INSERT INTO assignments (id, target_id, agent_id, tier, assigned_at, assigned_by)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (target_id, agent_id) DO UPDATE
                    SET tier = EXCLUDED.tier,
                        assigned_at = EXCLUDED.assigned_at,
                        assigned_by = EXCLUDED.assigned_by
                    WHERE assignments.tier IS DISTINCT FROM EXCLUDED.tier
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(new.target_id)
            .bind(new.agent_id)
            .bind(&new.tier)
            .bind(now)
            .bind(new.assigned_by.as_str())
            .execute(&mut *tx)
            .await?;
            if done.rows_affected() > 0 {
                inserted += 1;
                history_row(&mut tx, new.target_id, new.agent_id, "assigned", new.assigned_by)
                    .await?;
            }
        }

        let version = if inserted > 0 || deleted > 0 {
            bump_version(&mut tx).await?
        } else {
            // everything the plan asked for was already true
            self.current_assignment_version().await?
        };
        tx.commit().await?;
        crate::metrics::ASSIGNMENT_PLANS_TOTAL.inc();

        debug!(inserted, deleted, version, "assignment plan applied");
        Ok(PlanApplied {
            inserted,
            deleted,
            version,
        })
    }

    pub async fn assignments_for_target(&self, target_id: TargetId) -> RegistryResult<Vec<Assignment>> {
        let assignments = sqlx::query_as::<_, Assignment>(
            "SELECT * FROM assignments WHERE target_id = $1 ORDER BY assigned_at",
        )
        .bind(target_id)
        .fetch_all(self.pool())
        .await?;
        Ok(assignments)
    }

    pub async fn assignments_for_agent(&self, agent_id: AgentId) -> RegistryResult<Vec<Assignment>> {
        let assignments = sqlx::query_as::<_, Assignment>(
            "SELECT * FROM assignments WHERE agent_id = $1 ORDER BY assigned_at",
        )
        .bind(agent_id)
        .fetch_all(self.pool())
        .await?;
        Ok(assignments)
    }

    pub async fn list_assignments(&self) -> RegistryResult<Vec<Assignment>> {
        let assignments = sqlx::query_as::<_, Assignment>("SELECT * FROM assignments")
            .fetch_all(self.pool())
            .await?;
        Ok(assignments)
    }

    /// Current per-agent load, for capacity checks.
    pub async fn assignment_counts_by_agent(&self) -> RegistryResult<Vec<(AgentId, i64)>> {
        let rows = sqlx::query("SELECT agent_id, count(*) AS n FROM assignments GROUP BY agent_id")
            .fetch_all(self.pool())
            .await?;
        let mut counts = Vec::with_capacity(rows.len());
        for row in rows {
            counts.push((row.try_get("agent_id")?, row.try_get("n")?));
        }
        Ok(counts)
    }

    pub async fn target_ids_assigned_to_agent(
        &self,
        agent_id: AgentId,
    ) -> RegistryResult<Vec<TargetId>> {
        let rows = sqlx::query("SELECT target_id FROM assignments WHERE agent_id = $1")
            .bind(agent_id)
            .fetch_all(self.pool())
            .await?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(row.try_get("target_id")?);
        }
        Ok(ids)
    }

    pub async fn assignment_history_for_target(
        &self,
        target_id: TargetId,
        limit: i64,
    ) -> RegistryResult<Vec<AssignmentHistoryEntry>> {
        let rows = sqlx::query_as::<_, AssignmentHistoryEntry>(
            r#"
            SELECT target_id, agent_id, action, assigned_by, occurred_at
            FROM assignment_history
            WHERE target_id = $1
            ORDER BY occurred_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(target_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}

async fn history_row(
    tx: &mut Transaction<'_, Postgres>,
    target_id: TargetId,
    agent_id: AgentId,
    action: &str,
    by: AssignedBy,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO assignment_history (target_id, agent_id, action, assigned_by, occurred_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(target_id)
    .bind(agent_id)
    .bind(action)
    .bind(by.as_str())
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;
    Ok(())
}
