//! Agent persistence: registration, heartbeats, archival, metrics samples.

use chrono::Utc;
use sqlx::types::Json;
use tracing::debug;
use uuid::Uuid;

use crate::model::{Agent, AgentMetricsSample, AgentRegistration};
use crate::types::{AgentId, ChangeKind, EntityKind, RegistryError, RegistryResult};

use super::changes::{bump_version, record_change};
use super::MetadataRegistry;

impl MetadataRegistry {
    /// Register an agent, idempotent by name.
    ///
    /// A repeat registration under the same name updates the stored
    /// attributes (and clears any archive tombstone). Either path bumps the
    /// assignment version: capacity, region, and executors all influence
    /// assignment correctness.
    pub async fn register_agent(&self, reg: AgentRegistration) -> RegistryResult<Agent> {
        if reg.max_targets < 1 {
            return Err(RegistryError::Validation(
                "max_targets must be at least 1".into(),
            ));
        }
        if reg.name.trim().is_empty() {
            return Err(RegistryError::Validation("agent name must not be empty".into()));
        }

        let now = Utc::now();
        let mut tx = self.pool().begin().await?;

        let existing = sqlx::query_as::<_, Agent>("SELECT * FROM agents WHERE name = $1")
            .bind(&reg.name)
            .fetch_optional(&mut *tx)
            .await?;

        let (agent, change) = match existing {
            Some(previous) => {
                let updated = sqlx::query_as::<_, Agent>(
                    r#"
                    UPDATE agents SET
                        region = $2, location = $3, provider = $4, tags = $5,
                        public_ip = $6, version = $7, executors = $8,
                        max_targets = $9, api_key_hash = $10,
                        archived_at = NULL, updated_at = $11
                    WHERE name = $1
                    RETURNING *
                    "#,
                )
                .bind(&reg.name)
                .bind(&reg.region)
                .bind(&reg.location)
                .bind(&reg.provider)
                .bind(Json(&reg.tags))
                .bind(&reg.public_ip)
                .bind(&reg.version)
                .bind(Json(&reg.executors))
                .bind(reg.max_targets)
                .bind(&reg.api_key_hash)
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;
                debug!(agent = %previous.id, "agent re-registered");
                (updated, ChangeKind::Updated)
            }
            None => {
                let created = sqlx::query_as::<_, Agent>(
                    r#"
                    INSERT INTO agents (
                        id, name, region, location, provider, tags, public_ip,
                        version, executors, max_targets, api_key_hash,
                        assignment_version_seen, created_at, updated_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 0, $12, $12)
                    RETURNING *
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(&reg.name)
                .bind(&reg.region)
                .bind(&reg.location)
                .bind(&reg.provider)
                .bind(Json(&reg.tags))
                .bind(&reg.public_ip)
                .bind(&reg.version)
                .bind(Json(&reg.executors))
                .bind(reg.max_targets)
                .bind(&reg.api_key_hash)
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;
                (created, ChangeKind::Created)
            }
        };

        let version = bump_version(&mut tx).await?;
        record_change(
            &mut tx,
            version,
            EntityKind::Agent,
            &agent.id.to_string(),
            change,
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(agent)
    }

    pub async fn get_agent(&self, id: AgentId) -> RegistryResult<Agent> {
        sqlx::query_as::<_, Agent>("SELECT * FROM agents WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("agent {id}")))
    }

    pub async fn get_agent_by_name(&self, name: &str) -> RegistryResult<Option<Agent>> {
        let agent = sqlx::query_as::<_, Agent>("SELECT * FROM agents WHERE name = $1")
            .bind(name)
            .fetch_optional(self.pool())
            .await?;
        Ok(agent)
    }

    /// All non-archived agents.
    pub async fn list_agents(&self) -> RegistryResult<Vec<Agent>> {
        let agents = sqlx::query_as::<_, Agent>(
            "SELECT * FROM agents WHERE archived_at IS NULL ORDER BY name",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(agents)
    }

    /// Soft-archive an agent; its assignments are the assignment engine's
    /// problem to clean up on the next pass.
    pub async fn archive_agent(&self, id: AgentId) -> RegistryResult<()> {
        let now = Utc::now();
        let mut tx = self.pool().begin().await?;

        let done = sqlx::query(
            "UPDATE agents SET archived_at = $2, updated_at = $2 WHERE id = $1 AND archived_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if done.rows_affected() == 0 {
            return Err(RegistryError::NotFound(format!("agent {id}")));
        }

        let version = bump_version(&mut tx).await?;
        record_change(
            &mut tx,
            version,
            EntityKind::Agent,
            &id.to_string(),
            ChangeKind::Archived,
            now,
        )
        .await?;
        tx.commit().await?;
        debug!(agent = %id, "agent archived");
        Ok(())
    }

    /// Record a heartbeat: refresh `last_heartbeat` and the acknowledged
    /// assignment version. No version bump; heartbeats do not change the
    /// assignment plan.
    pub async fn record_heartbeat(
        &self,
        id: AgentId,
        assignment_version_seen: i64,
    ) -> RegistryResult<Agent> {
        let now = Utc::now();
        sqlx::query_as::<_, Agent>(
            r#"
            UPDATE agents
            SET last_heartbeat = $2, assignment_version_seen = $3, updated_at = $2
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(assignment_version_seen)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| RegistryError::NotFound(format!("agent {id}")))
    }

    pub async fn insert_agent_metrics(&self, sample: &AgentMetricsSample) -> RegistryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO agent_metrics_samples
                (agent_id, sampled_at, cpu_pct, memory_pct, active_targets, probes_per_second, error_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(sample.agent_id)
        .bind(sample.sampled_at)
        .bind(sample.cpu_pct)
        .bind(sample.memory_pct)
        .bind(sample.active_targets)
        .bind(sample.probes_per_second)
        .bind(sample.error_count)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn recent_agent_metrics(
        &self,
        agent_id: AgentId,
        limit: i64,
    ) -> RegistryResult<Vec<AgentMetricsSample>> {
        let samples = sqlx::query_as::<_, AgentMetricsSample>(
            r#"
            SELECT agent_id, sampled_at, cpu_pct, memory_pct, active_targets,
                   probes_per_second, error_count
            FROM agent_metrics_samples
            WHERE agent_id = $1
            ORDER BY sampled_at DESC
            LIMIT $2
            "#,
        )
        .bind(agent_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(samples)
    }
}
