//! Target persistence, state transitions, and lifecycle bookkeeping.
//!
//! Every state transition goes through [`MetadataRegistry::transition_target_state`]
//! so the target row and its history stay consistent, and the assignment
//! version reflects the cadence change.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

use crate::model::{Target, TargetSpec, TargetStateTransition, TargetUpdate};
use crate::types::{
    ChangeKind, EntityKind, IpType, MonitoringState, Ownership, RegistryError, RegistryResult,
    SubnetId, TargetId, TransitionTrigger,
};

use super::changes::{bump_version, record_change};
use super::MetadataRegistry;

impl MetadataRegistry {
    /// Create a target in `unknown` state.
    pub async fn create_target(&self, spec: TargetSpec) -> RegistryResult<Target> {
        if spec.ip.parse::<std::net::IpAddr>().is_err() {
            return Err(RegistryError::Validation(format!(
                "invalid target ip: {:?}",
                spec.ip
            )));
        }
        if spec.ownership == Ownership::Auto && spec.subnet_id.is_none() {
            return Err(RegistryError::Validation(
                "auto-owned targets must belong to a subnet".into(),
            ));
        }
        // fail fast with a clean error instead of a foreign-key violation
        self.get_tier(&spec.tier).await?;

        let now = Utc::now();
        let mut tx = self.pool().begin().await?;

        let target = sqlx::query_as::<_, Target>(
            r#"
            INSERT INTO targets (
                id, ip, subnet_id, tier, ip_type, ownership, origin, tags,
                display_name, expected_outcome, monitoring_state, state_changed_at,
                needs_review, discovery_attempts, is_representative, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                    FALSE, 0, FALSE, $12, $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&spec.ip)
        .bind(spec.subnet_id)
        .bind(&spec.tier)
        .bind(spec.ip_type.as_str())
        .bind(spec.ownership.as_str())
        .bind(spec.origin.as_str())
        .bind(Json(&spec.tags))
        .bind(&spec.display_name)
        .bind(spec.expected_outcome)
        .bind(MonitoringState::Unknown.as_str())
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO target_state_history (target_id, from_state, to_state, trigger, occurred_at)
            VALUES ($1, NULL, $2, $3, $4)
            "#,
        )
        .bind(target.id)
        .bind(MonitoringState::Unknown.as_str())
        .bind(TransitionTrigger::Manual.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let version = bump_version(&mut tx).await?;
        record_change(
            &mut tx,
            version,
            EntityKind::Target,
            &target.id.to_string(),
            ChangeKind::Created,
            now,
        )
        .await?;
        tx.commit().await?;
        debug!(target = %target.id, ip = %target.ip, "target created");
        Ok(target)
    }

    pub async fn get_target(&self, id: TargetId) -> RegistryResult<Target> {
        sqlx::query_as::<_, Target>("SELECT * FROM targets WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("target {id}")))
    }

    pub async fn get_targets(&self, ids: &[TargetId]) -> RegistryResult<Vec<Target>> {
        let targets = sqlx::query_as::<_, Target>(
            "SELECT * FROM targets WHERE id = ANY($1) AND archived_at IS NULL",
        )
        .bind(ids)
        .fetch_all(self.pool())
        .await?;
        Ok(targets)
    }

    /// All non-archived targets.
    pub async fn list_targets(&self) -> RegistryResult<Vec<Target>> {
        let targets =
            sqlx::query_as::<_, Target>("SELECT * FROM targets WHERE archived_at IS NULL ORDER BY ip")
                .fetch_all(self.pool())
                .await?;
        Ok(targets)
    }

    pub async fn list_targets_in_subnet(&self, subnet_id: SubnetId) -> RegistryResult<Vec<Target>> {
        let targets = sqlx::query_as::<_, Target>(
            "SELECT * FROM targets WHERE subnet_id = $1 AND archived_at IS NULL",
        )
        .bind(subnet_id)
        .fetch_all(self.pool())
        .await?;
        Ok(targets)
    }

    pub async fn list_targets_of_tier(&self, tier: &str) -> RegistryResult<Vec<Target>> {
        let targets = sqlx::query_as::<_, Target>(
            "SELECT * FROM targets WHERE tier = $1 AND archived_at IS NULL",
        )
        .bind(tier)
        .fetch_all(self.pool())
        .await?;
        Ok(targets)
    }

    pub async fn list_targets_in_state(
        &self,
        state: MonitoringState,
    ) -> RegistryResult<Vec<Target>> {
        let targets = sqlx::query_as::<_, Target>(
            "SELECT * FROM targets WHERE monitoring_state = $1 AND archived_at IS NULL",
        )
        .bind(state.as_str())
        .fetch_all(self.pool())
        .await?;
        Ok(targets)
    }

    /// Count of `active` customer targets per subnet; subnets with no row
    /// have zero and are candidates for smart recheck.
    pub async fn active_customer_counts(&self) -> RegistryResult<Vec<(SubnetId, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT subnet_id, count(*) AS n
            FROM targets
            WHERE subnet_id IS NOT NULL
              AND archived_at IS NULL
              AND ip_type = $1
              AND monitoring_state = $2
            GROUP BY subnet_id
            "#,
        )
        .bind(IpType::Customer.as_str())
        .bind(MonitoringState::Active.as_str())
        .fetch_all(self.pool())
        .await?;

        let mut counts = Vec::with_capacity(rows.len());
        for row in rows {
            counts.push((row.try_get("subnet_id")?, row.try_get("n")?));
        }
        Ok(counts)
    }

    /// The current representative of a subnet, if any.
    pub async fn representative_of_subnet(
        &self,
        subnet_id: SubnetId,
    ) -> RegistryResult<Option<Target>> {
        let target = sqlx::query_as::<_, Target>(
            r#"
            SELECT * FROM targets
            WHERE subnet_id = $1 AND is_representative AND archived_at IS NULL
            LIMIT 1
            "#,
        )
        .bind(subnet_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(target)
    }

    /// Standby customer targets of a subnet. Ordering is left to the caller
    /// so the promotion rule lives in one place.
    pub async fn standbys_of_subnet(&self, subnet_id: SubnetId) -> RegistryResult<Vec<Target>> {
        let targets = sqlx::query_as::<_, Target>(
            r#"
            SELECT * FROM targets
            WHERE subnet_id = $1 AND monitoring_state = $2 AND archived_at IS NULL
            "#,
        )
        .bind(subnet_id)
        .bind(MonitoringState::Standby.as_str())
        .fetch_all(self.pool())
        .await?;
        Ok(targets)
    }

    /// Apply a state transition, writing the target row and a history row in
    /// one transaction. Transitioning to `excluded` flags the target for
    /// review. Returns the refreshed target; a no-op transition (same state)
    /// returns the target untouched.
    pub async fn transition_target_state(
        &self,
        id: TargetId,
        to: MonitoringState,
        trigger: TransitionTrigger,
    ) -> RegistryResult<Target> {
        let now = Utc::now();
        let mut tx = self.pool().begin().await?;

        let current = sqlx::query_as::<_, Target>("SELECT * FROM targets WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("target {id}")))?;

        if current.monitoring_state == to {
            return Ok(current);
        }

        let needs_review = current.needs_review || to == MonitoringState::Excluded;
        let updated = sqlx::query_as::<_, Target>(
            r#"
            UPDATE targets
            SET monitoring_state = $2, state_changed_at = $3, needs_review = $4, updated_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(to.as_str())
        .bind(now)
        .bind(needs_review)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO target_state_history (target_id, from_state, to_state, trigger, occurred_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(current.monitoring_state.as_str())
        .bind(to.as_str())
        .bind(trigger.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        // the effective probing cadence changed, so the plan must follow
        let version = bump_version(&mut tx).await?;
        record_change(
            &mut tx,
            version,
            EntityKind::Target,
            &id.to_string(),
            ChangeKind::Updated,
            now,
        )
        .await?;
        tx.commit().await?;
        crate::metrics::STATE_TRANSITIONS_TOTAL.inc();

        debug!(
            target = %id,
            from = %current.monitoring_state,
            to = %to,
            trigger = %trigger,
            "target state transition"
        );
        Ok(updated)
    }

    pub async fn state_history(
        &self,
        id: TargetId,
        limit: i64,
    ) -> RegistryResult<Vec<TargetStateTransition>> {
        let rows = sqlx::query_as::<_, TargetStateTransition>(
            r#"
            SELECT target_id, from_state, to_state, trigger, occurred_at
            FROM target_state_history
            WHERE target_id = $1
            ORDER BY occurred_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Record a successful response timestamp: sets `first_response_at` once
    /// and `last_response_at` always.
    pub async fn mark_response(&self, id: TargetId, at: DateTime<Utc>) -> RegistryResult<()> {
        sqlx::query(
            r#"
            UPDATE targets
            SET first_response_at = COALESCE(first_response_at, $2),
                last_response_at = GREATEST(COALESCE(last_response_at, $2), $2),
                updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn increment_discovery_attempts(&self, id: TargetId) -> RegistryResult<i32> {
        let row = sqlx::query(
            r#"
            UPDATE targets
            SET discovery_attempts = discovery_attempts + 1, updated_at = $2
            WHERE id = $1
            RETURNING discovery_attempts
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| RegistryError::NotFound(format!("target {id}")))?;
        Ok(row.try_get("discovery_attempts")?)
    }

    pub async fn reset_discovery_attempts(&self, id: TargetId) -> RegistryResult<()> {
        sqlx::query("UPDATE targets SET discovery_attempts = 0, updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(Utc::now())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_baseline_established(
        &self,
        id: TargetId,
        at: DateTime<Utc>,
    ) -> RegistryResult<()> {
        sqlx::query(
            r#"
            UPDATE targets
            SET baseline_established_at = COALESCE(baseline_established_at, $2), updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Clear the baseline markers so the next sweep re-establishes them.
    pub async fn clear_baseline_established(&self, id: TargetId) -> RegistryResult<()> {
        sqlx::query(
            "UPDATE targets SET baseline_established_at = NULL, updated_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Bulk-set the under-assignment flag after a planner pass. Does not
    /// bump the version: the flag describes the plan, it does not drive it.
    pub async fn set_under_assigned(&self, ids: &[TargetId], flag: bool) -> RegistryResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query("UPDATE targets SET under_assigned = $2, updated_at = $3 WHERE id = ANY($1)")
            .bind(ids)
            .bind(flag)
            .bind(Utc::now())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Security-probe targets that are expected NOT to answer; a response
    /// from one of these is a violation.
    pub async fn list_security_probe_targets(&self) -> RegistryResult<Vec<Target>> {
        let targets = sqlx::query_as::<_, Target>(
            "SELECT * FROM targets WHERE expected_outcome = FALSE AND archived_at IS NULL",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(targets)
    }

    /// Targets the last planner pass could not bring up to policy.
    pub async fn list_under_assigned_targets(&self) -> RegistryResult<Vec<Target>> {
        let targets = sqlx::query_as::<_, Target>(
            "SELECT * FROM targets WHERE under_assigned AND archived_at IS NULL",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(targets)
    }

    pub async fn set_representative(&self, id: TargetId, flag: bool) -> RegistryResult<()> {
        sqlx::query("UPDATE targets SET is_representative = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(flag)
            .bind(Utc::now())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Promote a standby to representative in one transaction: the standby
    /// becomes the representative in `active` state; the demoted target (if
    /// any) loses its flag but keeps its current state.
    pub async fn promote_standby(
        &self,
        promoted: TargetId,
        demoted: Option<TargetId>,
    ) -> RegistryResult<()> {
        let now = Utc::now();
        let mut tx = self.pool().begin().await?;

        if let Some(old) = demoted {
            sqlx::query("UPDATE targets SET is_representative = FALSE, updated_at = $2 WHERE id = $1")
                .bind(old)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        let previous = sqlx::query_as::<_, Target>("SELECT * FROM targets WHERE id = $1 FOR UPDATE")
            .bind(promoted)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("target {promoted}")))?;

        sqlx::query(
            r#"
            UPDATE targets
            SET is_representative = TRUE, monitoring_state = $2, state_changed_at = $3, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(promoted)
        .bind(MonitoringState::Active.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO target_state_history (target_id, from_state, to_state, trigger, occurred_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(promoted)
        .bind(previous.monitoring_state.as_str())
        .bind(MonitoringState::Active.as_str())
        .bind(TransitionTrigger::Sweep.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let version = bump_version(&mut tx).await?;
        record_change(
            &mut tx,
            version,
            EntityKind::Target,
            &promoted.to_string(),
            ChangeKind::Updated,
            now,
        )
        .await?;
        tx.commit().await?;
        debug!(promoted = %promoted, demoted = ?demoted, "representative promoted");
        Ok(())
    }

    /// Apply operator edits. A tier change bumps the assignment version.
    pub async fn update_target(&self, id: TargetId, update: TargetUpdate) -> RegistryResult<Target> {
        let current = self.get_target(id).await?;
        if let Some(tier) = &update.tier {
            self.get_tier(tier).await?;
        }

        let tier_changed = update
            .tier
            .as_ref()
            .map(|t| *t != current.tier)
            .unwrap_or(false);

        let now = Utc::now();
        let mut tx = self.pool().begin().await?;

        let target = sqlx::query_as::<_, Target>(
            r#"
            UPDATE targets
            SET tier = $2, display_name = $3, tags = $4, expected_outcome = $5,
                needs_review = $6, updated_at = $7
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(update.tier.as_ref().unwrap_or(&current.tier))
        .bind(update.display_name.as_ref().or(current.display_name.as_ref()))
        .bind(Json(update.tags.as_ref().unwrap_or(&current.tags)))
        .bind(update.expected_outcome.or(current.expected_outcome))
        .bind(update.needs_review.unwrap_or(current.needs_review))
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        if tier_changed {
            let version = bump_version(&mut tx).await?;
            record_change(
                &mut tx,
                version,
                EntityKind::Target,
                &id.to_string(),
                ChangeKind::Updated,
                now,
            )
            .await?;
        }
        tx.commit().await?;
        Ok(target)
    }

    /// Soft-archive a target, cascading to its assignments, baselines, and
    /// pair state in the same transaction.
    pub async fn archive_target(&self, id: TargetId) -> RegistryResult<()> {
        let now = Utc::now();
        let mut tx = self.pool().begin().await?;

        let done = sqlx::query(
            "UPDATE targets SET archived_at = $2, updated_at = $2 WHERE id = $1 AND archived_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if done.rows_affected() == 0 {
            return Err(RegistryError::NotFound(format!("target {id}")));
        }

        sqlx::query("DELETE FROM assignments WHERE target_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM baselines WHERE target_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM agent_target_state WHERE target_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let version = bump_version(&mut tx).await?;
        record_change(
            &mut tx,
            version,
            EntityKind::Target,
            &id.to_string(),
            ChangeKind::Archived,
            now,
        )
        .await?;
        tx.commit().await?;
        debug!(target = %id, "target archived with cascade");
        Ok(())
    }
}
