//! Tier persistence and reserved-tier seeding.

use chrono::Utc;
use sqlx::types::Json;
use sqlx::Row;
use tracing::{debug, info};

use crate::model::{reserved_tier_specs, Tier, TierSpec};
use crate::types::{
    ChangeKind, EntityKind, RegistryError, RegistryResult, SelectionPolicy, RESERVED_TIERS,
};

use super::changes::{bump_version, record_change};
use super::MetadataRegistry;

impl MetadataRegistry {
    /// Create or update a tier. Policy changes bump the assignment version:
    /// they alter the plan for every target of the tier.
    pub async fn upsert_tier(&self, spec: TierSpec) -> RegistryResult<Tier> {
        validate_tier_spec(&spec)?;

        let now = Utc::now();
        let mut tx = self.pool().begin().await?;

        let existing = sqlx::query("SELECT name FROM tiers WHERE name = $1")
            .bind(&spec.name)
            .fetch_optional(&mut *tx)
            .await?;
        let change = if existing.is_some() {
            ChangeKind::Updated
        } else {
            ChangeKind::Created
        };

        let tier = sqlx::query_as::<_, Tier>(
            r#"
            INSERT INTO tiers (name, display_name, probe_interval_secs, probe_timeout_ms,
                               probe_retries, selection_policy, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            ON CONFLICT (name) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                probe_interval_secs = EXCLUDED.probe_interval_secs,
                probe_timeout_ms = EXCLUDED.probe_timeout_ms,
                probe_retries = EXCLUDED.probe_retries,
                selection_policy = EXCLUDED.selection_policy,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(&spec.name)
        .bind(&spec.display_name)
        .bind(spec.probe_interval_secs)
        .bind(spec.probe_timeout_ms)
        .bind(spec.probe_retries)
        .bind(Json(&spec.selection_policy))
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let version = bump_version(&mut tx).await?;
        record_change(&mut tx, version, EntityKind::Tier, &tier.name, change, now).await?;
        tx.commit().await?;
        debug!(tier = %tier.name, "tier upserted");
        Ok(tier)
    }

    pub async fn get_tier(&self, name: &str) -> RegistryResult<Tier> {
        sqlx::query_as::<_, Tier>("SELECT * FROM tiers WHERE name = $1")
            .bind(name)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("tier {name}")))
    }

    pub async fn list_tiers(&self) -> RegistryResult<Vec<Tier>> {
        let tiers = sqlx::query_as::<_, Tier>("SELECT * FROM tiers ORDER BY name")
            .fetch_all(self.pool())
            .await?;
        Ok(tiers)
    }

    /// Delete a tier. Conflicts if any non-archived target still uses it, or
    /// if the tier is reserved.
    pub async fn delete_tier(&self, name: &str) -> RegistryResult<()> {
        if RESERVED_TIERS.contains(&name) {
            return Err(RegistryError::Conflict(format!("tier {name} is reserved")));
        }

        let now = Utc::now();
        let mut tx = self.pool().begin().await?;

        let in_use = sqlx::query(
            "SELECT count(*) AS n FROM targets WHERE tier = $1 AND archived_at IS NULL",
        )
        .bind(name)
        .fetch_one(&mut *tx)
        .await?;
        let n: i64 = in_use.try_get("n")?;
        if n > 0 {
            return Err(RegistryError::Conflict(format!(
                "tier {name} still has {n} active targets"
            )));
        }

        let done = sqlx::query("DELETE FROM tiers WHERE name = $1")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        if done.rows_affected() == 0 {
            return Err(RegistryError::NotFound(format!("tier {name}")));
        }

        let version = bump_version(&mut tx).await?;
        record_change(&mut tx, version, EntityKind::Tier, name, ChangeKind::Deleted, now).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Seed the reserved discovery/recheck tiers if missing. Does not bump
    /// the assignment version when nothing was inserted.
    pub async fn seed_reserved_tiers(&self) -> RegistryResult<()> {
        let now = Utc::now();
        let mut seeded = 0u32;
        for spec in reserved_tier_specs() {
            let mut tx = self.pool().begin().await?;
            let done = sqlx::query(
                r#"
                INSERT INTO tiers (name, display_name, probe_interval_secs, probe_timeout_ms,
                                   probe_retries, selection_policy, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
                ON CONFLICT (name) DO NOTHING
                "#,
            )
            .bind(&spec.name)
            .bind(&spec.display_name)
            .bind(spec.probe_interval_secs)
            .bind(spec.probe_timeout_ms)
            .bind(spec.probe_retries)
            .bind(Json(&spec.selection_policy))
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if done.rows_affected() > 0 {
                let version = bump_version(&mut tx).await?;
                record_change(
                    &mut tx,
                    version,
                    EntityKind::Tier,
                    &spec.name,
                    ChangeKind::Created,
                    now,
                )
                .await?;
                seeded += 1;
            }
            tx.commit().await?;
        }
        if seeded > 0 {
            info!(seeded, "reserved tiers seeded");
        }
        Ok(())
    }
}

fn validate_tier_spec(spec: &TierSpec) -> RegistryResult<()> {
    if spec.name.trim().is_empty() {
        return Err(RegistryError::Validation("tier name must not be empty".into()));
    }
    if spec.probe_interval_secs < 1 {
        return Err(RegistryError::Validation(
            "probe_interval_secs must be at least 1".into(),
        ));
    }
    if RESERVED_TIERS.contains(&spec.name.as_str())
        && spec.selection_policy != (SelectionPolicy::Distributed { count: 1 })
    {
        return Err(RegistryError::Conflict(format!(
            "reserved tier {} must keep policy distributed{{1}}",
            spec.name
        )));
    }
    if let Some(0) = spec.selection_policy.required_count() {
        return Err(RegistryError::Validation(
            "selection policy count must be at least 1".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, policy: SelectionPolicy) -> TierSpec {
        TierSpec {
            name: name.into(),
            display_name: name.into(),
            probe_interval_secs: 30,
            probe_timeout_ms: 2_000,
            probe_retries: 2,
            selection_policy: policy,
        }
    }

    #[test]
    fn reserved_tier_policy_is_pinned() {
        let bad = spec("discovery", SelectionPolicy::Distributed { count: 3 });
        assert!(matches!(
            validate_tier_spec(&bad),
            Err(RegistryError::Conflict(_))
        ));

        let good = spec("discovery", SelectionPolicy::Distributed { count: 1 });
        assert!(validate_tier_spec(&good).is_ok());
    }

    #[test]
    fn zero_count_policies_are_rejected() {
        let bad = spec("vip", SelectionPolicy::Distributed { count: 0 });
        assert!(matches!(
            validate_tier_spec(&bad),
            Err(RegistryError::Validation(_))
        ));
    }
}
