//! Assignment version counter and entity change feed.

use chrono::{DateTime, Utc};
use sqlx::{Postgres, Row, Transaction};

use crate::model::EntityChange;
use crate::types::{ChangeKind, EntityKind, RegistryResult};

use super::MetadataRegistry;

impl MetadataRegistry {
    /// The current assignment_version; monotonic, bumped on every
    /// assignment-relevant committed mutation.
    pub async fn current_assignment_version(&self) -> RegistryResult<i64> {
        let row = sqlx::query("SELECT version FROM assignment_meta WHERE id = 1")
            .fetch_one(self.pool())
            .await?;
        Ok(row.try_get("version")?)
    }

    /// Change feed rows strictly after `version`, oldest first.
    pub async fn changes_since(&self, version: i64, limit: i64) -> RegistryResult<Vec<EntityChange>> {
        let rows = sqlx::query_as::<_, EntityChange>(
            r#"
            SELECT version, entity_kind, entity_id, change_kind, occurred_at
            FROM entity_changes
            WHERE version > $1
            ORDER BY version ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(version)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Trim change rows older than the horizon; the feed is a buffer, not an
    /// archive.
    pub async fn prune_changes_before(&self, horizon: DateTime<Utc>) -> RegistryResult<u64> {
        let done = sqlx::query("DELETE FROM entity_changes WHERE occurred_at < $1")
            .bind(horizon)
            .execute(self.pool())
            .await?;
        Ok(done.rows_affected())
    }
}

/// Increment assignment_version inside the caller's transaction and return
/// the new value.
pub(crate) async fn bump_version(tx: &mut Transaction<'_, Postgres>) -> Result<i64, sqlx::Error> {
    let row =
        sqlx::query("UPDATE assignment_meta SET version = version + 1 WHERE id = 1 RETURNING version")
            .fetch_one(&mut **tx)
            .await?;
    let version: i64 = row.try_get("version")?;
    crate::metrics::ASSIGNMENT_VERSION.set(version);
    Ok(version)
}

/// Append one change feed row at `version` inside the caller's transaction.
pub(crate) async fn record_change(
    tx: &mut Transaction<'_, Postgres>,
    version: i64,
    entity_kind: EntityKind,
    entity_id: &str,
    change: ChangeKind,
    occurred_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO entity_changes (version, entity_kind, entity_id, change_kind, occurred_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(version)
    .bind(entity_kind.as_str())
    .bind(entity_id)
    .bind(change.as_str())
    .bind(occurred_at)
    .execute(&mut **tx)
    .await?;
    crate::metrics::ENTITY_CHANGES_TOTAL.inc();
    Ok(())
}
