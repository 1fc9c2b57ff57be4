//! Tier entity: probe cadence plus agent selection policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{FromRow, Row};

use crate::types::{SelectionPolicy, RESERVED_TIERS};

/// A named probe cadence and selection policy applied to targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tier {
    pub name: String,
    pub display_name: String,
    pub probe_interval_secs: i32,
    pub probe_timeout_ms: i32,
    pub probe_retries: i32,
    pub selection_policy: SelectionPolicy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tier {
    /// Reserved tiers back the discovery/recheck machinery and cannot be
    /// deleted or re-policied by operators.
    pub fn is_reserved(&self) -> bool {
        RESERVED_TIERS.contains(&self.name.as_str())
    }
}

impl FromRow<'_, PgRow> for Tier {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let Json(selection_policy): Json<SelectionPolicy> = row.try_get("selection_policy")?;
        Ok(Self {
            name: row.try_get("name")?,
            display_name: row.try_get("display_name")?,
            probe_interval_secs: row.try_get("probe_interval_secs")?,
            probe_timeout_ms: row.try_get("probe_timeout_ms")?,
            probe_retries: row.try_get("probe_retries")?,
            selection_policy,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Attributes for creating or updating a tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierSpec {
    pub name: String,
    pub display_name: String,
    pub probe_interval_secs: i32,
    pub probe_timeout_ms: i32,
    pub probe_retries: i32,
    pub selection_policy: SelectionPolicy,
}

/// The reserved tiers seeded at startup; all are `distributed{1}`.
pub fn reserved_tier_specs() -> Vec<TierSpec> {
    let single = |name: &str, display: &str, interval: i32| TierSpec {
        name: name.to_string(),
        display_name: display.to_string(),
        probe_interval_secs: interval,
        probe_timeout_ms: 2_000,
        probe_retries: 1,
        selection_policy: SelectionPolicy::Distributed { count: 1 },
    };

    vec![
        single("discovery", "Discovery", 60),
        single("smart_recheck", "Smart Recheck", 300),
        single("inactive_recheck", "Inactive Recheck", 3_600),
        single("standby_recheck", "Standby Recheck", 3_600),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_tiers_are_distributed_one() {
        let specs = reserved_tier_specs();
        assert_eq!(specs.len(), RESERVED_TIERS.len());
        for spec in specs {
            assert!(RESERVED_TIERS.contains(&spec.name.as_str()));
            assert_eq!(
                spec.selection_policy,
                SelectionPolicy::Distributed { count: 1 }
            );
        }
    }
}
