//! Target entity and its state-history record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{FromRow, Row};
use std::collections::HashMap;

use super::{decode_enum, decode_enum_opt};
use crate::types::{
    IpType, MonitoringState, Origin, Ownership, SubnetId, TargetId, TransitionTrigger,
};

/// A single IP under monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub ip: String,
    pub subnet_id: Option<SubnetId>,
    /// Assigned tier name; the cadence actually run may differ, see the
    /// lifecycle engine's effective-tier mapping
    pub tier: String,
    pub ip_type: IpType,
    pub ownership: Ownership,
    pub origin: Origin,
    pub tags: HashMap<String, String>,
    pub display_name: Option<String>,
    /// For security-probe targets: the outcome probes are expected to have
    pub expected_outcome: Option<bool>,
    pub monitoring_state: MonitoringState,
    pub state_changed_at: DateTime<Utc>,
    pub needs_review: bool,
    pub first_response_at: Option<DateTime<Utc>>,
    pub baseline_established_at: Option<DateTime<Utc>>,
    pub last_response_at: Option<DateTime<Utc>>,
    pub discovery_attempts: i32,
    pub is_representative: bool,
    /// Set when the assignment engine could not satisfy the tier policy
    pub under_assigned: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Target {
    /// States in which the target is probed at some cadence.
    ///
    /// `unresponsive` and `excluded` targets are only probed while their
    /// subnet lacks other coverage; that gate belongs to the lifecycle
    /// engine, so they count as monitorable here.
    pub fn is_monitorable(&self) -> bool {
        self.archived_at.is_none()
            && !matches!(
                self.monitoring_state,
                MonitoringState::Excluded | MonitoringState::Unresponsive
            )
    }

    /// Whether a baseline has been established for this target.
    pub fn has_baseline(&self) -> bool {
        self.baseline_established_at.is_some()
    }
}

impl FromRow<'_, PgRow> for Target {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let Json(tags): Json<HashMap<String, String>> = row.try_get("tags")?;
        Ok(Self {
            id: row.try_get("id")?,
            ip: row.try_get("ip")?,
            subnet_id: row.try_get("subnet_id")?,
            tier: row.try_get("tier")?,
            ip_type: decode_enum(row, "ip_type")?,
            ownership: decode_enum(row, "ownership")?,
            origin: decode_enum(row, "origin")?,
            tags,
            display_name: row.try_get("display_name")?,
            expected_outcome: row.try_get("expected_outcome")?,
            monitoring_state: decode_enum(row, "monitoring_state")?,
            state_changed_at: row.try_get("state_changed_at")?,
            needs_review: row.try_get("needs_review")?,
            first_response_at: row.try_get("first_response_at")?,
            baseline_established_at: row.try_get("baseline_established_at")?,
            last_response_at: row.try_get("last_response_at")?,
            discovery_attempts: row.try_get("discovery_attempts")?,
            is_representative: row.try_get("is_representative")?,
            under_assigned: row.try_get("under_assigned")?,
            archived_at: row.try_get("archived_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Attributes for creating a target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSpec {
    pub ip: String,
    pub subnet_id: Option<SubnetId>,
    pub tier: String,
    pub ip_type: IpType,
    pub ownership: Ownership,
    pub origin: Origin,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    pub display_name: Option<String>,
    pub expected_outcome: Option<bool>,
}

/// Operator-editable target fields; `Some` means set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetUpdate {
    pub tier: Option<String>,
    pub display_name: Option<String>,
    pub tags: Option<HashMap<String, String>>,
    pub expected_outcome: Option<bool>,
    pub needs_review: Option<bool>,
}

/// One row of the append-only target state history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetStateTransition {
    pub target_id: TargetId,
    pub from_state: Option<MonitoringState>,
    pub to_state: MonitoringState,
    pub trigger: TransitionTrigger,
    pub occurred_at: DateTime<Utc>,
}

impl FromRow<'_, PgRow> for TargetStateTransition {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            target_id: row.try_get("target_id")?,
            from_state: decode_enum_opt(row, "from_state")?,
            to_state: decode_enum(row, "to_state")?,
            trigger: decode_enum(row, "trigger")?,
            occurred_at: row.try_get("occurred_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn target(state: MonitoringState) -> Target {
        Target {
            id: Uuid::new_v4(),
            ip: "10.0.0.7".into(),
            subnet_id: Some(Uuid::new_v4()),
            tier: "standard".into(),
            ip_type: IpType::Customer,
            ownership: Ownership::Auto,
            origin: Origin::Sync,
            tags: HashMap::new(),
            display_name: None,
            expected_outcome: None,
            monitoring_state: state,
            state_changed_at: Utc::now(),
            needs_review: false,
            first_response_at: None,
            baseline_established_at: None,
            last_response_at: None,
            discovery_attempts: 0,
            is_representative: false,
            under_assigned: false,
            archived_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn monitorable_states() {
        assert!(target(MonitoringState::Unknown).is_monitorable());
        assert!(target(MonitoringState::Active).is_monitorable());
        assert!(target(MonitoringState::Down).is_monitorable());
        assert!(target(MonitoringState::Standby).is_monitorable());
        assert!(!target(MonitoringState::Excluded).is_monitorable());
        assert!(!target(MonitoringState::Unresponsive).is_monitorable());

        let mut archived = target(MonitoringState::Active);
        archived.archived_at = Some(Utc::now());
        assert!(!archived.is_monitorable());
    }
}
