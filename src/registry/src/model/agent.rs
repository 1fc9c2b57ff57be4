//! Agent entity and derived status classification.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{FromRow, Row};
use std::collections::HashMap;

use crate::types::{AgentId, AgentStatus, HEARTBEAT_DEGRADED_SECS, HEARTBEAT_OFFLINE_SECS};

/// A remote probe runner enrolled with the control plane.
///
/// Status is never stored: it is a pure function of `archived_at` and the
/// age of `last_heartbeat`, see [`Agent::status_at`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    /// Unique agent name; re-registration under the same name updates in place
    pub name: String,
    pub region: String,
    pub location: String,
    pub provider: String,
    pub tags: HashMap<String, String>,
    pub public_ip: Option<String>,
    pub version: Option<String>,
    /// Probe executor types this agent can run (e.g. "icmp", "mtr")
    pub executors: Vec<String>,
    /// Capacity ceiling for concurrent target assignments
    pub max_targets: i32,
    /// Argon2 hash of the agent's API credential; never the credential itself
    #[serde(skip_serializing)]
    pub api_key_hash: String,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
    /// Last assignment_version the agent acknowledged via heartbeat
    pub assignment_version_seen: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// Derive the agent status at `now`.
    ///
    /// Archived or heartbeat absent / at least 60s old is `offline`;
    /// heartbeat in [30s, 60s) is `degraded`; anything fresher is `active`.
    pub fn status_at(&self, now: DateTime<Utc>) -> AgentStatus {
        self.status_at_with(now, HEARTBEAT_DEGRADED_SECS, HEARTBEAT_OFFLINE_SECS)
    }

    /// Status derivation with explicit thresholds, for deployments that
    /// tune the heartbeat windows.
    pub fn status_at_with(
        &self,
        now: DateTime<Utc>,
        degraded_secs: i64,
        offline_secs: i64,
    ) -> AgentStatus {
        if self.archived_at.is_some() {
            return AgentStatus::Offline;
        }
        let Some(last) = self.last_heartbeat else {
            return AgentStatus::Offline;
        };
        let age = now - last;
        if age >= Duration::seconds(offline_secs) {
            AgentStatus::Offline
        } else if age >= Duration::seconds(degraded_secs) {
            AgentStatus::Degraded
        } else {
            AgentStatus::Active
        }
    }

    /// Whether this agent can run the given probe executor.
    pub fn supports_executor(&self, executor: &str) -> bool {
        self.executors.iter().any(|e| e == executor)
    }
}

impl FromRow<'_, PgRow> for Agent {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let Json(tags): Json<HashMap<String, String>> = row.try_get("tags")?;
        let Json(executors): Json<Vec<String>> = row.try_get("executors")?;
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            region: row.try_get("region")?,
            location: row.try_get("location")?,
            provider: row.try_get("provider")?,
            tags,
            public_ip: row.try_get("public_ip")?,
            version: row.try_get("version")?,
            executors,
            max_targets: row.try_get("max_targets")?,
            api_key_hash: row.try_get("api_key_hash")?,
            last_heartbeat: row.try_get("last_heartbeat")?,
            archived_at: row.try_get("archived_at")?,
            assignment_version_seen: row.try_get("assignment_version_seen")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Attributes accepted at registration time.
///
/// Registration is idempotent by `name`: a repeat registration updates the
/// stored attributes and keeps the agent id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRegistration {
    pub name: String,
    pub region: String,
    pub location: String,
    pub provider: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    pub public_ip: Option<String>,
    pub version: Option<String>,
    pub executors: Vec<String>,
    pub max_targets: i32,
    /// Argon2 hash computed by the API layer before the registry is touched
    pub api_key_hash: String,
}

/// One heartbeat-borne resource sample, persisted for operator dashboards.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AgentMetricsSample {
    pub agent_id: AgentId,
    pub sampled_at: DateTime<Utc>,
    pub cpu_pct: f64,
    pub memory_pct: f64,
    pub active_targets: i32,
    pub probes_per_second: f64,
    pub error_count: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn agent(last_heartbeat: Option<DateTime<Utc>>, archived: bool) -> Agent {
        Agent {
            id: Uuid::new_v4(),
            name: "probe-1".into(),
            region: "us-east".into(),
            location: "nyc1".into(),
            provider: "colo".into(),
            tags: HashMap::new(),
            public_ip: None,
            version: Some("1.4.0".into()),
            executors: vec!["icmp".into(), "mtr".into()],
            max_targets: 500,
            api_key_hash: "$argon2id$stub".into(),
            last_heartbeat,
            archived_at: archived.then(Utc::now),
            assignment_version_seen: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn status_boundaries() {
        let now = Utc::now();
        let fresh = agent(Some(now - Duration::seconds(5)), false);
        assert_eq!(fresh.status_at(now), AgentStatus::Active);

        // 59.9s old is degraded, exactly 60s is offline
        let degraded = agent(Some(now - Duration::milliseconds(59_900)), false);
        assert_eq!(degraded.status_at(now), AgentStatus::Degraded);
        let offline = agent(Some(now - Duration::seconds(60)), false);
        assert_eq!(offline.status_at(now), AgentStatus::Offline);

        // exactly 30s crosses into degraded
        let at_thirty = agent(Some(now - Duration::seconds(30)), false);
        assert_eq!(at_thirty.status_at(now), AgentStatus::Degraded);
        let just_under = agent(Some(now - Duration::milliseconds(29_999)), false);
        assert_eq!(just_under.status_at(now), AgentStatus::Active);
    }

    #[test]
    fn archived_and_silent_agents_are_offline() {
        let now = Utc::now();
        assert_eq!(agent(None, false).status_at(now), AgentStatus::Offline);
        let archived = agent(Some(now), true);
        assert_eq!(archived.status_at(now), AgentStatus::Offline);
    }

    #[test]
    fn executor_lookup() {
        let a = agent(None, false);
        assert!(a.supports_executor("icmp"));
        assert!(!a.supports_executor("dns"));
    }
}
