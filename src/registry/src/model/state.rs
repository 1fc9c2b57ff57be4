//! Per-(agent,target) probe state, baselines, and raw probe rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{FromRow, Row};

use super::decode_enum;
use crate::types::{AgentId, PairStatus, TargetId};

/// Short-lived probe state for one (agent, target) pair.
///
/// This is the working memory of the ingest pipeline: anomaly counters and
/// the most recent metrics, keyed by the highest probe timestamp seen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTargetState {
    pub agent_id: AgentId,
    pub target_id: TargetId,
    pub status: PairStatus,
    pub status_since: DateTime<Utc>,
    pub current_z_score: Option<f64>,
    pub current_packet_loss: Option<f64>,
    pub current_latency_ms: Option<f64>,
    pub anomaly_start: Option<DateTime<Utc>>,
    pub consecutive_anomalies: i32,
    pub consecutive_successes: i32,
    pub last_probe_time: Option<DateTime<Utc>>,
}

impl AgentTargetState {
    /// Fresh state for a pair never probed before.
    pub fn initial(agent_id: AgentId, target_id: TargetId, now: DateTime<Utc>) -> Self {
        Self {
            agent_id,
            target_id,
            status: PairStatus::Unknown,
            status_since: now,
            current_z_score: None,
            current_packet_loss: None,
            current_latency_ms: None,
            anomaly_start: None,
            consecutive_anomalies: 0,
            consecutive_successes: 0,
            last_probe_time: None,
        }
    }
}

impl FromRow<'_, PgRow> for AgentTargetState {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            agent_id: row.try_get("agent_id")?,
            target_id: row.try_get("target_id")?,
            status: decode_enum(row, "status")?,
            status_since: row.try_get("status_since")?,
            current_z_score: row.try_get("current_z_score")?,
            current_packet_loss: row.try_get("current_packet_loss")?,
            current_latency_ms: row.try_get("current_latency_ms")?,
            anomaly_start: row.try_get("anomaly_start")?,
            consecutive_anomalies: row.try_get("consecutive_anomalies")?,
            consecutive_successes: row.try_get("consecutive_successes")?,
            last_probe_time: row.try_get("last_probe_time")?,
        })
    }
}

/// Statistical reference for anomaly scoring, per (agent, target).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baseline {
    pub agent_id: AgentId,
    pub target_id: TargetId,
    pub latency_p50: f64,
    pub latency_p95: f64,
    pub latency_p99: f64,
    pub stddev: f64,
    pub packet_loss_baseline: f64,
    pub sample_count: i64,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Rolling window of recent successful latencies backing the percentiles
    pub recent_samples: Vec<f64>,
}

impl FromRow<'_, PgRow> for Baseline {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let Json(recent_samples): Json<Vec<f64>> = row.try_get("recent_samples")?;
        Ok(Self {
            agent_id: row.try_get("agent_id")?,
            target_id: row.try_get("target_id")?,
            latency_p50: row.try_get("latency_p50")?,
            latency_p95: row.try_get("latency_p95")?,
            latency_p99: row.try_get("latency_p99")?,
            stddev: row.try_get("stddev")?,
            packet_loss_baseline: row.try_get("packet_loss_baseline")?,
            sample_count: row.try_get("sample_count")?,
            first_seen: row.try_get("first_seen")?,
            last_updated: row.try_get("last_updated")?,
            recent_samples,
        })
    }
}

/// One raw probe observation as written to the time-series store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSample {
    pub agent_id: AgentId,
    pub target_id: TargetId,
    pub ts: DateTime<Utc>,
    pub success: bool,
    pub latency_ms: Option<f64>,
    pub packet_loss_pct: f64,
    pub rtt_samples: Vec<f64>,
    /// Denormalized at ingest for market-level queries
    pub agent_region: String,
    pub target_region: String,
    pub is_in_market: bool,
}

impl FromRow<'_, PgRow> for ProbeSample {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let Json(rtt_samples): Json<Vec<f64>> = row.try_get("rtt_samples")?;
        Ok(Self {
            agent_id: row.try_get("agent_id")?,
            target_id: row.try_get("target_id")?,
            ts: row.try_get("ts")?,
            success: row.try_get("success")?,
            latency_ms: row.try_get("latency_ms")?,
            packet_loss_pct: row.try_get("packet_loss_pct")?,
            rtt_samples,
            agent_region: row.try_get("agent_region")?,
            target_region: row.try_get("target_region")?,
            is_in_market: row.try_get("is_in_market")?,
        })
    }
}
