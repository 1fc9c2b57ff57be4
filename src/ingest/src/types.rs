//! # Ingest Types
//!
//! Wire shapes for probe batches, the anomaly thresholds, and the ingest
//! error type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use registry_metadata::{RegistryError, TargetId};
use target_lifecycle::LifecycleError;

/// Hard cap on results per batch.
pub const MAX_BATCH_RESULTS: usize = 10_000;

/// Hard cap on the decoded batch body, in bytes (4 MiB).
pub const MAX_BATCH_BYTES: usize = 4 * 1024 * 1024;

/// One probe observation inside a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResultEntry {
    pub target_id: TargetId,
    pub ip: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub latency_ms: Option<f64>,
    #[serde(default)]
    pub packet_loss_pct: f64,
    #[serde(default)]
    pub rtt_samples: Vec<f64>,
}

/// A streaming result batch from one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultBatch {
    pub agent_id: uuid::Uuid,
    pub results: Vec<ProbeResultEntry>,
}

/// Thresholds for per-probe anomaly scoring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyThresholds {
    /// Consecutive failures before an availability anomaly
    pub consecutive_failures: i32,
    /// Z-score against the latency baseline before a latency anomaly
    pub z_score: f64,
    /// Packet loss percentage before a loss anomaly
    pub packet_loss_pct: f64,
    /// Late-arrival tolerance for out-of-order results, in seconds
    pub late_window_secs: i64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            consecutive_failures: 3,
            z_score: 3.0,
            packet_loss_pct: 5.0,
            late_window_secs: 120, // 2 minutes
        }
    }
}

/// Which anomaly signals one probe raised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnomalySignals {
    pub availability: bool,
    pub latency: bool,
    pub packet_loss: bool,
}

impl AnomalySignals {
    pub fn any(&self) -> bool {
        self.availability || self.latency || self.packet_loss
    }
}

/// What happened to one accepted batch.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IngestSummary {
    /// Results applied to state and the time-series store
    pub accepted: usize,
    /// Results dropped as duplicates or stale out-of-order arrivals
    pub duplicates: usize,
    /// Results referencing unknown or archived targets
    pub unknown_targets: usize,
    /// State transitions the batch caused
    pub transitions: usize,
}

/// Error types for the ingest pipeline
#[derive(Debug, Error)]
pub enum IngestError {
    /// Registry failures pass through unchanged
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Lifecycle failures while applying per-probe transitions
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Batch exceeded the result-count or byte cap; the agent should retry
    /// with smaller batches
    #[error("batch too large: {count} results, {bytes} bytes")]
    BatchTooLarge { count: usize, bytes: usize },

    /// Worker pool saturated; the agent should slow down and retry
    #[error("ingest pipeline saturated, retry later")]
    Saturated,

    /// Body could not be decoded (bad gzip frame or malformed JSON)
    #[error("batch decode error: {0}")]
    Decode(String),
}

/// Convenience result alias for ingest operations
pub type IngestResult<T> = Result<T, IngestError>;
