//! # Alert Pipeline Types

use serde::{Deserialize, Serialize};
use thiserror::Error;

use registry_metadata::{RegistryError, SubnetId, TargetId};

/// Z-score past which latency counts as anomalous; matches the ingest
/// pipeline's scoring.
pub const LATENCY_Z_SCORE_ANOMALY: f64 = 3.0;

/// Consecutive failures past which availability counts as anomalous.
pub const AVAILABILITY_FAILURE_ANOMALY: i32 = 3;

/// Identity of the periodic worker, recorded on every event it triggers.
pub const ALERT_WORKER_IDENTITY: &str = "alert-worker";

/// Build the blast-radius grouping key for a target.
pub fn correlation_key(subnet_id: Option<SubnetId>, target_id: TargetId) -> String {
    match subnet_id {
        Some(subnet) => format!("subnet:{subnet}"),
        None => format!("target:{target_id}"),
    }
}

/// What one alert/incident cycle did.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct CycleSummary {
    pub alerts_created: usize,
    pub escalated: usize,
    pub de_escalated: usize,
    pub metrics_updated: usize,
    pub resolved: usize,
    pub incidents_created: usize,
    pub alerts_linked: usize,
    pub incidents_resolved: usize,
    pub errors: usize,
}

/// Error types for the alert pipeline
#[derive(Debug, Error)]
pub enum AlertError {
    /// Registry failures pass through unchanged
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Convenience result alias for alerting operations
pub type AlertResult<T> = Result<T, AlertError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn correlation_prefers_the_subnet() {
        let subnet = Uuid::new_v4();
        let target = Uuid::new_v4();
        assert_eq!(
            correlation_key(Some(subnet), target),
            format!("subnet:{subnet}")
        );
        assert_eq!(correlation_key(None, target), format!("target:{target}"));
    }
}
