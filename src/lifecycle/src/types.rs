//! # Lifecycle Types

use serde::{Deserialize, Serialize};
use thiserror::Error;

use registry_metadata::{MonitoringState, RegistryError, TargetId, TransitionTrigger};

/// Time thresholds driving the sweep, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateThresholds {
    /// Active this long before the baseline is considered established
    pub baseline_secs: i64,
    /// No successful probe for this long flips active targets to down
    pub down_secs: i64,
    /// No response for this long flips down customer targets to excluded
    pub excluded_secs: i64,
    /// Failed discovery probes before an unknown target goes unresponsive
    pub discovery_max_attempts: i32,
}

impl Default for StateThresholds {
    fn default() -> Self {
        Self {
            baseline_secs: 60,        // 1 minute
            down_secs: 900,           // 15 minutes
            excluded_secs: 86_400,    // 24 hours
            discovery_max_attempts: 5,
        }
    }
}

/// A transition the sweep decided on; applied through the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedTransition {
    pub target_id: TargetId,
    pub to: MonitoringState,
    pub trigger: TransitionTrigger,
}

/// What one sweep did, for logging and tests.
#[derive(Debug, Default, Clone)]
pub struct SweepSummary {
    pub baselines_established: usize,
    pub transitions: Vec<PlannedTransition>,
    pub representatives_elected: usize,
    pub promotions: usize,
    /// Unresponsive/excluded targets whose subnet currently has no active
    /// customer coverage; the assignment worker schedules them on the
    /// smart-recheck tier
    pub recheck_eligible: Vec<TargetId>,
    /// Targets previously on smart recheck whose subnet regained coverage
    pub recheck_retired: Vec<TargetId>,
    pub errors: usize,
}

/// Error types for the lifecycle engine
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Registry failures pass through unchanged
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Convenience result alias for lifecycle operations
pub type LifecycleResult<T> = Result<T, LifecycleError>;
