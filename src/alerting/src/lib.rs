//! # Alert Pipeline - Alerts and Incident Correlation
//!
//! Converts per-(agent,target) anomaly observations into evolving
//! operator-facing alerts (escalate / de-escalate / resolve, peak severity
//! monotone) and correlates alerts into incidents by blast-radius key
//! (typically the subnet). Thresholds are hot-reloadable through the
//! registry's runtime configuration.

pub mod metrics;
pub mod pipeline;
pub mod severity;
pub mod types;

pub use pipeline::*;
pub use severity::*;
pub use types::*;
