//! # Registry Metrics
//!
//! Prometheus instrumentation for the metadata registry. Collectors are
//! registered against the default registry and exposed by the platform
//! telemetry endpoint.

use lazy_static::lazy_static;
use prometheus::{register_counter, register_int_gauge, Counter, IntGauge};

lazy_static! {
    /// Counter for target state transitions committed
    pub static ref STATE_TRANSITIONS_TOTAL: Counter = register_counter!(
        "registry_state_transitions_total",
        "Total number of target state transitions committed"
    ).expect("Can't create state_transitions metric");

    /// Counter for assignment plan applications
    pub static ref ASSIGNMENT_PLANS_TOTAL: Counter = register_counter!(
        "registry_assignment_plans_total",
        "Total number of assignment plans applied"
    ).expect("Can't create assignment_plans metric");

    /// Counter for entity change feed rows written
    pub static ref ENTITY_CHANGES_TOTAL: Counter = register_counter!(
        "registry_entity_changes_total",
        "Total number of change feed rows written"
    ).expect("Can't create entity_changes metric");

    /// Gauge mirroring the last observed assignment version
    pub static ref ASSIGNMENT_VERSION: IntGauge = register_int_gauge!(
        "registry_assignment_version",
        "Most recent assignment version committed by this process"
    ).expect("Can't create assignment_version metric");
}
