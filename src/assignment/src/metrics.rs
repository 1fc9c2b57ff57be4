//! # Assignment Engine Metrics

use lazy_static::lazy_static;
use prometheus::{register_counter, register_int_gauge, Counter, IntGauge};

lazy_static! {
    /// Counter for planning passes applied
    pub static ref PLAN_PASSES_TOTAL: Counter = register_counter!(
        "assignment_plan_passes_total",
        "Total number of assignment planning passes applied"
    ).expect("Can't create plan_passes metric");

    /// Counter for agent failovers processed
    pub static ref FAILOVERS_TOTAL: Counter = register_counter!(
        "assignment_failovers_total",
        "Total number of agent failovers processed"
    ).expect("Can't create failovers metric");

    /// Gauge of targets below their policy count after the last pass
    pub static ref UNDER_ASSIGNED_TARGETS: IntGauge = register_int_gauge!(
        "assignment_under_assigned_targets",
        "Targets the last planning pass left below policy"
    ).expect("Can't create under_assigned metric");
}
