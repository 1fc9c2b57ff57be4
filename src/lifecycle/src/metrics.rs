//! # Lifecycle Metrics

use lazy_static::lazy_static;
use prometheus::{register_counter, Counter};

lazy_static! {
    /// Counter for sweeps completed
    pub static ref SWEEPS_TOTAL: Counter = register_counter!(
        "lifecycle_sweeps_total",
        "Total number of lifecycle sweeps completed"
    ).expect("Can't create sweeps metric");

    /// Counter for transitions applied by sweeps
    pub static ref SWEEP_TRANSITIONS_TOTAL: Counter = register_counter!(
        "lifecycle_sweep_transitions_total",
        "Total number of state transitions applied by sweeps"
    ).expect("Can't create sweep_transitions metric");

    /// Counter for transitions applied by per-probe evaluation
    pub static ref PROBE_TRANSITIONS_TOTAL: Counter = register_counter!(
        "lifecycle_probe_transitions_total",
        "Total number of state transitions applied by probe results"
    ).expect("Can't create probe_transitions metric");

    /// Counter for baselines established
    pub static ref BASELINES_ESTABLISHED_TOTAL: Counter = register_counter!(
        "lifecycle_baselines_established_total",
        "Total number of target baselines established"
    ).expect("Can't create baselines metric");

    /// Counter for standby-to-representative promotions
    pub static ref PROMOTIONS_TOTAL: Counter = register_counter!(
        "lifecycle_promotions_total",
        "Total number of standby promotions to representative"
    ).expect("Can't create promotions metric");
}
