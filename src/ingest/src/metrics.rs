//! # Ingest Metrics

use lazy_static::lazy_static;
use prometheus::{register_counter, Counter};

lazy_static! {
    /// Counter for result batches accepted
    pub static ref BATCHES_TOTAL: Counter = register_counter!(
        "ingest_batches_total",
        "Total number of result batches accepted for processing"
    ).expect("Can't create batches metric");

    /// Counter for individual probe results applied
    pub static ref RESULTS_INGESTED_TOTAL: Counter = register_counter!(
        "ingest_results_total",
        "Total number of probe results applied to state"
    ).expect("Can't create results metric");

    /// Counter for batches rejected at admission
    pub static ref REJECTED_BATCHES_TOTAL: Counter = register_counter!(
        "ingest_rejected_batches_total",
        "Total number of batches rejected (oversize or saturated)"
    ).expect("Can't create rejected_batches metric");
}
