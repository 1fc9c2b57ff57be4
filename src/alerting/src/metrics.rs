//! # Alert Pipeline Metrics

use lazy_static::lazy_static;
use prometheus::{register_counter, Counter};

lazy_static! {
    /// Counter for alert cycles completed
    pub static ref CYCLES_TOTAL: Counter = register_counter!(
        "alerting_cycles_total",
        "Total number of alert/incident cycles completed"
    ).expect("Can't create cycles metric");

    /// Counter for alerts created
    pub static ref ALERTS_CREATED_TOTAL: Counter = register_counter!(
        "alerting_alerts_created_total",
        "Total number of alerts created"
    ).expect("Can't create alerts_created metric");

    /// Counter for alerts resolved
    pub static ref ALERTS_RESOLVED_TOTAL: Counter = register_counter!(
        "alerting_alerts_resolved_total",
        "Total number of alerts resolved"
    ).expect("Can't create alerts_resolved metric");

    /// Counter for incidents created
    pub static ref INCIDENTS_CREATED_TOTAL: Counter = register_counter!(
        "alerting_incidents_created_total",
        "Total number of incidents created"
    ).expect("Can't create incidents_created metric");
}
