//! # Fleet Gateway Metrics

use lazy_static::lazy_static;
use prometheus::{register_counter, Counter};

lazy_static! {
    /// Counter for heartbeats processed
    pub static ref HEARTBEATS_TOTAL: Counter = register_counter!(
        "fleet_heartbeats_total",
        "Total number of agent heartbeats processed"
    ).expect("Can't create heartbeats metric");

    /// Counter for agent status transitions observed
    pub static ref AGENT_TRANSITIONS_TOTAL: Counter = register_counter!(
        "fleet_agent_transitions_total",
        "Total number of agent offline/recovered transitions"
    ).expect("Can't create agent_transitions metric");

    /// Counter for one-shot commands dispatched
    pub static ref COMMANDS_DISPATCHED_TOTAL: Counter = register_counter!(
        "fleet_commands_dispatched_total",
        "Total number of one-shot commands dispatched"
    ).expect("Can't create commands_dispatched metric");

    /// Counter for command results stored
    pub static ref COMMAND_RESULTS_TOTAL: Counter = register_counter!(
        "fleet_command_results_total",
        "Total number of command results stored"
    ).expect("Can't create command_results metric");
}
