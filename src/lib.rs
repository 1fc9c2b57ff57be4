//! Project Watchtower - Fleet Monitoring Control Plane
//!
//! The orchestration brain of a fleet-based ICMP/latency monitoring
//! service: decides what to probe, who probes it, when a target is
//! healthy/degraded/down, when an operator must be alerted, and how to
//! recover from agent failures. Probing itself happens on remote agents;
//! they register, heartbeat, pull assignments, and stream results back
//! through the API in this crate.
//!
//! The subsystems live in workspace member crates (`registry-metadata`,
//! `fleet-gateway`, `assignment-engine`, `ingest-pipeline`,
//! `target-lifecycle`, `alert-pipeline`); this crate wires them together:
//! platform boot and supervision, the HTTP surface, and the background
//! workers.

pub mod api;
pub mod audit;
pub mod platform;
pub mod workers;

pub use platform::{AppContext, ControlPlaneConfig, Platform, PlatformRuntime};
