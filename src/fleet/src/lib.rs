//! # Fleet Gateway - Agent Lifecycle and Command Fan-out
//!
//! Tracks every agent's derived status from heartbeat age, raises
//! offline/recovered transitions onto the worker bus, and fans one-shot
//! commands (e.g. traceroute-on-demand) out to agents with at-most-once
//! result capture.
//!
//! ## Core Components
//!
//! - **Heartbeat Tracker**: classifies agents, detects status edges, seeds
//!   silently at startup
//! - **Flap Suppressor**: keeps bouncing agents from churning assignments
//! - **Command Dispatcher**: pending queue per agent, poll delivery, expiry

pub mod commands;
pub mod heartbeat;
pub mod metrics;
pub mod types;

pub use commands::*;
pub use heartbeat::*;
pub use types::*;
