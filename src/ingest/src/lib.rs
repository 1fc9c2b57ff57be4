//! # Ingest Pipeline - Streaming Probe Results
//!
//! Accepts result batches from agents (optionally gzip-framed), appends
//! them to the time-series store, maintains per-(agent,target) anomaly
//! state and latency baselines, and drives the target state machine's
//! per-probe transitions.
//!
//! ## Contract
//!
//! - Idempotent by (agent_id, target_id, timestamp); replaying a batch is
//!   a no-op on storage and state
//! - Out-of-order results inside the late-arrival window are accepted;
//!   anomaly state always follows the highest timestamp seen
//! - Oversize batches fail with a distinct error; a saturated worker pool
//!   answers with a slow-down signal

pub mod baseline;
pub mod codec;
pub mod metrics;
pub mod pipeline;
pub mod sink;
pub mod state;
pub mod types;

pub use baseline::*;
pub use codec::*;
pub use pipeline::*;
pub use sink::*;
pub use state::*;
pub use types::*;
