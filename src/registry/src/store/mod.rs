//! # Metadata Store
//!
//! `MetadataRegistry` is the single writer for every persisted entity. All
//! mutations run inside its transactions; workers and API handlers hold
//! cloneable handles, never exclusive pointers. Assignment-relevant writes
//! bump the process-wide assignment_version exactly once per logical change
//! and append to the change feed so the assignment engine can poll deltas.

mod agents;
mod alerts;
mod assignments;
mod changes;
mod commands;
mod incidents;
mod runtime_config;
mod schema;
mod states;
mod subnets;
mod targets;
mod tiers;
mod timeseries;

pub use runtime_config::{AlertThresholds, ALERT_THRESHOLDS_KEY};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::types::RegistryResult;

/// Handle to the relational store; cheap to clone.
#[derive(Clone)]
pub struct MetadataRegistry {
    pool: PgPool,
}

impl MetadataRegistry {
    /// Connect to the database and verify the connection.
    pub async fn connect(database_url: &str, max_connections: u32) -> RegistryResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!("metadata registry connected");
        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests, shared pools).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for sinks that share the store.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema; idempotent.
    pub async fn ensure_schema(&self) -> RegistryResult<()> {
        for statement in schema::SCHEMA_STATEMENTS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("registry schema ensured");
        Ok(())
    }
}
