//! Time-series sink seam.
//!
//! The pipeline writes raw probe rows through this trait so the storage
//! engine stays swappable; the shipped implementation rides the registry's
//! relational store with its time-series extensions.

use async_trait::async_trait;

use registry_metadata::{MetadataRegistry, ProbeSample};

use crate::types::IngestResult;

/// Append-only probe storage. Implementations must drop duplicate
/// (agent, target, ts) rows silently so batch replay stays a no-op.
#[async_trait]
pub trait ProbeTimeseries: Send + Sync {
    /// Append samples, returning how many rows were newly written.
    async fn append(&self, samples: &[ProbeSample]) -> IngestResult<u64>;
}

/// Postgres-backed sink sharing the registry's store.
pub struct PgProbeSink {
    registry: MetadataRegistry,
}

impl PgProbeSink {
    pub fn new(registry: MetadataRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ProbeTimeseries for PgProbeSink {
    async fn append(&self, samples: &[ProbeSample]) -> IngestResult<u64> {
        Ok(self.registry.insert_probe_samples(samples).await?)
    }
}
