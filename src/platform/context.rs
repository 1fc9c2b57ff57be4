use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use alert_pipeline::AlertPipeline;
use assignment_engine::AssignmentEngine;
use fleet_gateway::{AgentTransition, CommandDispatcher, FlapSuppressor, HeartbeatTracker};
use ingest_pipeline::IngestPipeline;
use registry_metadata::MetadataRegistry;
use target_lifecycle::LifecycleEngine;

use crate::api::cache::ResponseCache;
use crate::audit::AuditLog;
use crate::platform::config::ControlPlaneConfig;

/// Shared handle threaded through API handlers and workers; cheap to clone.
#[derive(Clone)]
pub struct AppContext {
    shared: Arc<SharedState>,
    shutdown: CancellationToken,
}

struct SharedState {
    config: ControlPlaneConfig,
    registry: MetadataRegistry,
    tracker: Arc<HeartbeatTracker>,
    flap: Arc<FlapSuppressor>,
    dispatcher: Arc<CommandDispatcher>,
    assignment: Arc<AssignmentEngine>,
    lifecycle: Arc<LifecycleEngine>,
    ingest: Arc<IngestPipeline>,
    alerts: Arc<AlertPipeline>,
    audit: Arc<AuditLog>,
    cache: ResponseCache,
    /// Taken once by the assignment worker at startup
    transitions: Mutex<Option<mpsc::Receiver<AgentTransition>>>,
}

impl AppContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: ControlPlaneConfig,
        registry: MetadataRegistry,
        tracker: Arc<HeartbeatTracker>,
        flap: Arc<FlapSuppressor>,
        dispatcher: Arc<CommandDispatcher>,
        assignment: Arc<AssignmentEngine>,
        lifecycle: Arc<LifecycleEngine>,
        ingest: Arc<IngestPipeline>,
        alerts: Arc<AlertPipeline>,
        audit: Arc<AuditLog>,
        transitions: mpsc::Receiver<AgentTransition>,
        shutdown: CancellationToken,
    ) -> Self {
        let shared = SharedState {
            config,
            registry,
            tracker,
            flap,
            dispatcher,
            assignment,
            lifecycle,
            ingest,
            alerts,
            audit,
            cache: ResponseCache::new(),
            transitions: Mutex::new(Some(transitions)),
        };

        Self {
            shared: Arc::new(shared),
            shutdown,
        }
    }

    pub fn config(&self) -> &ControlPlaneConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &MetadataRegistry {
        &self.shared.registry
    }

    pub fn tracker(&self) -> Arc<HeartbeatTracker> {
        Arc::clone(&self.shared.tracker)
    }

    pub fn flap(&self) -> Arc<FlapSuppressor> {
        Arc::clone(&self.shared.flap)
    }

    pub fn dispatcher(&self) -> Arc<CommandDispatcher> {
        Arc::clone(&self.shared.dispatcher)
    }

    pub fn assignment(&self) -> Arc<AssignmentEngine> {
        Arc::clone(&self.shared.assignment)
    }

    pub fn lifecycle(&self) -> Arc<LifecycleEngine> {
        Arc::clone(&self.shared.lifecycle)
    }

    pub fn ingest(&self) -> Arc<IngestPipeline> {
        Arc::clone(&self.shared.ingest)
    }

    pub fn alerts(&self) -> Arc<AlertPipeline> {
        Arc::clone(&self.shared.alerts)
    }

    pub fn audit(&self) -> Arc<AuditLog> {
        Arc::clone(&self.shared.audit)
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.shared.cache
    }

    /// Hand the transition receiver to its single consumer; None after the
    /// first take.
    pub async fn take_transitions(&self) -> Option<mpsc::Receiver<AgentTransition>> {
        self.shared.transitions.lock().await.take()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}
