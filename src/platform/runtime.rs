use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use alert_pipeline::AlertPipeline;
use assignment_engine::AssignmentEngine;
use fleet_gateway::{CommandDispatcher, FlapSuppressor, HeartbeatTracker};
use ingest_pipeline::{AnomalyThresholds, IngestPipeline, PgProbeSink};
use registry_metadata::MetadataRegistry;
use target_lifecycle::{LifecycleEngine, StateThresholds};

use crate::audit::AuditLog;
use crate::platform::config::ControlPlaneConfig;
use crate::platform::context::AppContext;
use crate::platform::service::ServiceRegistration;
use crate::platform::telemetry::telemetry_service;

pub struct Platform {
    config: ControlPlaneConfig,
    services: Vec<ServiceRegistration>,
}

impl Platform {
    pub fn new(config: ControlPlaneConfig) -> Self {
        let mut services = Vec::new();
        services.push(telemetry_service(config.observability.clone()));

        Self { config, services }
    }

    pub fn register_service(&mut self, service: ServiceRegistration) {
        self.services.push(service);
    }

    pub async fn start(self) -> Result<PlatformRuntime> {
        initialize_logging(&self.config);
        let config = self.config;

        if config.database.url.is_empty() {
            bail!("database URL is not configured (set DATABASE_URL or --database-url)");
        }

        let registry =
            MetadataRegistry::connect(&config.database.url, config.database.max_connections)
                .await?;
        registry.ensure_schema().await?;
        registry.seed_reserved_tiers().await?;

        // seed the hot-reloadable thresholds once; the runtime table wins
        // from then on
        if registry
            .get_runtime_value(registry_metadata::ALERT_THRESHOLDS_KEY)
            .await?
            .is_none()
        {
            registry.store_alert_thresholds(&config.alerting).await?;
        }

        let (transitions_tx, transitions_rx) = mpsc::channel(1024);
        let tracker = Arc::new(HeartbeatTracker::with_thresholds(
            registry.clone(),
            transitions_tx,
            config.heartbeat.degraded_secs,
            config.heartbeat.offline_secs,
        ));
        tracker.seed().await?;

        let flap = Arc::new(FlapSuppressor::with_defaults());
        let dispatcher = Arc::new(CommandDispatcher::new(registry.clone()));
        let assignment = Arc::new(AssignmentEngine::new(registry.clone()));
        let lifecycle = Arc::new(LifecycleEngine::new(
            registry.clone(),
            StateThresholds {
                baseline_secs: config.state.baseline_secs,
                down_secs: config.state.down_secs,
                excluded_secs: config.state.excluded_secs,
                discovery_max_attempts: config.state.discovery_max_attempts,
            },
        ));
        let sink = Arc::new(PgProbeSink::new(registry.clone()));
        let ingest = Arc::new(IngestPipeline::new(
            registry.clone(),
            Arc::clone(&lifecycle),
            sink,
            AnomalyThresholds {
                consecutive_failures: config.ingest.consecutive_failures,
                z_score: config.ingest.z_score,
                packet_loss_pct: config.ingest.packet_loss_pct,
                late_window_secs: config.ingest.late_window_secs,
            },
            config.ingest.effective_workers(),
        ));
        let alerts = Arc::new(AlertPipeline::new(registry.clone()));
        let audit = Arc::new(
            AuditLog::new(&config.audit.log_path, config.audit.retention_days)
                .map_err(|err| anyhow::anyhow!(err.to_string()))?,
        );

        let root_token = CancellationToken::new();
        let context = AppContext::new(
            config.clone(),
            registry,
            tracker,
            flap,
            dispatcher,
            assignment,
            lifecycle,
            ingest,
            alerts,
            audit,
            transitions_rx,
            root_token.child_token(),
        );

        let mut services = self.services;
        services.push(crate::api::api_service(config.server.clone()));
        services.push(crate::workers::heartbeat_service(&config.workers));
        services.push(crate::workers::assignment_service(&config.workers));
        services.push(crate::workers::state_service(&config.workers));
        services.push(crate::workers::alert_service(&config.workers));
        services.push(crate::workers::command_expiry_service(&config.workers));

        let mut tasks = Vec::new();
        for service in services {
            let handle = service.spawn(context.clone(), root_token.child_token());
            tasks.push((service.name().to_string(), handle));
        }

        info!("control plane boot completed");

        Ok(PlatformRuntime {
            context,
            cancel_token: root_token,
            tasks,
            grace: Duration::from_secs(config.workers.shutdown_grace_secs),
        })
    }
}

pub struct PlatformRuntime {
    context: AppContext,
    cancel_token: CancellationToken,
    tasks: Vec<(String, JoinHandle<Result<()>>)>,
    grace: Duration,
}

impl PlatformRuntime {
    pub fn context(&self) -> AppContext {
        self.context.clone()
    }

    /// Signal every service, wait up to the grace timeout for each, then
    /// return.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel_token.cancel();

        for (name, handle) in self.tasks {
            match timeout(self.grace, handle).await {
                Ok(Ok(Ok(()))) => info!(service = %name, "service shutdown cleanly"),
                Ok(Ok(Err(err))) => warn!(service = %name, error = %err, "service exited with error"),
                Ok(Err(err)) => warn!(service = %name, error = %err, "service task panicked"),
                Err(_) => warn!(service = %name, "service did not stop within grace period"),
            }
        }

        Ok(())
    }
}

fn initialize_logging(config: &ControlPlaneConfig) {
    let filter = &config.observability.log_level;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter.as_str())
        .try_init();
}
