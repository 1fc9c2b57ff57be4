//! # HTTP Surface
//!
//! Two routers share one listener: the agent-facing API (registration,
//! heartbeats, assignments, commands, result ingest) and the operator API
//! (entity CRUD plus manual triggers). Bodies are bounded at admission;
//! result batches may be gzip-framed.

pub mod agent;
pub mod auth;
pub mod cache;
pub mod error;
pub mod operator;

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use ingest_pipeline::MAX_BATCH_BYTES;

use crate::platform::config::ServerSettings;
use crate::platform::context::AppContext;
use crate::platform::service::ServiceRegistration;

/// Compressed bodies inflate later; the wire-level bound only needs to
/// stop obviously abusive payloads.
const MAX_REQUEST_BYTES: usize = MAX_BATCH_BYTES + 512 * 1024;

pub fn router(context: AppContext) -> Router {
    Router::new()
        .merge(agent::agent_routes())
        .merge(operator::operator_routes())
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

pub fn api_service(settings: ServerSettings) -> ServiceRegistration {
    ServiceRegistration::new(
        "api",
        Arc::new(move |ctx: AppContext, token: CancellationToken| {
            let settings = settings.clone();
            tokio::spawn(async move {
                let outcome: Result<()> = async {
                    let app = router(ctx);
                    let listener = tokio::net::TcpListener::bind(&settings.bind_address).await?;
                    info!(bind = %settings.bind_address, "api server started");

                    let shutdown = token.clone();
                    axum::serve(listener, app)
                        .with_graceful_shutdown(async move {
                            shutdown.cancelled().await;
                            info!("shutting down api server");
                        })
                        .await?;
                    Ok(())
                }
                .await;

                outcome
            })
        }),
    )
}
