//! Agent-facing API: registration, heartbeats, assignment snapshots,
//! command polls, and result ingest.

use axum::extract::{Path, State};
use axum::http::header::CONTENT_ENCODING;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{body::Bytes, Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use fleet_gateway::{CommandResultPayload, HeartbeatPayload, HeartbeatResponse};
use ingest_pipeline::decode_batch;
use registry_metadata::{AgentId, AgentRegistration, CommandId, Tier};

use crate::api::auth::{authenticate_agent, hash_api_key};
use crate::api::error::{ApiError, ApiResult};
use crate::platform::context::AppContext;

pub fn agent_routes() -> Router<AppContext> {
    Router::new()
        .route("/agents/register", post(register))
        .route("/agents/:id/heartbeat", post(heartbeat))
        .route("/agents/:id/assignments", get(assignments))
        .route("/agents/:id/commands", get(poll_commands))
        .route("/agents/:id/commands/:cmd_id/result", post(command_result))
        .route("/results", post(ingest_results))
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    name: String,
    region: String,
    location: String,
    provider: String,
    #[serde(default)]
    tags: HashMap<String, String>,
    public_ip: Option<String>,
    version: Option<String>,
    executors: Vec<String>,
    max_targets: i32,
    /// Plaintext credential; only its hash is stored
    api_key: String,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    agent_id: AgentId,
    message: String,
}

/// Idempotent by name: re-registration updates attributes in place.
async fn register(
    State(ctx): State<AppContext>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<Json<RegisterResponse>> {
    if request.api_key.len() < 16 {
        return Err(ApiError::Validation(
            "api_key must be at least 16 characters".to_string(),
        ));
    }

    let api_key_hash = hash_api_key(&request.api_key)?;
    let existing = ctx.registry().get_agent_by_name(&request.name).await?;

    let agent = ctx
        .registry()
        .register_agent(AgentRegistration {
            name: request.name,
            region: request.region,
            location: request.location,
            provider: request.provider,
            tags: request.tags,
            public_ip: request.public_ip,
            version: request.version,
            executors: request.executors,
            max_targets: request.max_targets,
            api_key_hash,
        })
        .await?;

    let message = if existing.is_some() {
        "agent re-registered".to_string()
    } else {
        info!(agent = %agent.name, region = %agent.region, "new agent registered");
        "agent registered".to_string()
    };

    Ok(Json(RegisterResponse {
        agent_id: agent.id,
        message,
    }))
}

async fn heartbeat(
    State(ctx): State<AppContext>,
    Path(agent_id): Path<AgentId>,
    headers: HeaderMap,
    Json(payload): Json<HeartbeatPayload>,
) -> ApiResult<Json<HeartbeatResponse>> {
    authenticate_agent(&ctx, agent_id, &headers).await?;
    let response = ctx.tracker().handle_heartbeat(agent_id, payload).await?;
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct AssignedTargetView {
    target_id: Uuid,
    ip: String,
    tier: String,
    probe_interval_secs: i32,
    probe_timeout_ms: i32,
    probe_retries: i32,
}

#[derive(Debug, Serialize)]
struct AssignmentsResponse {
    assignment_version: i64,
    targets: Vec<AssignedTargetView>,
}

/// Snapshot of the agent's current target list with per-target tier
/// parameters; agents re-fetch when heartbeats report a newer version.
async fn assignments(
    State(ctx): State<AppContext>,
    Path(agent_id): Path<AgentId>,
    headers: HeaderMap,
) -> ApiResult<Json<AssignmentsResponse>> {
    authenticate_agent(&ctx, agent_id, &headers).await?;

    let version = ctx.registry().current_assignment_version().await?;
    let rows = ctx.registry().assignments_for_agent(agent_id).await?;

    let mut tiers: HashMap<String, Tier> = HashMap::new();
    let mut targets = Vec::with_capacity(rows.len());
    for assignment in rows {
        let Ok(target) = ctx.registry().get_target(assignment.target_id).await else {
            continue;
        };
        if target.archived_at.is_some() {
            continue;
        }
        if !tiers.contains_key(&assignment.tier) {
            let tier = ctx.registry().get_tier(&assignment.tier).await?;
            tiers.insert(assignment.tier.clone(), tier);
        }
        let tier = &tiers[&assignment.tier];
        targets.push(AssignedTargetView {
            target_id: target.id,
            ip: target.ip,
            tier: assignment.tier.clone(),
            probe_interval_secs: tier.probe_interval_secs,
            probe_timeout_ms: tier.probe_timeout_ms,
            probe_retries: tier.probe_retries,
        });
    }

    Ok(Json(AssignmentsResponse {
        assignment_version: version,
        targets,
    }))
}

#[derive(Debug, Serialize)]
struct CommandView {
    id: CommandId,
    command_type: String,
    target_id: Uuid,
    target_ip: String,
    params: serde_json::Value,
    expires_at: chrono::DateTime<chrono::Utc>,
}

/// Pending commands; polling transitions them to delivered.
async fn poll_commands(
    State(ctx): State<AppContext>,
    Path(agent_id): Path<AgentId>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<CommandView>>> {
    authenticate_agent(&ctx, agent_id, &headers).await?;

    let commands = ctx.dispatcher().poll(agent_id).await?;
    let views = commands
        .into_iter()
        .map(|c| CommandView {
            id: c.id,
            command_type: c.command_type,
            target_id: c.target_id,
            target_ip: c.target_ip,
            params: c.params,
            expires_at: c.expires_at,
        })
        .collect();
    Ok(Json(views))
}

async fn command_result(
    State(ctx): State<AppContext>,
    Path((agent_id, command_id)): Path<(AgentId, CommandId)>,
    headers: HeaderMap,
    Json(payload): Json<CommandResultPayload>,
) -> ApiResult<Json<serde_json::Value>> {
    authenticate_agent(&ctx, agent_id, &headers).await?;
    ctx.dispatcher()
        .record_result(command_id, agent_id, payload)
        .await?;
    Ok(Json(serde_json::json!({ "status": "accepted" })))
}

#[derive(Debug, Serialize)]
struct IngestResponse {
    accepted: usize,
}

/// Batch ingest; bodies may be gzip-encoded.
async fn ingest_results(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<IngestResponse>> {
    let gzip = headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("gzip"))
        .unwrap_or(false);

    let batch = decode_batch(&body, gzip)?;
    authenticate_agent(&ctx, batch.agent_id, &headers).await?;

    let summary = ctx.ingest().ingest(batch).await?;
    Ok(Json(IngestResponse {
        accepted: summary.accepted,
    }))
}
