//! Operator API: CRUD over the registry's entities plus the manual
//! triggers (assignment rebuild, mtr-on-demand, baseline recalc).

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use fleet_gateway::CommandRequest;
use registry_metadata::{
    AgentStatus, AlertId, AlertThresholds, CommandId, IncidentId, SubnetId, SubnetSpec, TargetId,
    TargetSpec, TargetUpdate, TierSpec,
};

use crate::api::error::{ApiError, ApiResult};
use crate::platform::context::AppContext;
use crate::workers::load_all_specs;

/// TTL for cached hot read endpoints.
const LIST_CACHE_TTL: Duration = Duration::from_secs(5);

pub fn operator_routes() -> Router<AppContext> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/agents", get(list_agents))
        .route("/agents/:id", get(get_agent).delete(archive_agent))
        .route("/tiers", get(list_tiers).post(upsert_tier))
        .route("/tiers/:name", get(get_tier).delete(delete_tier))
        .route("/subnets", get(list_subnets).post(create_subnet))
        .route(
            "/subnets/:id",
            get(get_subnet).put(update_subnet).delete(archive_subnet),
        )
        .route("/targets", get(list_targets).post(create_target))
        .route(
            "/targets/:id",
            get(get_target).patch(update_target).delete(archive_target),
        )
        .route("/targets/:id/history", get(target_history))
        .route("/targets/:id/state", post(set_target_state))
        .route("/targets/:id/assignments", get(target_assignments))
        .route("/targets/:id/mtr", post(trigger_mtr))
        .route("/targets/:id/baseline/recalc", post(recalc_baseline))
        .route("/alerts", get(list_alerts))
        .route("/alerts/:id", get(get_alert))
        .route("/alerts/:id/events", get(alert_events))
        .route("/alerts/:id/acknowledge", post(acknowledge_alert))
        .route("/incidents", get(list_incidents))
        .route("/incidents/:id", get(get_incident))
        .route("/commands/:id", get(get_command))
        .route("/admin/assignments/rebuild", post(rebuild_assignments))
        .route(
            "/admin/alert-thresholds",
            get(get_thresholds).put(put_thresholds),
        )
}

fn operator_identity(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-operator")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn healthz(State(ctx): State<AppContext>) -> ApiResult<Json<serde_json::Value>> {
    // a registry round-trip is the one dependency worth proving
    let version = ctx.registry().current_assignment_version().await?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "assignment_version": version,
    })))
}

#[derive(Debug, Serialize)]
struct AgentView {
    #[serde(flatten)]
    agent: registry_metadata::Agent,
    status: AgentStatus,
}

async fn list_agents(State(ctx): State<AppContext>) -> ApiResult<Json<serde_json::Value>> {
    if let Some(cached) = ctx.cache().get("agents", LIST_CACHE_TTL) {
        return Ok(Json(cached));
    }

    let now = chrono::Utc::now();
    let agents = ctx.registry().list_agents().await?;
    let views: Vec<AgentView> = agents
        .into_iter()
        .map(|agent| AgentView {
            status: agent.status_at(now),
            agent,
        })
        .collect();

    let value = serde_json::to_value(&views).map_err(|_| ApiError::Internal)?;
    ctx.cache().put("agents", value.clone());
    Ok(Json(value))
}

async fn get_agent(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AgentView>> {
    let agent = ctx.registry().get_agent(id).await?;
    Ok(Json(AgentView {
        status: agent.status_at(chrono::Utc::now()),
        agent,
    }))
}

async fn archive_agent(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    ctx.registry().archive_agent(id).await?;
    ctx.cache().invalidate("agents");
    ctx.audit()
        .log_mutation(operator_identity(&headers), "archive", &format!("agent/{id}"));
    Ok(Json(serde_json::json!({ "status": "archived" })))
}

async fn list_tiers(State(ctx): State<AppContext>) -> ApiResult<Json<Vec<registry_metadata::Tier>>> {
    Ok(Json(ctx.registry().list_tiers().await?))
}

async fn upsert_tier(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(spec): Json<TierSpec>,
) -> ApiResult<Json<registry_metadata::Tier>> {
    let name = spec.name.clone();
    let tier = ctx.registry().upsert_tier(spec).await?;
    ctx.audit()
        .log_mutation(operator_identity(&headers), "upsert", &format!("tier/{name}"));
    Ok(Json(tier))
}

async fn get_tier(
    State(ctx): State<AppContext>,
    Path(name): Path<String>,
) -> ApiResult<Json<registry_metadata::Tier>> {
    Ok(Json(ctx.registry().get_tier(&name).await?))
}

async fn delete_tier(
    State(ctx): State<AppContext>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    ctx.registry().delete_tier(&name).await?;
    ctx.audit()
        .log_mutation(operator_identity(&headers), "delete", &format!("tier/{name}"));
    Ok(Json(serde_json::json!({ "status": "deleted" })))
}

async fn list_subnets(
    State(ctx): State<AppContext>,
) -> ApiResult<Json<Vec<registry_metadata::Subnet>>> {
    Ok(Json(ctx.registry().list_subnets().await?))
}

async fn create_subnet(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(spec): Json<SubnetSpec>,
) -> ApiResult<Json<registry_metadata::Subnet>> {
    let subnet = ctx.registry().create_subnet(spec).await?;
    ctx.audit().log_mutation(
        operator_identity(&headers),
        "create",
        &format!("subnet/{}", subnet.id),
    );
    Ok(Json(subnet))
}

async fn get_subnet(
    State(ctx): State<AppContext>,
    Path(id): Path<SubnetId>,
) -> ApiResult<Json<registry_metadata::Subnet>> {
    Ok(Json(ctx.registry().get_subnet(id).await?))
}

async fn update_subnet(
    State(ctx): State<AppContext>,
    Path(id): Path<SubnetId>,
    headers: HeaderMap,
    Json(spec): Json<SubnetSpec>,
) -> ApiResult<Json<registry_metadata::Subnet>> {
    let subnet = ctx.registry().update_subnet(id, spec).await?;
    ctx.audit()
        .log_mutation(operator_identity(&headers), "update", &format!("subnet/{id}"));
    Ok(Json(subnet))
}

async fn archive_subnet(
    State(ctx): State<AppContext>,
    Path(id): Path<SubnetId>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    ctx.registry().archive_subnet(id).await?;
    ctx.audit()
        .log_mutation(operator_identity(&headers), "archive", &format!("subnet/{id}"));
    Ok(Json(serde_json::json!({ "status": "archived" })))
}

async fn list_targets(
    State(ctx): State<AppContext>,
) -> ApiResult<Json<Vec<registry_metadata::Target>>> {
    Ok(Json(ctx.registry().list_targets().await?))
}

async fn create_target(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(spec): Json<TargetSpec>,
) -> ApiResult<Json<registry_metadata::Target>> {
    let target = ctx.registry().create_target(spec).await?;
    ctx.audit().log_mutation(
        operator_identity(&headers),
        "create",
        &format!("target/{}", target.id),
    );
    Ok(Json(target))
}

async fn get_target(
    State(ctx): State<AppContext>,
    Path(id): Path<TargetId>,
) -> ApiResult<Json<registry_metadata::Target>> {
    Ok(Json(ctx.registry().get_target(id).await?))
}

async fn update_target(
    State(ctx): State<AppContext>,
    Path(id): Path<TargetId>,
    headers: HeaderMap,
    Json(update): Json<TargetUpdate>,
) -> ApiResult<Json<registry_metadata::Target>> {
    let target = ctx.registry().update_target(id, update).await?;
    ctx.audit()
        .log_mutation(operator_identity(&headers), "update", &format!("target/{id}"));
    Ok(Json(target))
}

async fn archive_target(
    State(ctx): State<AppContext>,
    Path(id): Path<TargetId>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    ctx.registry().archive_target(id).await?;
    ctx.audit()
        .log_mutation(operator_identity(&headers), "archive", &format!("target/{id}"));
    Ok(Json(serde_json::json!({ "status": "archived" })))
}

#[derive(Debug, Deserialize)]
struct SetStateRequest {
    state: registry_metadata::MonitoringState,
}

/// Manual state override, e.g. marking a target inactive or pulling an
/// excluded one back into discovery.
async fn set_target_state(
    State(ctx): State<AppContext>,
    Path(id): Path<TargetId>,
    headers: HeaderMap,
    Json(request): Json<SetStateRequest>,
) -> ApiResult<Json<registry_metadata::Target>> {
    let target = ctx
        .registry()
        .transition_target_state(id, request.state, registry_metadata::TransitionTrigger::Manual)
        .await?;
    ctx.audit().log_mutation(
        operator_identity(&headers),
        "set_state",
        &format!("target/{id}"),
    );
    Ok(Json(target))
}

async fn target_history(
    State(ctx): State<AppContext>,
    Path(id): Path<TargetId>,
) -> ApiResult<Json<Vec<registry_metadata::TargetStateTransition>>> {
    Ok(Json(ctx.registry().state_history(id, 200).await?))
}

async fn target_assignments(
    State(ctx): State<AppContext>,
    Path(id): Path<TargetId>,
) -> ApiResult<Json<serde_json::Value>> {
    let assignments = ctx.registry().assignments_for_target(id).await?;
    let history = ctx.registry().assignment_history_for_target(id, 100).await?;
    Ok(Json(serde_json::json!({
        "assignments": assignments,
        "history": history,
    })))
}

#[derive(Debug, Deserialize, Default)]
struct MtrRequest {
    #[serde(default)]
    params: serde_json::Value,
    #[serde(default)]
    agent_ids: Option<Vec<Uuid>>,
}

/// Fan an mtr run out to the target's current assignees.
async fn trigger_mtr(
    State(ctx): State<AppContext>,
    Path(id): Path<TargetId>,
    headers: HeaderMap,
    body: Option<Json<MtrRequest>>,
) -> ApiResult<Json<registry_metadata::Command>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let requested_by = operator_identity(&headers).unwrap_or_else(|| "operator".to_string());

    let command = ctx
        .dispatcher()
        .dispatch(CommandRequest {
            command_type: "mtr".to_string(),
            target_id: id,
            params: request.params,
            requested_by: requested_by.clone(),
            agent_ids: request.agent_ids,
        })
        .await?;
    ctx.audit()
        .log_trigger(Some(requested_by), "mtr", &format!("target/{id}"));
    Ok(Json(command))
}

/// Drop the target's baselines so they rebuild from fresh probes.
async fn recalc_baseline(
    State(ctx): State<AppContext>,
    Path(id): Path<TargetId>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    ctx.registry().get_target(id).await?;
    let dropped = ctx.registry().delete_baselines_for_target(id).await?;
    ctx.registry().clear_baseline_established(id).await?;
    ctx.audit().log_trigger(
        operator_identity(&headers),
        "baseline_recalc",
        &format!("target/{id}"),
    );
    Ok(Json(serde_json::json!({
        "status": "accepted",
        "baselines_dropped": dropped,
    })))
}

async fn list_alerts(
    State(ctx): State<AppContext>,
) -> ApiResult<Json<Vec<registry_metadata::Alert>>> {
    Ok(Json(ctx.registry().list_active_alerts().await?))
}

async fn get_alert(
    State(ctx): State<AppContext>,
    Path(id): Path<AlertId>,
) -> ApiResult<Json<registry_metadata::Alert>> {
    Ok(Json(ctx.registry().get_alert(id).await?))
}

async fn alert_events(
    State(ctx): State<AppContext>,
    Path(id): Path<AlertId>,
) -> ApiResult<Json<Vec<registry_metadata::AlertEvent>>> {
    Ok(Json(ctx.registry().alert_events(id, 500).await?))
}

#[derive(Debug, Deserialize)]
struct AcknowledgeRequest {
    acknowledged_by: String,
}

async fn acknowledge_alert(
    State(ctx): State<AppContext>,
    Path(id): Path<AlertId>,
    Json(request): Json<AcknowledgeRequest>,
) -> ApiResult<Json<registry_metadata::Alert>> {
    let alert = ctx
        .registry()
        .acknowledge_alert(id, &request.acknowledged_by)
        .await?;
    Ok(Json(alert))
}

async fn list_incidents(
    State(ctx): State<AppContext>,
) -> ApiResult<Json<Vec<registry_metadata::Incident>>> {
    Ok(Json(ctx.registry().list_active_incidents().await?))
}

async fn get_incident(
    State(ctx): State<AppContext>,
    Path(id): Path<IncidentId>,
) -> ApiResult<Json<registry_metadata::Incident>> {
    Ok(Json(ctx.registry().get_incident(id).await?))
}

async fn get_command(
    State(ctx): State<AppContext>,
    Path(id): Path<CommandId>,
) -> ApiResult<Json<serde_json::Value>> {
    let command = ctx.registry().get_command(id).await?;
    let deliveries = ctx.registry().command_deliveries(id).await?;
    let results = ctx.registry().command_results(id).await?;
    Ok(Json(serde_json::json!({
        "command": command,
        "deliveries": deliveries,
        "results": results,
    })))
}

/// Kick a full materialization in the background; a second trigger while
/// one runs reports busy.
async fn rebuild_assignments(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    if ctx.assignment().is_materializing() {
        return Err(ApiError::Conflict("busy".to_string()));
    }

    ctx.audit()
        .log_trigger(operator_identity(&headers), "assignments_rebuild", "assignments");

    let background = ctx.clone();
    tokio::spawn(async move {
        let specs = match load_all_specs(&background).await {
            Ok(specs) => specs,
            Err(err) => {
                error!(error = %err, "materialization spec load failed");
                return;
            }
        };
        match background.assignment().materialize(&specs).await {
            Ok(outcome) => info!(
                inserted = outcome.applied.inserted,
                deleted = outcome.applied.deleted,
                "manual materialization finished"
            ),
            Err(err) => error!(error = %err, "manual materialization failed"),
        }
    });

    Ok(Json(serde_json::json!({ "status": "accepted" })))
}

async fn get_thresholds(State(ctx): State<AppContext>) -> ApiResult<Json<AlertThresholds>> {
    Ok(Json(ctx.registry().load_alert_thresholds().await?))
}

async fn put_thresholds(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(thresholds): Json<AlertThresholds>,
) -> ApiResult<Json<serde_json::Value>> {
    ctx.registry().store_alert_thresholds(&thresholds).await?;
    ctx.audit().log_mutation(
        operator_identity(&headers),
        "update",
        "runtime_config/alert_thresholds",
    );
    Ok(Json(serde_json::json!({ "status": "updated" })))
}
