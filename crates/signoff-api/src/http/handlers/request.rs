//! Request instance handlers: start, read, process and task queries.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use signoff_core::engine::Decision;
use signoff_types::id::InstanceId;
use signoff_types::instance::{DashboardStats, InstanceView, StartRequest, TaskView};

use crate::http::error::AppError;
use crate::http::extractors::auth::CurrentActor;
use crate::http::extractors::query::{RequestListQuery, parse_id};
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

type InstanceResponse = Json<ApiResponse<InstanceView>>;

/// Body of `POST /requests/{id}/process`.
#[derive(Debug, Deserialize)]
pub struct ProcessBody {
    pub outcome: String,
    #[serde(default)]
    pub context: Option<Value>,
    /// Optimistic check: fail with 409 unless the request is at this version.
    #[serde(default)]
    pub version: Option<i64>,
}

impl ProcessBody {
    fn into_decision(self) -> Decision {
        let mut decision = Decision::new(self.outcome);
        if let Some(context) = self.context {
            decision = decision.with_context(context);
        }
        if let Some(version) = self.version {
            decision = decision.at_version(version);
        }
        decision
    }
}

/// Body of the `/workflow-instances/{id}/decision` alias.
#[derive(Debug, Deserialize)]
pub struct DecisionBody {
    pub action: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub version: Option<i64>,
}

impl DecisionBody {
    fn into_decision(self) -> Decision {
        let mut decision = Decision::new(self.action.trim().to_uppercase());
        if let Some(comment) = self.comment {
            decision = decision.with_context(json!({ "comment": comment }));
        }
        if let Some(version) = self.version {
            decision = decision.at_version(version);
        }
        decision
    }
}

fn links(resp: ApiResponse<InstanceView>, id: &InstanceId) -> ApiResponse<InstanceView> {
    resp.with_link("self", &format!("/api/v1/requests/{id}"))
        .with_link("process", &format!("/api/v1/requests/{id}/process"))
        .with_link("audit", &format!("/api/v1/audit?request_id={id}"))
}

/// GET /api/v1/requests
pub async fn list_requests(
    State(state): State<AppState>,
    _actor: CurrentActor,
    Query(query): Query<RequestListQuery>,
) -> Result<Json<ApiResponse<Vec<InstanceView>>>, AppError> {
    let timer = RequestTimer::start();
    let filter = query.into_filter()?;

    let now = state.clock.now();
    let views = state
        .instances
        .list(filter)
        .await?
        .iter()
        .map(|i| i.view(now))
        .collect::<Vec<_>>();
    Ok(Json(timer.success(views).with_link("self", "/api/v1/requests")))
}

/// POST /api/v1/requests
///
/// The authenticated actor becomes the requester.
pub async fn start_request(
    State(state): State<AppState>,
    actor: CurrentActor,
    Json(body): Json<StartRequest>,
) -> Result<(StatusCode, InstanceResponse), AppError> {
    let timer = RequestTimer::start();
    let payload = body.request_data.unwrap_or_else(|| json!({}));

    let instance = state
        .instances
        .start(&body.workflow_id, actor.0.user_id, payload)
        .await?;
    let resp = links(timer.success(instance.view(state.clock.now())), &instance.id);
    Ok((StatusCode::CREATED, Json(resp)))
}

/// GET /api/v1/requests/{id}
pub async fn get_request(
    State(state): State<AppState>,
    _actor: CurrentActor,
    Path(id): Path<String>,
) -> Result<InstanceResponse, AppError> {
    let timer = RequestTimer::start();
    let id: InstanceId = parse_id("request id", &id)?;
    let instance = state.instances.get(&id).await?;
    Ok(Json(links(timer.success(instance.view(state.clock.now())), &id)))
}

/// POST /api/v1/requests/{id}/process
pub async fn process_request(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path(id): Path<String>,
    Json(body): Json<ProcessBody>,
) -> Result<InstanceResponse, AppError> {
    decide(&state, &actor, &id, body.into_decision()).await
}

/// POST /api/v1/workflow-instances/{id}/decision
pub async fn decide_alias(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path(id): Path<String>,
    Json(body): Json<DecisionBody>,
) -> Result<InstanceResponse, AppError> {
    decide(&state, &actor, &id, body.into_decision()).await
}

async fn decide(
    state: &AppState,
    actor: &CurrentActor,
    id: &str,
    decision: Decision,
) -> Result<InstanceResponse, AppError> {
    let timer = RequestTimer::start();
    let id: InstanceId = parse_id("request id", id)?;
    let instance = state.executor.process(&id, &actor.0, decision).await?;
    Ok(Json(links(timer.success(instance.view(state.clock.now())), &id)))
}

/// GET /api/v1/requests/my-tasks
pub async fn my_tasks(
    State(state): State<AppState>,
    actor: CurrentActor,
) -> Result<Json<ApiResponse<Vec<TaskView>>>, AppError> {
    let timer = RequestTimer::start();
    let tasks = state.tasks.my_tasks(&actor.0).await?;
    Ok(Json(timer.success(tasks).with_link("self", "/api/v1/requests/my-tasks")))
}

/// GET /api/v1/requests/stats
pub async fn request_stats(
    State(state): State<AppState>,
    _actor: CurrentActor,
) -> Result<Json<ApiResponse<DashboardStats>>, AppError> {
    let timer = RequestTimer::start();
    let stats = state.tasks.stats().await?;
    Ok(Json(timer.success(stats)))
}
