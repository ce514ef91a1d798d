//! Workflow definition handlers.
//!
//! Reads are open to any authenticated actor; creating, deleting and
//! toggling definitions requires the admin role.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use signoff_types::definition::{CreateDefinitionRequest, WorkflowDefinition};
use signoff_types::id::DefinitionId;

use crate::http::error::AppError;
use crate::http::extractors::auth::CurrentActor;
use crate::http::extractors::query::parse_id;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

type WorkflowResponse = Json<ApiResponse<WorkflowDefinition>>;

/// GET /api/v1/workflows
pub async fn list_workflows(
    State(state): State<AppState>,
    _actor: CurrentActor,
) -> Result<Json<ApiResponse<Vec<WorkflowDefinition>>>, AppError> {
    let timer = RequestTimer::start();
    let workflows = state.definitions.list().await?;
    Ok(Json(timer.success(workflows).with_link("self", "/api/v1/workflows")))
}

/// POST /api/v1/workflows
pub async fn create_workflow(
    State(state): State<AppState>,
    actor: CurrentActor,
    Json(body): Json<CreateDefinitionRequest>,
) -> Result<(StatusCode, WorkflowResponse), AppError> {
    let timer = RequestTimer::start();
    actor.require_admin()?;

    let workflow = state.definitions.create(body, Some(actor.0.user_id)).await?;
    let href = format!("/api/v1/workflows/{}", workflow.id);
    Ok((StatusCode::CREATED, Json(timer.success(workflow).with_link("self", &href))))
}

/// GET /api/v1/workflows/{id}
pub async fn get_workflow(
    State(state): State<AppState>,
    _actor: CurrentActor,
    Path(id): Path<String>,
) -> Result<WorkflowResponse, AppError> {
    let timer = RequestTimer::start();
    let id: DefinitionId = parse_id("workflow id", &id)?;
    let workflow = state.definitions.get(&id).await?;
    let href = format!("/api/v1/workflows/{id}");
    Ok(Json(timer.success(workflow).with_link("self", &href)))
}

/// DELETE /api/v1/workflows/{id}
///
/// Refused with 409 while an open request still references the workflow.
pub async fn delete_workflow(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let timer = RequestTimer::start();
    actor.require_admin()?;
    let id: DefinitionId = parse_id("workflow id", &id)?;

    state.definitions.delete(&id, Some(actor.0.user_id)).await?;
    Ok(Json(timer.success(serde_json::json!({"deleted": true, "id": id}))))
}

/// POST /api/v1/workflows/{id}/activate
pub async fn activate_workflow(
    state: State<AppState>,
    actor: CurrentActor,
    id: Path<String>,
) -> Result<WorkflowResponse, AppError> {
    set_active(state, actor, id, true).await
}

/// POST /api/v1/workflows/{id}/deactivate
pub async fn deactivate_workflow(
    state: State<AppState>,
    actor: CurrentActor,
    id: Path<String>,
) -> Result<WorkflowResponse, AppError> {
    set_active(state, actor, id, false).await
}

async fn set_active(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path(id): Path<String>,
    is_active: bool,
) -> Result<WorkflowResponse, AppError> {
    let timer = RequestTimer::start();
    actor.require_admin()?;
    let id: DefinitionId = parse_id("workflow id", &id)?;

    let workflow = state
        .definitions
        .set_active(&id, is_active, Some(actor.0.user_id))
        .await?;
    let href = format!("/api/v1/workflows/{id}");
    Ok(Json(timer.success(workflow).with_link("self", &href)))
}
