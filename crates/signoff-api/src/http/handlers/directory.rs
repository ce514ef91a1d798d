//! Reference data: roles, permissions and the current actor.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use signoff_types::directory::{Permission, Role};
use signoff_types::id::{PermissionId, RoleId, UserId};

use crate::http::error::AppError;
use crate::http::extractors::auth::CurrentActor;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// GET /api/v1/roles
pub async fn list_roles(
    State(state): State<AppState>,
    _actor: CurrentActor,
) -> Result<Json<ApiResponse<Vec<Role>>>, AppError> {
    let timer = RequestTimer::start();
    let roles = state.directory.list_roles().await?;
    Ok(Json(timer.success(roles)))
}

/// GET /api/v1/permissions
pub async fn list_permissions(
    State(state): State<AppState>,
    _actor: CurrentActor,
) -> Result<Json<ApiResponse<Vec<Permission>>>, AppError> {
    let timer = RequestTimer::start();
    let permissions = state.directory.list_permissions().await?;
    Ok(Json(timer.success(permissions)))
}

#[derive(Debug, Serialize)]
pub struct Me {
    pub id: UserId,
    pub username: String,
    pub full_name: String,
    pub role_ids: Vec<RoleId>,
    pub roles: Vec<String>,
    pub permission_ids: Vec<PermissionId>,
    pub is_admin: bool,
}

/// GET /api/v1/users/me
pub async fn me(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<ApiResponse<Me>>, AppError> {
    let timer = RequestTimer::start();
    let user = state.directory.user_by_username(&actor.username).await?;
    let roles = state
        .directory
        .list_roles()
        .await?
        .into_iter()
        .filter(|r| actor.has_role(&r.id))
        .map(|r| r.name)
        .collect();

    Ok(Json(timer.success(Me {
        id: actor.user_id,
        username: actor.username,
        full_name: user.full_name,
        role_ids: actor.role_ids,
        roles,
        permission_ids: actor.permission_ids,
        is_admin: actor.is_admin,
    })))
}
