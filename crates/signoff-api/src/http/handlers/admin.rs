//! Administrative summary endpoint.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::http::error::AppError;
use crate::http::extractors::auth::CurrentActor;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AdminStats {
    pub users: u64,
    pub workflows: u64,
    pub requests: RequestCounts,
    pub sla_breaches: u64,
}

#[derive(Debug, Serialize)]
pub struct RequestCounts {
    pub total: u64,
    pub active: u64,
    pub completed: u64,
    pub rejected: u64,
    pub escalated: u64,
}

/// GET /api/v1/admin/stats
pub async fn admin_stats(
    State(state): State<AppState>,
    actor: CurrentActor,
) -> Result<Json<ApiResponse<AdminStats>>, AppError> {
    let timer = RequestTimer::start();
    actor.require_admin()?;

    let dashboard = state.tasks.stats().await?;
    let stats = AdminStats {
        users: state.directory.count_users().await?,
        workflows: state.definitions.count().await?,
        requests: RequestCounts {
            total: dashboard.active + dashboard.completed + dashboard.rejected,
            active: dashboard.active,
            completed: dashboard.completed,
            rejected: dashboard.rejected,
            escalated: dashboard.escalated,
        },
        sla_breaches: state.instances.count_breaches().await?,
    };

    Ok(Json(timer.success(stats)))
}
