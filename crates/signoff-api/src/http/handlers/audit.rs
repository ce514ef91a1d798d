//! Audit log handler.

use axum::Json;
use axum::extract::{Query, State};

use signoff_types::audit::AuditLogEntry;
use signoff_types::id::InstanceId;

use crate::http::error::AppError;
use crate::http::extractors::auth::CurrentActor;
use crate::http::extractors::query::{AuditQuery, parse_id};
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// Entries returned when no `limit` is given.
const DEFAULT_LIMIT: i64 = 100;

/// GET /api/v1/audit
///
/// With `request_id`, the full history of that request in write order;
/// otherwise the most recent entries, newest first.
pub async fn list_audit(
    State(state): State<AppState>,
    _actor: CurrentActor,
    Query(query): Query<AuditQuery>,
) -> Result<Json<ApiResponse<Vec<AuditLogEntry>>>, AppError> {
    let timer = RequestTimer::start();

    let entries = match &query.request_id {
        Some(raw) => {
            let id: InstanceId = parse_id("request_id", raw)?;
            state.audit.list_by_instance(&id).await?
        }
        None => {
            state
                .audit
                .list_recent(query.limit.unwrap_or(DEFAULT_LIMIT))
                .await?
        }
    };

    Ok(Json(timer.success(entries)))
}
