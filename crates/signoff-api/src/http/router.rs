//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/` except `/health`.
//! Middleware: CORS, request tracing.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Workflow definitions
        .route(
            "/workflows",
            get(handlers::workflow::list_workflows).post(handlers::workflow::create_workflow),
        )
        .route(
            "/workflows/{id}",
            get(handlers::workflow::get_workflow).delete(handlers::workflow::delete_workflow),
        )
        .route(
            "/workflows/{id}/activate",
            post(handlers::workflow::activate_workflow),
        )
        .route(
            "/workflows/{id}/deactivate",
            post(handlers::workflow::deactivate_workflow),
        )
        // Request instances
        .route(
            "/requests",
            get(handlers::request::list_requests).post(handlers::request::start_request),
        )
        .route("/requests/my-tasks", get(handlers::request::my_tasks))
        .route("/requests/stats", get(handlers::request::request_stats))
        .route("/requests/{id}", get(handlers::request::get_request))
        .route(
            "/requests/{id}/process",
            post(handlers::request::process_request),
        )
        .route(
            "/workflow-instances/{id}/decision",
            post(handlers::request::decide_alias),
        )
        // Reference data
        .route("/roles", get(handlers::directory::list_roles))
        .route("/permissions", get(handlers::directory::list_permissions))
        .route("/users/me", get(handlers::directory::me))
        // Audit and administration
        .route("/audit", get(handlers::audit::list_audit))
        .route("/admin/stats", get(handlers::admin::admin_stats));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - liveness check with a database ping, no auth required.
async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, axum::Json<serde_json::Value>) {
    let (status, database) = match state.db_pool.ping().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::warn!("health check database ping failed: {e}");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };
    let body = serde_json::json!({
        "status": if status == StatusCode::OK { "ok" } else { "degraded" },
        "database": database,
        "version": env!("CARGO_PKG_VERSION"),
    });
    (status, axum::Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use signoff_core::clock::SystemClock;
    use signoff_infra::config::database_url;
    use signoff_infra::sqlite::pool::DatabasePool;
    use signoff_types::config::GlobalConfig;
    use signoff_types::directory::{CreateRoleRequest, CreateUserRequest};

    struct TestApp {
        router: Router,
        state: AppState,
        admin: String,
        manager: String,
        finance: String,
        requester: String,
        manager_role: String,
        finance_role: String,
    }

    async fn user_with_token(state: &AppState, username: &str, roles: &[&str]) -> String {
        state
            .directory
            .create_user(CreateUserRequest {
                username: username.to_string(),
                full_name: None,
                role_names: roles.iter().map(|r| r.to_string()).collect(),
            })
            .await
            .unwrap();
        state.directory.issue_token(username, "test").await.unwrap()
    }

    async fn test_app() -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::new(&database_url(dir.path())).await.unwrap();
        let data_dir = dir.path().to_path_buf();
        // Leak tempdir so it lives for the test
        std::mem::forget(dir);

        let state = AppState::from_parts(pool, GlobalConfig::default(), data_dir, Arc::new(SystemClock));

        let mut role_ids = Vec::new();
        for name in ["admin", "Manager", "Finance"] {
            let role = state
                .directory
                .create_role(CreateRoleRequest {
                    name: name.to_string(),
                    description: None,
                    permission_names: vec![],
                })
                .await
                .unwrap();
            role_ids.push(role.id.to_string());
        }

        TestApp {
            router: build_router(state.clone()),
            admin: user_with_token(&state, "root", &["admin"]).await,
            manager: user_with_token(&state, "maria", &["Manager"]).await,
            finance: user_with_token(&state, "fred", &["Finance"]).await,
            requester: user_with_token(&state, "rita", &[]).await,
            manager_role: role_ids[1].clone(),
            finance_role: role_ids[2].clone(),
            state,
        }
    }

    async fn call(
        app: &TestApp,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let resp = app.router.clone().oneshot(request).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn expense_claim(app: &TestApp) -> Value {
        json!({
            "name": "Expense claim",
            "steps": [
                {"step_order": 1, "name": "Manager approval", "required_role_id": app.manager_role, "sla_hours": 24},
                {"step_order": 2, "name": "Finance approval", "required_role_id": app.finance_role, "sla_hours": 48}
            ],
            "transitions": [
                {"from_step_order": 1, "outcome": "APPROVED", "to_step_order": 2},
                {"from_step_order": 1, "outcome": "REJECTED", "to_step_order": null},
                {"from_step_order": 2, "outcome": "APPROVED", "to_step_order": null},
                {"from_step_order": 2, "outcome": "REJECTED", "to_step_order": null}
            ]
        })
    }

    async fn create_workflow(app: &TestApp) -> String {
        let (status, body) = call(
            app,
            "POST",
            "/api/v1/workflows",
            Some(&app.admin),
            Some(expense_claim(app)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn start(app: &TestApp, workflow_id: &str) -> String {
        let (status, body) = call(
            app,
            "POST",
            "/api/v1/requests",
            Some(&app.requester),
            Some(json!({"workflow_id": workflow_id, "request_data": {"amount": 420}})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["status"], "IN_PROGRESS");
        body["data"]["id"].as_str().unwrap().to_string()
    }

    fn error_code(body: &Value) -> &str {
        body["errors"][0]["code"].as_str().unwrap_or_default()
    }

    #[tokio::test]
    async fn health_needs_no_token() {
        let app = test_app().await;
        let (status, body) = call(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], "ok");
    }

    #[tokio::test]
    async fn missing_or_bad_token_is_unauthorized() {
        let app = test_app().await;
        let (status, body) = call(&app, "GET", "/api/v1/workflows", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&body), "UNAUTHORIZED");

        let (status, _) = call(&app, "GET", "/api/v1/workflows", Some("sgn_bogus"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn two_step_approval_over_http() {
        let app = test_app().await;
        let workflow_id = create_workflow(&app).await;
        let request_id = start(&app, &workflow_id).await;
        let process = format!("/api/v1/requests/{request_id}/process");

        // Finance cannot act on the manager step.
        let (status, body) = call(
            &app,
            "POST",
            &process,
            Some(&app.finance),
            Some(json!({"outcome": "APPROVED"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(error_code(&body), "FORBIDDEN");

        let (_, tasks) = call(&app, "GET", "/api/v1/requests/my-tasks", Some(&app.manager), None).await;
        assert_eq!(tasks["data"].as_array().unwrap().len(), 1);

        let (status, body) = call(
            &app,
            "POST",
            &process,
            Some(&app.manager),
            Some(json!({"outcome": "APPROVED", "context": {"note": "fine"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["current_step_order"], 2);
        assert_eq!(body["data"]["version"], 2);

        let alias = format!("/api/v1/workflow-instances/{request_id}/decision");
        let (status, body) = call(
            &app,
            "POST",
            &alias,
            Some(&app.finance),
            Some(json!({"action": "approved", "comment": "paid"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "COMPLETED");
        assert!(body["data"]["current_step_order"].is_null());

        // Finished requests accept no further decisions.
        let (status, body) = call(
            &app,
            "POST",
            &process,
            Some(&app.admin),
            Some(json!({"outcome": "APPROVED"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_code(&body), "CONFLICT");

        let (_, audit) = call(
            &app,
            "GET",
            &format!("/api/v1/audit?request_id={request_id}"),
            Some(&app.requester),
            None,
        )
        .await;
        let actions: Vec<&str> = audit["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["action"].as_str().unwrap())
            .collect();
        assert_eq!(actions, vec!["INSTANCE_STARTED", "STEP_DECIDED", "STEP_DECIDED"]);

        let (_, stats) = call(&app, "GET", "/api/v1/admin/stats", Some(&app.admin), None).await;
        assert_eq!(stats["data"]["users"], 4);
        assert_eq!(stats["data"]["workflows"], 1);
        assert_eq!(stats["data"]["requests"]["completed"], 1);
    }

    #[tokio::test]
    async fn stale_version_is_conflict() {
        let app = test_app().await;
        let workflow_id = create_workflow(&app).await;
        let request_id = start(&app, &workflow_id).await;

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/v1/requests/{request_id}/process"),
            Some(&app.manager),
            Some(json!({"outcome": "APPROVED", "version": 7})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["errors"][0]["message"].as_str().unwrap().contains("stale"));

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/v1/workflow-instances/{request_id}/decision"),
            Some(&app.manager),
            Some(json!({"action": "approved", "version": 7})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_code(&body), "CONFLICT");
    }

    #[tokio::test]
    async fn workflow_writes_require_admin() {
        let app = test_app().await;
        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/workflows",
            Some(&app.manager),
            Some(expense_claim(&app)),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(error_code(&body), "FORBIDDEN");

        let (status, _) = call(&app, "GET", "/api/v1/admin/stats", Some(&app.manager), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn inactive_workflow_cannot_start() {
        let app = test_app().await;
        let workflow_id = create_workflow(&app).await;
        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/v1/workflows/{workflow_id}/deactivate"),
            Some(&app.admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["is_active"], false);

        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/requests",
            Some(&app.requester),
            Some(json!({"workflow_id": workflow_id})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_code(&body), "INACTIVE_DEFINITION");
    }

    #[tokio::test]
    async fn invalid_definition_and_ids_are_bad_requests() {
        let app = test_app().await;
        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/workflows",
            Some(&app.admin),
            Some(json!({"name": "Empty", "steps": [], "transitions": []})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&body), "VALIDATION_ERROR");

        let (status, _) = call(&app, "GET", "/api/v1/requests/not-a-uuid", Some(&app.admin), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn me_reports_roles() {
        let app = test_app().await;
        let (status, body) = call(&app, "GET", "/api/v1/users/me", Some(&app.manager), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["username"], "maria");
        assert_eq!(body["data"]["roles"], json!(["Manager"]));
        assert_eq!(body["data"]["is_admin"], false);
        assert_eq!(app.state.directory.admin_role(), "admin");
    }
}
