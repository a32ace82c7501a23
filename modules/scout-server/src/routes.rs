use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;
use uuid::Uuid;

use scout_common::ScoutError;
use scout_runner::Executor;

pub struct AppState {
    pub pool: PgPool,
    pub executor: Arc<Executor>,
}

pub fn router(state: Arc<AppState>) -> Router {
    // The configuration UI calls the executor endpoint cross-origin;
    // preflight must succeed.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/executor/run", post(run_executor).get(run_executor))
        .route("/scouts/{scout_id}/executions", get(list_executions))
        .route("/executions/{execution_id}/steps", get(list_steps))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunParams {
    scout_id: Option<Uuid>,
}

/// Executor entry. Accepts `scoutId` as a query parameter or a JSON body
/// `{"scoutId": "..."}`; the query parameter wins when both are present.
async fn run_executor(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RunParams>,
    body: Option<Json<RunParams>>,
) -> impl IntoResponse {
    let scout_id = query
        .scout_id
        .or_else(|| body.and_then(|Json(b)| b.scout_id));

    let Some(scout_id) = scout_id else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "scoutId is required"})),
        );
    };

    match state.executor.execute_scout(scout_id).await {
        Ok(success) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "scoutId": success.scout_id,
                "title": success.title,
            })),
        ),
        Err(ScoutError::ExecutionInProgress { execution_id }) => (
            StatusCode::CONFLICT,
            Json(json!({
                "success": false,
                "error": "already in progress",
                "runningExecutionId": execution_id,
            })),
        ),
        Err(err) => {
            error!(scout_id = %scout_id, error = %err, "Executor invocation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": err.to_string()})),
            )
        }
    }
}

/// Run history for a scout, newest first. Embeddings are internal and
/// stripped from the payload.
async fn list_executions(
    State(state): State<Arc<AppState>>,
    Path(scout_id): Path<Uuid>,
) -> impl IntoResponse {
    match scout_store::list_executions(&state.pool, scout_id, 50).await {
        Ok(executions) => {
            let rows: Vec<serde_json::Value> = executions
                .into_iter()
                .map(|e| {
                    json!({
                        "id": e.id,
                        "scoutId": e.scout_id,
                        "status": e.status,
                        "createdAt": e.created_at,
                        "completedAt": e.completed_at,
                        "errorMessage": e.error_message,
                        "resultsSummary": e.results_summary,
                        "summaryText": e.summary_text,
                        "duplicateOf": e.duplicate_of,
                    })
                })
                .collect();
            (StatusCode::OK, Json(json!({"executions": rows})))
        }
        Err(e) => {
            error!(scout_id = %scout_id, error = %e, "Failed to list executions");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to list executions"})),
            )
        }
    }
}

async fn list_steps(
    State(state): State<Arc<AppState>>,
    Path(execution_id): Path<Uuid>,
) -> impl IntoResponse {
    match scout_store::list_steps(&state.pool, execution_id).await {
        Ok(steps) => (StatusCode::OK, Json(json!({"steps": steps}))),
        Err(e) => {
            error!(execution_id = %execution_id, error = %e, "Failed to list steps");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to list steps"})),
            )
        }
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}
