//! HTTP read surface for the result consumer.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use taskmesh_core::Task;

use crate::service::TaskResultService;

/// Builds the result consumer router.
pub fn build(service: Arc<TaskResultService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/results", get(list_results))
        .route("/results/{id}", get(get_result))
        .with_state(service)
}

async fn health(State(service): State<Arc<TaskResultService>>) -> impl IntoResponse {
    let buffered = service.buffered().await;
    let status = if buffered > 0 { "degraded" } else { "ok" };
    serde_json::json!({
        "status": status,
        "service": "taskmesh-human",
        "buffered": buffered,
    })
    .to_string()
}

async fn list_results(State(service): State<Arc<TaskResultService>>) -> Json<Vec<Task>> {
    Json(service.results().await)
}

async fn get_result(
    State(service): State<Arc<TaskResultService>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, (StatusCode, String)> {
    match service.result(id).await {
        Some(task) => Ok(Json(task)),
        None => Err((StatusCode::NOT_FOUND, format!("unknown task {id}"))),
    }
}
