//! HTTP surface of the control plane.
//!
//! Thin REST layer over [`ControlPlane`]: submit a task, inspect
//! tasks and agents, cancel. All state changes still flow through the
//! same task locks as the queue consumer.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use taskmesh_core::{AgentDescriptor, Task, TaskStatus};

use crate::plane::ControlPlane;

/// Builds the control plane router.
pub fn build(plane: Arc<ControlPlane>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/agents", get(list_agents))
        .route("/tasks", post(create_task).get(list_tasks))
        .route("/tasks/{id}", get(get_task))
        .route("/tasks/{id}/cancel", post(cancel_task))
        .with_state(plane)
}

#[derive(Debug, Deserialize)]
struct CreateTaskRequest {
    input: String,
}

#[derive(Debug, Serialize)]
struct CreateTaskResponse {
    task_id: Uuid,
    status: TaskStatus,
}

async fn health() -> impl IntoResponse {
    serde_json::json!({"status": "ok", "service": "taskmesh-control"}).to_string()
}

async fn create_task(
    State(plane): State<Arc<ControlPlane>>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<CreateTaskResponse>), (StatusCode, String)> {
    let input = request.input.trim().to_string();
    if input.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "input must not be empty".into()));
    }
    let task = plane
        .submit(input, "http")
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CreateTaskResponse {
            task_id: task.id,
            status: task.status,
        }),
    ))
}

async fn get_task(
    State(plane): State<Arc<ControlPlane>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, (StatusCode, String)> {
    match plane.task(id).await {
        Some(task) => Ok(Json(task)),
        None => Err((StatusCode::NOT_FOUND, format!("unknown task {id}"))),
    }
}

async fn list_tasks(State(plane): State<Arc<ControlPlane>>) -> Json<Vec<Task>> {
    Json(plane.tasks().await)
}

async fn list_agents(State(plane): State<Arc<ControlPlane>>) -> Json<Vec<AgentDescriptor>> {
    Json(plane.registry().list())
}

async fn cancel_task(
    State(plane): State<Arc<ControlPlane>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, (StatusCode, String)> {
    plane
        .cancel(id)
        .await
        .map(Json)
        .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))
}
