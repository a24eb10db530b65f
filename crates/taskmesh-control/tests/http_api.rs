#![allow(clippy::unwrap_used, clippy::expect_used)]
//! HTTP API tests for the control plane.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use taskmesh_control::{ControlPlane, ControlPlaneConfig, ReasonerOrchestrator};
use taskmesh_core::{
    AgentDescriptor, Completion, Reasoner, TaskmeshResult, ToolSpec,
};
use taskmesh_queue::{InMemoryQueue, MessageQueue};
use uuid::Uuid;

/// With no services registered every submission escalates on the
/// spot, so the reasoner behind the router is never consulted.
struct StaticReasoner;

#[async_trait]
impl Reasoner for StaticReasoner {
    async fn complete(&self, _prompt: &str, _tools: &[ToolSpec]) -> TaskmeshResult<Completion> {
        Ok(Completion::Answer("NEED_HUMAN".into()))
    }
}

async fn start_test_server() -> (String, Arc<ControlPlane>) {
    let queue: Arc<dyn MessageQueue> = Arc::new(InMemoryQueue::new());
    let orchestrator = Arc::new(ReasonerOrchestrator::new(Arc::new(StaticReasoner)));
    let plane = Arc::new(ControlPlane::new(
        queue,
        orchestrator,
        ControlPlaneConfig::default(),
    ));

    let app = taskmesh_control::http::build(Arc::clone(&plane));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://{addr}"), plane)
}

#[tokio::test]
async fn health_reports_ok() {
    let (base, _plane) = start_test_server().await;

    let response = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "taskmesh-control");
}

#[tokio::test]
async fn create_task_is_accepted_and_escalates_with_no_services() {
    let (base, _plane) = start_test_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/tasks"))
        .json(&serde_json::json!({"input": "what is the status of order 5?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);

    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["task_id"].as_str().unwrap().parse::<Uuid>().is_ok());
    assert_eq!(body["status"], "needs_human");
}

#[tokio::test]
async fn create_task_rejects_blank_input() {
    let (base, _plane) = start_test_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/tasks"))
        .json(&serde_json::json!({"input": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn tasks_can_be_fetched_and_listed() {
    let (base, _plane) = start_test_server().await;
    let client = reqwest::Client::new();

    let created: serde_json::Value = client
        .post(format!("{base}/tasks"))
        .json(&serde_json::json!({"input": "check machine 7"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let task_id = created["task_id"].as_str().unwrap().to_string();

    let response = client
        .get(format!("{base}/tasks/{task_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let task: serde_json::Value = response.json().await.unwrap();
    assert_eq!(task["input"], "check machine 7");
    assert_eq!(task["origin"], "http");
    assert_eq!(task["status"], "needs_human");

    let listed: serde_json::Value = client
        .get(format!("{base}/tasks"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], task_id.as_str());
}

#[tokio::test]
async fn unknown_task_is_not_found() {
    let (base, _plane) = start_test_server().await;

    let response = reqwest::get(format!("{base}/tasks/{}", Uuid::new_v4()))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn agents_lists_the_registry() {
    let (base, plane) = start_test_server().await;

    plane
        .registry()
        .register(AgentDescriptor::new(
            "orders",
            "Useful for order lookups.",
        ))
        .unwrap();
    plane
        .registry()
        .register(AgentDescriptor::new(
            "machines",
            "Useful for machine status.",
        ))
        .unwrap();

    let agents: serde_json::Value = reqwest::get(format!("{base}/agents"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let agents = agents.as_array().unwrap();
    assert_eq!(agents.len(), 2);
    assert_eq!(agents[0]["service_name"], "machines");
    assert_eq!(agents[1]["service_name"], "orders");
}

#[tokio::test]
async fn cancel_returns_terminal_tasks_unchanged() {
    let (base, _plane) = start_test_server().await;
    let client = reqwest::Client::new();

    let created: serde_json::Value = client
        .post(format!("{base}/tasks"))
        .json(&serde_json::json!({"input": "cancel me"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let task_id = created["task_id"].as_str().unwrap().to_string();

    let response = client
        .post(format!("{base}/tasks/{task_id}/cancel"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let task: serde_json::Value = response.json().await.unwrap();
    assert_eq!(task["status"], "needs_human");

    let response = client
        .post(format!("{base}/tasks/{}/cancel", Uuid::new_v4()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}
