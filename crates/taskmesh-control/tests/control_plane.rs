#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Control plane integration tests.
//!
//! Everything here goes through a real in-memory queue: scripted
//! agents on their own topics, a scripted orchestrator, and a
//! subscription on the human topic to observe what leaves the mesh.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::timeout;

use taskmesh_control::{
    ControlPlane, ControlPlaneConfig, Orchestrator, ReasonerOrchestrator, RoutingDecision,
};
use taskmesh_core::{
    topics, AgentDescriptor, Completion, Envelope, MessageKind, Reasoner, RegistrationAck,
    RegistrationPayload, StepOutcome, Task, TaskRequestPayload, TaskResultPayload, TaskStatus,
    TaskmeshResult, ToolSpec,
};
use taskmesh_queue::{InMemoryQueue, MessageQueue, Subscription};
use uuid::Uuid;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Scripted collaborators
// ---------------------------------------------------------------------------

/// Pops decisions from a fixed script; escalates once it runs dry.
struct ScriptedOrchestrator {
    script: Mutex<VecDeque<RoutingDecision>>,
    calls: AtomicU32,
}

impl ScriptedOrchestrator {
    fn new(script: Vec<RoutingDecision>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Orchestrator for ScriptedOrchestrator {
    async fn decide(
        &self,
        _task: &Task,
        _candidates: &[AgentDescriptor],
    ) -> TaskmeshResult<RoutingDecision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| RoutingDecision::Escalate("script exhausted".into())))
    }
}

/// A reasoner the test expects to never be consulted.
struct PanicReasoner;

#[async_trait]
impl Reasoner for PanicReasoner {
    async fn complete(&self, _prompt: &str, _tools: &[ToolSpec]) -> TaskmeshResult<Completion> {
        unreachable!("router must not consult the reasoner")
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn start_plane(
    queue: &Arc<dyn MessageQueue>,
    orchestrator: Arc<dyn Orchestrator>,
    config: ControlPlaneConfig,
) -> Arc<ControlPlane> {
    let plane = Arc::new(ControlPlane::new(Arc::clone(queue), orchestrator, config));
    tokio::spawn(Arc::clone(&plane).run());
    // Let the consumer subscribe before anything is published.
    tokio::time::sleep(Duration::from_millis(50)).await;
    plane
}

/// Registers a scripted agent that answers every request with the
/// same output after an optional delay. Resolves once the control
/// plane has acked the registration.
fn spawn_agent(
    queue: &Arc<dyn MessageQueue>,
    name: &'static str,
    output: &'static str,
    outcome: StepOutcome,
    delay: Duration,
    replies_per_request: u32,
) -> oneshot::Receiver<()> {
    let queue = Arc::clone(queue);
    let (ready_tx, ready_rx) = oneshot::channel();
    tokio::spawn(async move {
        let mut sub = queue.subscribe(name).await.unwrap();
        let payload = RegistrationPayload {
            descriptor: AgentDescriptor::new(name, "scripted test agent"),
            deregister: false,
        };
        queue
            .publish(Envelope::registration(name, &payload).unwrap())
            .await
            .unwrap();
        loop {
            let envelope = sub.recv().await.unwrap();
            if envelope.kind == MessageKind::Registration {
                let ack: RegistrationAck = envelope.payload_as().unwrap();
                assert!(ack.accepted);
                break;
            }
        }
        let _ = ready_tx.send(());

        loop {
            let envelope = sub.recv().await.unwrap();
            if envelope.kind != MessageKind::TaskRequest {
                continue;
            }
            let request: TaskRequestPayload = envelope.payload_as().unwrap();
            tokio::time::sleep(delay).await;
            let result = TaskResultPayload {
                task_id: request.task_id,
                step: request.step,
                output: output.into(),
                outcome,
            };
            for _ in 0..replies_per_request {
                queue
                    .publish(Envelope::task_result(name, topics::CONTROL_PLANE, &result).unwrap())
                    .await
                    .unwrap();
            }
        }
    });
    ready_rx
}

async fn recv_task(sub: &mut Subscription) -> Task {
    timeout(RECV_TIMEOUT, async {
        loop {
            let envelope = sub.recv().await.unwrap();
            if envelope.kind == MessageKind::TaskResult {
                return envelope.payload_as::<Task>().unwrap();
            }
        }
    })
    .await
    .expect("timed out waiting for a finalized task")
}

async fn assert_no_more_tasks(sub: &mut Subscription) {
    let extra = timeout(Duration::from_millis(200), sub.recv()).await;
    assert!(extra.is_err(), "unexpected extra message on human topic");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn task_round_trips_to_completion() {
    let queue: Arc<dyn MessageQueue> = Arc::new(InMemoryQueue::new());
    let mut human = queue.subscribe(topics::HUMAN).await.unwrap();

    let orchestrator = Arc::new(ScriptedOrchestrator::new(vec![
        RoutingDecision::Assign("orders".into()),
        RoutingDecision::Complete,
    ]));
    let plane = start_plane(
        &queue,
        Arc::clone(&orchestrator) as _,
        ControlPlaneConfig::default(),
    )
    .await;
    spawn_agent(
        &queue,
        "orders",
        "There are two new orders in the system.",
        StepOutcome::Answer,
        Duration::ZERO,
        1,
    )
    .await
    .unwrap();

    let task = plane
        .submit("what is the status of order 5?", "test")
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Routed);
    assert_eq!(task.history.len(), 1);

    let finished = recv_task(&mut human).await;
    assert_eq!(finished.id, task.id);
    assert_eq!(finished.status, TaskStatus::Completed);
    assert_eq!(finished.history.len(), 1);
    assert_eq!(
        finished.history[0].output.as_deref(),
        Some("There are two new orders in the system.")
    );
    assert_eq!(orchestrator.calls(), 2);

    let stored = plane.task(task.id).await.unwrap();
    assert_eq!(stored.status, TaskStatus::Completed);
}

#[tokio::test]
async fn queue_submissions_are_idempotent_per_task_id() {
    let queue: Arc<dyn MessageQueue> = Arc::new(InMemoryQueue::new());
    let mut human = queue.subscribe(topics::HUMAN).await.unwrap();

    let orchestrator = Arc::new(ScriptedOrchestrator::new(vec![
        RoutingDecision::Assign("orders".into()),
        RoutingDecision::Complete,
    ]));
    let plane = start_plane(
        &queue,
        Arc::clone(&orchestrator) as _,
        ControlPlaneConfig::default(),
    )
    .await;
    spawn_agent(
        &queue,
        "orders",
        "two new orders",
        StepOutcome::Answer,
        Duration::ZERO,
        1,
    )
    .await
    .unwrap();

    let task_id = Uuid::new_v4();
    let submission = TaskRequestPayload {
        task_id,
        step: 0,
        input: "order status?".into(),
    };
    let envelope =
        Envelope::task_request("external", topics::CONTROL_PLANE, &submission).unwrap();
    queue.publish(envelope.clone()).await.unwrap();
    queue.publish(envelope).await.unwrap();

    let finished = recv_task(&mut human).await;
    assert_eq!(finished.id, task_id);
    assert_eq!(finished.status, TaskStatus::Completed);
    assert_eq!(finished.history.len(), 1);

    assert_no_more_tasks(&mut human).await;
    assert_eq!(plane.tasks().await.len(), 1);
}

#[tokio::test]
async fn empty_registry_escalates_without_dispatching() {
    let queue: Arc<dyn MessageQueue> = Arc::new(InMemoryQueue::new());
    let mut human = queue.subscribe(topics::HUMAN).await.unwrap();

    // The real classifier short-circuits an empty registry, so the
    // reasoner behind it must never run.
    let orchestrator = Arc::new(ReasonerOrchestrator::new(Arc::new(PanicReasoner)));
    let plane = start_plane(&queue, orchestrator as _, ControlPlaneConfig::default()).await;

    let task = plane.submit("anything at all", "test").await.unwrap();
    assert_eq!(task.status, TaskStatus::NeedsHuman);

    let finished = recv_task(&mut human).await;
    assert_eq!(finished.id, task.id);
    assert_eq!(finished.status, TaskStatus::NeedsHuman);
    assert!(finished.history.is_empty());
}

#[tokio::test]
async fn agent_handoff_escalates_the_task() {
    let queue: Arc<dyn MessageQueue> = Arc::new(InMemoryQueue::new());
    let mut human = queue.subscribe(topics::HUMAN).await.unwrap();

    let orchestrator = Arc::new(ScriptedOrchestrator::new(vec![RoutingDecision::Assign(
        "support".into(),
    )]));
    let plane = start_plane(
        &queue,
        Arc::clone(&orchestrator) as _,
        ControlPlaneConfig::default(),
    )
    .await;
    spawn_agent(
        &queue,
        "support",
        "I cannot resolve this",
        StepOutcome::NeedsHuman,
        Duration::ZERO,
        1,
    )
    .await
    .unwrap();

    let task = plane.submit("escalate me", "test").await.unwrap();
    let finished = recv_task(&mut human).await;

    assert_eq!(finished.id, task.id);
    assert_eq!(finished.status, TaskStatus::NeedsHuman);
    assert_eq!(finished.history.len(), 1);
    assert_eq!(
        finished.history[0].output.as_deref(),
        Some("I cannot resolve this")
    );
    // The handoff skips the router: one decision to assign, none after.
    assert_eq!(orchestrator.calls(), 1);
}

#[tokio::test]
async fn duplicate_results_close_exactly_one_step() {
    let queue: Arc<dyn MessageQueue> = Arc::new(InMemoryQueue::new());
    let mut human = queue.subscribe(topics::HUMAN).await.unwrap();

    let orchestrator = Arc::new(ScriptedOrchestrator::new(vec![
        RoutingDecision::Assign("orders".into()),
        RoutingDecision::Complete,
    ]));
    let plane = start_plane(
        &queue,
        Arc::clone(&orchestrator) as _,
        ControlPlaneConfig::default(),
    )
    .await;
    // Publishes its result three times per request.
    spawn_agent(
        &queue,
        "orders",
        "two new orders",
        StepOutcome::Answer,
        Duration::ZERO,
        3,
    )
    .await
    .unwrap();

    let task = plane.submit("order status?", "test").await.unwrap();
    let finished = recv_task(&mut human).await;

    assert_eq!(finished.id, task.id);
    assert_eq!(finished.status, TaskStatus::Completed);
    assert_eq!(finished.history.len(), 1);
    assert_no_more_tasks(&mut human).await;
    assert_eq!(orchestrator.calls(), 2);
}

#[tokio::test]
async fn result_from_the_wrong_agent_is_discarded() {
    let queue: Arc<dyn MessageQueue> = Arc::new(InMemoryQueue::new());
    let mut human = queue.subscribe(topics::HUMAN).await.unwrap();

    let orchestrator = Arc::new(ScriptedOrchestrator::new(vec![
        RoutingDecision::Assign("orders".into()),
        RoutingDecision::Complete,
    ]));
    let plane = start_plane(&queue, orchestrator as _, ControlPlaneConfig::default()).await;
    // The real agent answers slowly, leaving a window for the
    // impostor's result to land first.
    spawn_agent(
        &queue,
        "orders",
        "the genuine answer",
        StepOutcome::Answer,
        Duration::from_millis(150),
        1,
    )
    .await
    .unwrap();

    let task = plane.submit("order status?", "test").await.unwrap();

    let forged = TaskResultPayload {
        task_id: task.id,
        step: 0,
        output: "forged answer".into(),
        outcome: StepOutcome::Answer,
    };
    queue
        .publish(Envelope::task_result("impostor", topics::CONTROL_PLANE, &forged).unwrap())
        .await
        .unwrap();

    let finished = recv_task(&mut human).await;
    assert_eq!(finished.status, TaskStatus::Completed);
    assert_eq!(
        finished.history[0].output.as_deref(),
        Some("the genuine answer")
    );
}

#[tokio::test]
async fn hop_budget_forces_escalation() {
    let queue: Arc<dyn MessageQueue> = Arc::new(InMemoryQueue::new());
    let mut human = queue.subscribe(topics::HUMAN).await.unwrap();

    let orchestrator = Arc::new(ScriptedOrchestrator::new(vec![
        RoutingDecision::Assign("orders".into()),
        RoutingDecision::Assign("orders".into()),
        RoutingDecision::Assign("orders".into()),
    ]));
    let config = ControlPlaneConfig {
        max_hops: 2,
        ..ControlPlaneConfig::default()
    };
    let plane = start_plane(&queue, orchestrator as _, config).await;
    spawn_agent(
        &queue,
        "orders",
        "still not done",
        StepOutcome::Answer,
        Duration::ZERO,
        1,
    )
    .await
    .unwrap();

    let task = plane.submit("never finishes", "test").await.unwrap();
    let finished = recv_task(&mut human).await;

    assert_eq!(finished.id, task.id);
    assert_eq!(finished.status, TaskStatus::NeedsHuman);
    assert_eq!(finished.history.len(), 2);
    assert!(finished.history.iter().all(|step| step.output.is_some()));
}

#[tokio::test]
async fn routing_to_an_unregistered_service_escalates() {
    let queue: Arc<dyn MessageQueue> = Arc::new(InMemoryQueue::new());
    let mut human = queue.subscribe(topics::HUMAN).await.unwrap();

    let orchestrator = Arc::new(ScriptedOrchestrator::new(vec![RoutingDecision::Assign(
        "ghost".into(),
    )]));
    let plane = start_plane(&queue, orchestrator as _, ControlPlaneConfig::default()).await;

    let task = plane.submit("route me nowhere", "test").await.unwrap();
    assert_eq!(task.status, TaskStatus::NeedsHuman);

    let finished = recv_task(&mut human).await;
    assert_eq!(finished.status, TaskStatus::NeedsHuman);
    assert!(finished.history.is_empty());
}

#[tokio::test]
async fn cancel_fails_the_task_and_ignores_the_late_result() {
    let queue: Arc<dyn MessageQueue> = Arc::new(InMemoryQueue::new());
    let mut human = queue.subscribe(topics::HUMAN).await.unwrap();

    let orchestrator = Arc::new(ScriptedOrchestrator::new(vec![RoutingDecision::Assign(
        "orders".into(),
    )]));
    let plane = start_plane(&queue, orchestrator as _, ControlPlaneConfig::default()).await;
    // Slow enough that the cancel always lands before the result.
    spawn_agent(
        &queue,
        "orders",
        "too late",
        StepOutcome::Answer,
        Duration::from_millis(300),
        1,
    )
    .await
    .unwrap();

    let task = plane.submit("cancel me", "test").await.unwrap();
    assert_eq!(task.status, TaskStatus::Routed);

    let cancelled = plane.cancel(task.id).await.unwrap();
    assert_eq!(cancelled.status, TaskStatus::Failed);

    let finished = recv_task(&mut human).await;
    assert_eq!(finished.id, task.id);
    assert_eq!(finished.status, TaskStatus::Failed);

    // Cancelling again is idempotent.
    let again = plane.cancel(task.id).await.unwrap();
    assert_eq!(again.status, TaskStatus::Failed);

    // Give the late result time to arrive and be discarded.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let stored = plane.task(task.id).await.unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);
    assert!(stored.history[0].output.is_none());
    assert_no_more_tasks(&mut human).await;
}

#[tokio::test]
async fn registration_handshake_acks_and_rejects() {
    let queue: Arc<dyn MessageQueue> = Arc::new(InMemoryQueue::new());
    let orchestrator = Arc::new(ScriptedOrchestrator::new(vec![]));
    let plane = start_plane(&queue, orchestrator as _, ControlPlaneConfig::default()).await;

    let mut orders_topic = queue.subscribe("orders").await.unwrap();
    let mut weird_topic = queue.subscribe("weird").await.unwrap();

    let first = RegistrationPayload {
        descriptor: AgentDescriptor::new("orders", "Order lookups."),
        deregister: false,
    };
    queue
        .publish(Envelope::registration("orders", &first).unwrap())
        .await
        .unwrap();

    let envelope = timeout(RECV_TIMEOUT, orders_topic.recv()).await.unwrap().unwrap();
    let ack: RegistrationAck = envelope.payload_as().unwrap();
    assert!(ack.accepted);
    assert_eq!(plane.registry().len(), 1);

    // Same name, different topic: rejected, registry unchanged.
    let conflict = RegistrationPayload {
        descriptor: AgentDescriptor::new("orders", "impostor").with_topic("weird"),
        deregister: false,
    };
    queue
        .publish(Envelope::registration("orders", &conflict).unwrap())
        .await
        .unwrap();

    let envelope = timeout(RECV_TIMEOUT, weird_topic.recv()).await.unwrap().unwrap();
    let ack: RegistrationAck = envelope.payload_as().unwrap();
    assert!(!ack.accepted);
    assert!(ack.reason.unwrap().contains("already registered"));
    assert_eq!(plane.registry().get("orders").unwrap().topic, "orders");

    // Deregistration empties the registry.
    let bye = RegistrationPayload {
        descriptor: AgentDescriptor::new("orders", "Order lookups."),
        deregister: true,
    };
    queue
        .publish(Envelope::registration("orders", &bye).unwrap())
        .await
        .unwrap();

    timeout(RECV_TIMEOUT, async {
        while !plane.registry().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("deregistration never applied");
}
