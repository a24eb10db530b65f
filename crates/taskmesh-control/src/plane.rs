//! The control plane service: accepts tasks, routes steps, records
//! results, and forwards finished tasks to the human topic.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use taskmesh_core::{
    topics, Envelope, MessageKind, RegistrationAck, RegistrationPayload, StepOutcome, Task,
    TaskRequestPayload, TaskResultPayload, TaskStatus, TaskmeshError, TaskmeshResult,
};
use taskmesh_queue::MessageQueue;

use crate::orchestrator::{Orchestrator, RoutingDecision};
use crate::registry::AgentRegistry;
use crate::store::TaskStore;

/// Limits governing the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPlaneConfig {
    /// Most steps a single task may accumulate before it is forced to
    /// a human.
    #[serde(default = "default_max_hops")]
    pub max_hops: u32,
    /// Queue messages handled concurrently.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

fn default_max_hops() -> u32 {
    8
}

fn default_max_in_flight() -> usize {
    16
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            max_hops: default_max_hops(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

/// The hub of the mesh.
///
/// Everything that changes a task goes through here, and every change
/// to one task happens under that task's own lock: accept, dispatch a
/// step, record a result, finalize. Results that do not match the
/// task's single open step are discarded as stale, which is what
/// makes at-least-once delivery safe.
pub struct ControlPlane {
    queue: Arc<dyn MessageQueue>,
    registry: AgentRegistry,
    store: TaskStore,
    orchestrator: Arc<dyn Orchestrator>,
    config: ControlPlaneConfig,
}

impl ControlPlane {
    /// Builds a control plane over the given queue and orchestrator.
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        orchestrator: Arc<dyn Orchestrator>,
        config: ControlPlaneConfig,
    ) -> Self {
        Self {
            queue,
            registry: AgentRegistry::new(),
            store: TaskStore::new(),
            orchestrator,
            config,
        }
    }

    /// The live service registry.
    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Snapshot of one task.
    pub async fn task(&self, id: Uuid) -> Option<Task> {
        self.store.snapshot(id).await
    }

    /// Snapshots of every known task, oldest first.
    pub async fn tasks(&self) -> Vec<Task> {
        self.store.list().await
    }

    /// Consumes the control topic until the queue shuts down.
    pub async fn run(self: Arc<Self>) -> TaskmeshResult<()> {
        let mut sub = self.queue.subscribe(topics::CONTROL_PLANE).await?;
        info!(
            max_hops = self.config.max_hops,
            "Control plane consuming"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight));
        loop {
            let envelope = sub.recv().await?;
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return Ok(()),
            };
            let plane = Arc::clone(&self);
            tokio::spawn(async move {
                plane.handle_envelope(envelope).await;
                drop(permit);
            });
        }
    }

    /// Accepts a new task and routes its first step. Used by the HTTP
    /// API; queue submissions go through the same path internally.
    pub async fn submit(
        &self,
        input: impl Into<String>,
        origin: impl Into<String>,
    ) -> TaskmeshResult<Task> {
        let task = Task::new(input, origin);
        let id = task.id;
        let (handle, _) = self.store.insert_if_absent(task);
        let mut task = handle.lock().await;
        info!(task_id = %id, origin = %task.origin, "Task accepted");
        self.route_next(&mut task).await?;
        Ok(task.clone())
    }

    /// Cancels a task. Terminal tasks are returned unchanged;
    /// anything else is failed and forwarded to the human topic. The
    /// in-flight step's eventual result will be discarded as stale.
    pub async fn cancel(&self, task_id: Uuid) -> TaskmeshResult<Task> {
        let Some(handle) = self.store.get(task_id) else {
            return Err(TaskmeshError::StaleResult(format!(
                "unknown task {task_id}"
            )));
        };
        let mut task = handle.lock().await;
        if task.status.is_terminal() {
            return Ok(task.clone());
        }
        info!(task_id = %task.id, "Task cancelled");
        self.finalize(&mut task, TaskStatus::Failed).await?;
        Ok(task.clone())
    }

    async fn handle_envelope(&self, envelope: Envelope) {
        let kind = envelope.kind;
        let source = envelope.source.clone();
        match self.process(envelope).await {
            Ok(()) => {}
            Err(TaskmeshError::StaleResult(reason)) => {
                debug!(source = %source, reason = %reason, "Discarded stale result");
            }
            Err(e) => {
                warn!(kind = ?kind, source = %source, error = %e, "Failed to handle message");
            }
        }
    }

    async fn process(&self, envelope: Envelope) -> TaskmeshResult<()> {
        match envelope.kind {
            MessageKind::Registration => self.handle_registration(envelope).await,
            MessageKind::TaskRequest => self.handle_submission(envelope).await,
            MessageKind::TaskResult => {
                let payload: TaskResultPayload = envelope.payload_as()?;
                self.handle_result(&envelope.source, payload).await
            }
            MessageKind::ToolCall | MessageKind::ToolResult => {
                debug!(kind = ?envelope.kind, "Tool traffic on control topic ignored");
                Ok(())
            }
        }
    }

    async fn handle_registration(&self, envelope: Envelope) -> TaskmeshResult<()> {
        let payload: RegistrationPayload = envelope.payload_as()?;
        let name = payload.descriptor.service_name.clone();
        let topic = payload.descriptor.topic.clone();

        if payload.deregister {
            let removed = self.registry.deregister(&name);
            debug!(service = %name, removed, "Deregistration processed");
            return Ok(());
        }

        let (accepted, reason) = match self.registry.register(payload.descriptor) {
            Ok(()) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        };
        let ack = RegistrationAck {
            service_name: name,
            accepted,
            reason,
        };
        self.queue
            .publish(Envelope::registration_ack(&topic, &ack)?)
            .await
    }

    /// A task submitted over the queue. Submissions carry their own
    /// task id, so redelivery must not create or re-route the task.
    async fn handle_submission(&self, envelope: Envelope) -> TaskmeshResult<()> {
        let payload: TaskRequestPayload = envelope.payload_as()?;
        let task = Task::new(payload.input, envelope.source).with_id(payload.task_id);
        let (handle, created) = self.store.insert_if_absent(task);
        if !created {
            debug!(task_id = %payload.task_id, "Duplicate submission ignored");
            return Ok(());
        }
        let mut task = handle.lock().await;
        info!(task_id = %task.id, origin = %task.origin, "Task accepted");
        self.route_next(&mut task).await
    }

    /// A step result from an agent. Anything that does not exactly
    /// match the task's open step is stale: unknown task, terminal
    /// task, wrong step index, or wrong sender.
    async fn handle_result(
        &self,
        source: &str,
        payload: TaskResultPayload,
    ) -> TaskmeshResult<()> {
        let Some(handle) = self.store.get(payload.task_id) else {
            return Err(TaskmeshError::StaleResult(format!(
                "unknown task {}",
                payload.task_id
            )));
        };
        let mut task = handle.lock().await;

        if task.status.is_terminal() {
            return Err(TaskmeshError::StaleResult(format!(
                "task {} is already {:?}",
                task.id, task.status
            )));
        }
        let Some(open_index) = task.open_step_index() else {
            return Err(TaskmeshError::StaleResult(format!(
                "task {} has no open step",
                task.id
            )));
        };
        if open_index != payload.step {
            return Err(TaskmeshError::StaleResult(format!(
                "task {} expected step {open_index}, got {}",
                task.id, payload.step
            )));
        }
        if task.open_step().map(|step| step.agent.as_str()) != Some(source) {
            return Err(TaskmeshError::StaleResult(format!(
                "step {open_index} of task {} does not belong to '{source}'",
                task.id
            )));
        }

        if let Some(step) = task.open_step_mut() {
            step.close(&payload.output);
        }
        task.mark(TaskStatus::InProgress);
        info!(
            task_id = %task.id,
            step = open_index,
            agent = %source,
            outcome = ?payload.outcome,
            "Step result recorded"
        );

        if payload.outcome == StepOutcome::NeedsHuman {
            info!(task_id = %task.id, "Agent requested human handoff");
            return self.finalize(&mut task, TaskStatus::NeedsHuman).await;
        }
        self.route_next(&mut task).await
    }

    /// Applies the orchestrator's decision to a task with no open
    /// step. Caller holds the task lock.
    async fn route_next(&self, task: &mut Task) -> TaskmeshResult<()> {
        let candidates = self.registry.list();
        let decision = match self.orchestrator.decide(task, &candidates).await {
            Ok(decision) => decision,
            Err(e) => RoutingDecision::Escalate(format!("routing failed: {e}")),
        };

        match decision {
            RoutingDecision::Assign(service) => {
                if task.history.len() as u32 >= self.config.max_hops {
                    warn!(
                        task_id = %task.id,
                        hops = task.history.len(),
                        "Hop budget exhausted, escalating"
                    );
                    return self.finalize(task, TaskStatus::NeedsHuman).await;
                }
                let Some(descriptor) = self.registry.get(&service) else {
                    warn!(
                        task_id = %task.id,
                        service = %service,
                        "Routed to an unregistered service, escalating"
                    );
                    return self.finalize(task, TaskStatus::NeedsHuman).await;
                };

                let input = compose_step_input(task);
                let step = task.begin_step(&descriptor.service_name, &input);
                let payload = TaskRequestPayload {
                    task_id: task.id,
                    step,
                    input,
                };
                self.queue
                    .publish(Envelope::task_request(
                        topics::CONTROL_PLANE,
                        &descriptor.topic,
                        &payload,
                    )?)
                    .await?;
                info!(
                    task_id = %task.id,
                    step,
                    service = %descriptor.service_name,
                    "Step dispatched"
                );
                Ok(())
            }
            RoutingDecision::Complete => {
                if task.last_output().is_none() {
                    // Completing a task no agent ever touched would
                    // fabricate an answer out of nothing.
                    warn!(task_id = %task.id, "Completion with no recorded work, escalating");
                    return self.finalize(task, TaskStatus::NeedsHuman).await;
                }
                self.finalize(task, TaskStatus::Completed).await
            }
            RoutingDecision::Escalate(reason) => {
                info!(task_id = %task.id, reason = %reason, "Task escalated to human");
                self.finalize(task, TaskStatus::NeedsHuman).await
            }
        }
    }

    /// Marks the task terminal and pushes the full record to the
    /// human topic.
    async fn finalize(&self, task: &mut Task, status: TaskStatus) -> TaskmeshResult<()> {
        task.mark(status);
        let envelope = Envelope::new(
            MessageKind::TaskResult,
            topics::CONTROL_PLANE,
            topics::HUMAN,
            Some(task.id),
            serde_json::to_value(&*task)?,
        );
        self.queue.publish(envelope).await?;
        info!(
            task_id = %task.id,
            status = ?task.status,
            steps = task.history.len(),
            "Task finalized"
        );
        Ok(())
    }
}

/// The instruction text for a task's next step: the original request,
/// plus every recorded output once there are any.
fn compose_step_input(task: &Task) -> String {
    if task.history.is_empty() {
        return task.input.clone();
    }
    let mut input = format!("Task: {}\n\nWork so far:", task.input);
    for step in &task.history {
        if let Some(output) = &step.output {
            input.push_str(&format!("\n- {}: {}", step.agent, output));
        }
    }
    input.push_str("\n\nContinue the task using the work above.");
    input
}
