//! The agent service: a queue consumer wrapping a reasoner and its
//! tools.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use taskmesh_core::{
    topics, AgentDescriptor, Completion, Envelope, MessageKind, Reasoner, RegistrationAck,
    RegistrationPayload, StepOutcome, TaskRequestPayload, TaskResultPayload, TaskmeshError,
    TaskmeshResult,
};
use taskmesh_queue::{MessageQueue, Subscription};

use crate::config::AgentConfig;
use crate::dedup::{RecentResults, StepKey};
use crate::toolbox::ToolBox;

/// One agent service instance.
///
/// The service registers itself with the control plane over the
/// queue, then consumes task requests from its own topic. Each step
/// runs the reasoning loop: completion, tool call, observation
/// backfill, repeat, up to the configured budget. Every request is
/// answered with exactly one result per `(task_id, step)`, redelivery
/// included.
pub struct AgentService {
    descriptor: AgentDescriptor,
    queue: Arc<dyn MessageQueue>,
    reasoner: Arc<dyn Reasoner>,
    toolbox: ToolBox,
    config: AgentConfig,
    seen: Mutex<RecentResults>,
    in_flight: Mutex<HashSet<StepKey>>,
}

impl AgentService {
    /// Builds a service. The descriptor's advertised tool names are
    /// overwritten with the toolbox contents so the two cannot drift.
    pub fn new(
        descriptor: AgentDescriptor,
        queue: Arc<dyn MessageQueue>,
        reasoner: Arc<dyn Reasoner>,
        toolbox: ToolBox,
        config: AgentConfig,
    ) -> Self {
        let descriptor = descriptor.with_tool_names(toolbox.names());
        let seen = Mutex::new(RecentResults::new(config.result_cache_size));
        Self {
            descriptor,
            queue,
            reasoner,
            toolbox,
            config,
            seen,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// The capabilities this service advertises.
    pub fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    /// Registers with the control plane and consumes the service
    /// topic until the queue shuts down. Registration is retried with
    /// backoff; a spent retry budget aborts startup.
    pub async fn run(self: Arc<Self>) -> TaskmeshResult<()> {
        let (mut sub, backlog) = self.register_with_retry().await?;
        info!(
            service = %self.descriptor.service_name,
            topic = %self.descriptor.topic,
            tools = self.toolbox.tool_count(),
            "Agent service registered"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight));
        for envelope in backlog {
            self.dispatch(envelope, &semaphore).await;
        }
        loop {
            let envelope = sub.recv().await?;
            self.dispatch(envelope, &semaphore).await;
        }
    }

    /// Tells the control plane to drop this service from the
    /// registry. Used on shutdown.
    pub async fn deregister(&self) -> TaskmeshResult<()> {
        let payload = RegistrationPayload {
            descriptor: self.descriptor.clone(),
            deregister: true,
        };
        self.queue
            .publish(Envelope::registration(
                &self.descriptor.service_name,
                &payload,
            )?)
            .await?;
        info!(service = %self.descriptor.service_name, "Agent service deregistered");
        Ok(())
    }

    async fn register_with_retry(&self) -> TaskmeshResult<(Subscription, Vec<Envelope>)> {
        let policy = &self.config.registration_retry;
        let mut last_err = TaskmeshError::Registration("no registration attempt made".into());

        for attempt in 0..=policy.max_retries {
            match self.register().await {
                Ok(ok) => return Ok(ok),
                Err(e) => {
                    if attempt < policy.max_retries {
                        let delay = policy.backoff_ms(attempt);
                        warn!(
                            service = %self.descriptor.service_name,
                            attempt,
                            delay_ms = delay,
                            error = %e,
                            "Registration failed, backing off"
                        );
                        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                    }
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    /// Subscribes to the service topic, announces the descriptor, and
    /// waits for the control plane's ack. Task requests that arrive
    /// while waiting are returned as a backlog instead of being lost.
    async fn register(&self) -> TaskmeshResult<(Subscription, Vec<Envelope>)> {
        let mut sub = self.queue.subscribe(&self.descriptor.topic).await?;
        let payload = RegistrationPayload {
            descriptor: self.descriptor.clone(),
            deregister: false,
        };
        self.queue
            .publish(Envelope::registration(
                &self.descriptor.service_name,
                &payload,
            )?)
            .await?;

        let mut backlog = Vec::new();
        let ack = tokio::time::timeout(self.config.registration_timeout(), async {
            loop {
                let envelope = sub.recv().await?;
                if envelope.kind == MessageKind::Registration {
                    match envelope.payload_as::<RegistrationAck>() {
                        Ok(ack) if ack.service_name == self.descriptor.service_name => {
                            return Ok::<RegistrationAck, TaskmeshError>(ack);
                        }
                        _ => continue,
                    }
                }
                backlog.push(envelope);
            }
        })
        .await
        .map_err(|_| {
            TaskmeshError::Registration(format!(
                "no ack from control plane within {}ms",
                self.config.registration_timeout_ms
            ))
        })??;

        if !ack.accepted {
            return Err(TaskmeshError::Registration(
                ack.reason
                    .unwrap_or_else(|| "registration rejected".into()),
            ));
        }
        Ok((sub, backlog))
    }

    async fn dispatch(self: &Arc<Self>, envelope: Envelope, semaphore: &Arc<Semaphore>) {
        match envelope.kind {
            MessageKind::TaskRequest => {
                let payload: TaskRequestPayload = match envelope.payload_as() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(error = %e, "Malformed task request discarded");
                        return;
                    }
                };
                self.dispatch_request(payload, semaphore).await;
            }
            MessageKind::Registration => {
                debug!(
                    service = %self.descriptor.service_name,
                    "Late registration ack ignored"
                );
            }
            other => {
                debug!(kind = ?other, "Unexpected message kind on agent topic, discarded");
            }
        }
    }

    async fn dispatch_request(
        self: &Arc<Self>,
        payload: TaskRequestPayload,
        semaphore: &Arc<Semaphore>,
    ) {
        let key: StepKey = (payload.task_id, payload.step);

        let cached = self.seen.lock().get(&key).cloned();
        if let Some(result) = cached {
            debug!(
                task_id = %payload.task_id,
                step = payload.step,
                "Redelivery answered from result cache"
            );
            self.publish_result(&result).await;
            return;
        }
        if !self.in_flight.lock().insert(key) {
            debug!(
                task_id = %payload.task_id,
                step = payload.step,
                "Duplicate request already in flight, dropped"
            );
            return;
        }

        // Waiting here is the concurrency bound: the consumer loop
        // stalls until a slot frees up.
        let permit = match Arc::clone(semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                self.in_flight.lock().remove(&key);
                return;
            }
        };

        let service = Arc::clone(self);
        tokio::spawn(async move {
            let result = service.handle_request(&payload).await;
            service.seen.lock().insert(result.clone());
            service.in_flight.lock().remove(&key);
            service.publish_result(&result).await;
            drop(permit);
        });
    }

    /// Runs the reasoning loop for one task step. Always produces a
    /// result: reasoner failures and budget exhaustion become
    /// needs-human results rather than dropped work.
    async fn handle_request(&self, request: &TaskRequestPayload) -> TaskResultPayload {
        info!(
            service = %self.descriptor.service_name,
            task_id = %request.task_id,
            step = request.step,
            "Handling task step"
        );

        let specs = self.toolbox.specs();
        let mut transcript = request.input.clone();

        for turn in 0..self.config.max_reasoning_steps {
            match self.reasoner.complete(&transcript, &specs).await {
                Ok(Completion::Answer(text)) => {
                    info!(
                        task_id = %request.task_id,
                        step = request.step,
                        turns = turn + 1,
                        "Step answered"
                    );
                    return TaskResultPayload {
                        task_id: request.task_id,
                        step: request.step,
                        output: text,
                        outcome: StepOutcome::Answer,
                    };
                }
                Ok(Completion::ToolCall(call)) => {
                    debug!(
                        task_id = %request.task_id,
                        tool = %call.name,
                        call_id = %call.id,
                        "Executing tool call"
                    );
                    let result = self.toolbox.invoke(&call).await;
                    let observation = if result.is_error {
                        format!("Tool error: {}", result.content)
                    } else {
                        result.content
                    };
                    transcript.push_str(&format!(
                        "\n\nObservation from {}: {}",
                        call.name, observation
                    ));
                }
                Err(e) => {
                    warn!(
                        task_id = %request.task_id,
                        step = request.step,
                        error = %e,
                        "Reasoner failed, escalating step"
                    );
                    return self.escalate(request, format!("Reasoner failed: {e}"));
                }
            }
        }

        warn!(
            task_id = %request.task_id,
            step = request.step,
            max_steps = self.config.max_reasoning_steps,
            "Reasoning budget exhausted, escalating step"
        );
        self.escalate(
            request,
            format!(
                "No answer after {} reasoning steps",
                self.config.max_reasoning_steps
            ),
        )
    }

    fn escalate(&self, request: &TaskRequestPayload, output: String) -> TaskResultPayload {
        TaskResultPayload {
            task_id: request.task_id,
            step: request.step,
            output,
            outcome: StepOutcome::NeedsHuman,
        }
    }

    async fn publish_result(&self, result: &TaskResultPayload) {
        let envelope = match Envelope::task_result(
            &self.descriptor.service_name,
            topics::CONTROL_PLANE,
            result,
        ) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(task_id = %result.task_id, error = %e, "Failed to encode task result");
                return;
            }
        };
        if let Err(e) = self.queue.publish(envelope).await {
            error!(task_id = %result.task_id, error = %e, "Failed to publish task result");
        }
    }
}
