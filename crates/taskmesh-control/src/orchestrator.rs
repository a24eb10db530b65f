//! Routing decisions over the live registry.
//!
//! The orchestrator never answers a task itself. It looks at the task,
//! the work recorded so far, and the registered services, and picks
//! one of three moves: dispatch another step, declare the task done,
//! or hand it to a human. Ambiguity resolves toward the human.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use taskmesh_core::{AgentDescriptor, Completion, Reasoner, Task, TaskmeshResult};

/// What the orchestrator decided for a task's next hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    /// Dispatch the next step to this service.
    Assign(String),
    /// The recorded work answers the task.
    Complete,
    /// Hand the task to a human, with the reason why.
    Escalate(String),
}

/// Chooses the next move for a task that has no open step.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Decides the next move. `candidates` is the registry at the
    /// time of the call.
    async fn decide(
        &self,
        task: &Task,
        candidates: &[AgentDescriptor],
    ) -> TaskmeshResult<RoutingDecision>;
}

/// An [`Orchestrator`] that asks a [`Reasoner`] to classify the task
/// against the advertised service descriptions.
///
/// The reasoner's reply is held to a closed vocabulary: a registered
/// service name, `DONE`, or `NEED_HUMAN`. Anything else, including a
/// reasoner failure, escalates rather than guessing.
pub struct ReasonerOrchestrator {
    reasoner: Arc<dyn Reasoner>,
}

impl ReasonerOrchestrator {
    /// Wraps a reasoner as the routing classifier.
    pub fn new(reasoner: Arc<dyn Reasoner>) -> Self {
        Self { reasoner }
    }
}

#[async_trait]
impl Orchestrator for ReasonerOrchestrator {
    async fn decide(
        &self,
        task: &Task,
        candidates: &[AgentDescriptor],
    ) -> TaskmeshResult<RoutingDecision> {
        if candidates.is_empty() {
            return Ok(RoutingDecision::Escalate(
                "no agent services registered".into(),
            ));
        }

        let prompt = build_prompt(task, candidates);
        let decision = match self.reasoner.complete(&prompt, &[]).await {
            Ok(Completion::Answer(text)) => parse_decision(&text, candidates),
            Ok(Completion::ToolCall(call)) => RoutingDecision::Escalate(format!(
                "router attempted tool call '{}'",
                call.name
            )),
            Err(e) => RoutingDecision::Escalate(format!("routing failed: {e}")),
        };
        debug!(task_id = %task.id, decision = ?decision, "Routing decision");
        Ok(decision)
    }
}

fn build_prompt(task: &Task, candidates: &[AgentDescriptor]) -> String {
    let mut prompt = String::from(
        "You route tasks across a mesh of agent services. Decide who acts next.\n\nTask: ",
    );
    prompt.push_str(&task.input);

    prompt.push_str("\n\nWork so far:");
    let mut any_output = false;
    for step in &task.history {
        if let Some(output) = &step.output {
            prompt.push_str(&format!("\n- {}: {}", step.agent, output));
            any_output = true;
        }
    }
    if !any_output {
        prompt.push_str("\n(none)");
    }

    prompt.push_str("\n\nServices:");
    for candidate in candidates {
        prompt.push_str(&format!(
            "\n- {}: {}",
            candidate.service_name, candidate.description
        ));
    }

    prompt.push_str(
        "\n\nReply with exactly one service name to dispatch the next step, \
         DONE if the work so far answers the task, \
         or NEED_HUMAN if no service can make progress.",
    );
    prompt
}

fn parse_decision(raw: &str, candidates: &[AgentDescriptor]) -> RoutingDecision {
    let cleaned = raw
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
        .trim_end_matches('.')
        .trim();

    if cleaned.eq_ignore_ascii_case("DONE") {
        return RoutingDecision::Complete;
    }
    if cleaned.eq_ignore_ascii_case("NEED_HUMAN") {
        return RoutingDecision::Escalate("router chose human escalation".into());
    }
    for candidate in candidates {
        if cleaned.eq_ignore_ascii_case(&candidate.service_name) {
            return RoutingDecision::Assign(candidate.service_name.clone());
        }
    }

    let preview: String = raw.trim().chars().take(120).collect();
    RoutingDecision::Escalate(format!("unrecognized routing reply: {preview}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use taskmesh_core::{TaskmeshError, ToolCall, ToolSpec};

    /// Replies with a fixed string and records the prompt.
    struct FixedReasoner {
        reply: TaskmeshResult<Completion>,
        prompts: Mutex<Vec<String>>,
    }

    impl FixedReasoner {
        fn answering(text: &str) -> Self {
            Self {
                reply: Ok(Completion::Answer(text.into())),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                reply: Err(TaskmeshError::Reasoner(message.into())),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Reasoner for FixedReasoner {
        async fn complete(
            &self,
            prompt: &str,
            _tools: &[ToolSpec],
        ) -> TaskmeshResult<Completion> {
            self.prompts.lock().push(prompt.to_string());
            match &self.reply {
                Ok(completion) => Ok(completion.clone()),
                Err(e) => Err(TaskmeshError::Reasoner(e.to_string())),
            }
        }
    }

    fn candidates() -> Vec<AgentDescriptor> {
        vec![
            AgentDescriptor::new("machines", "Useful for machine status and job counts."),
            AgentDescriptor::new("orders", "Useful for order lookups."),
        ]
    }

    async fn decide_with(reasoner: FixedReasoner, task: &Task) -> RoutingDecision {
        ReasonerOrchestrator::new(Arc::new(reasoner))
            .decide(task, &candidates())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn exact_service_name_assigns() {
        let task = Task::new("what is the status of order 5?", "http");
        let decision = decide_with(FixedReasoner::answering("orders"), &task).await;
        assert_eq!(decision, RoutingDecision::Assign("orders".into()));
    }

    #[tokio::test]
    async fn quoting_and_case_are_tolerated() {
        let task = Task::new("order 5?", "http");
        let decision = decide_with(FixedReasoner::answering("\"Orders\"."), &task).await;
        assert_eq!(decision, RoutingDecision::Assign("orders".into()));
    }

    #[tokio::test]
    async fn done_completes() {
        let task = Task::new("done already", "http");
        let decision = decide_with(FixedReasoner::answering("DONE"), &task).await;
        assert_eq!(decision, RoutingDecision::Complete);
    }

    #[tokio::test]
    async fn need_human_escalates() {
        let task = Task::new("write a poem", "http");
        let decision = decide_with(FixedReasoner::answering("NEED_HUMAN"), &task).await;
        assert!(matches!(decision, RoutingDecision::Escalate(_)));
    }

    #[tokio::test]
    async fn chatty_reply_escalates() {
        let task = Task::new("order 5?", "http");
        let decision = decide_with(
            FixedReasoner::answering("I think the orders service fits best here."),
            &task,
        )
        .await;
        match decision {
            RoutingDecision::Escalate(reason) => {
                assert!(reason.contains("unrecognized routing reply"));
            }
            other => panic!("expected escalation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reasoner_failure_escalates() {
        let task = Task::new("order 5?", "http");
        let decision = decide_with(FixedReasoner::failing("backend down"), &task).await;
        match decision {
            RoutingDecision::Escalate(reason) => assert!(reason.contains("routing failed")),
            other => panic!("expected escalation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn tool_call_reply_escalates() {
        let task = Task::new("order 5?", "http");
        let reasoner = FixedReasoner {
            reply: Ok(Completion::ToolCall(ToolCall::new(
                "c1",
                "sneaky",
                serde_json::json!({}),
            ))),
            prompts: Mutex::new(Vec::new()),
        };
        let decision = decide_with(reasoner, &task).await;
        assert!(matches!(decision, RoutingDecision::Escalate(_)));
    }

    #[tokio::test]
    async fn empty_registry_escalates_without_asking() {
        let task = Task::new("anything", "http");
        let reasoner = FixedReasoner::answering("machines");
        let orchestrator = ReasonerOrchestrator::new(Arc::new(reasoner));

        let decision = orchestrator.decide(&task, &[]).await.unwrap();
        match decision {
            RoutingDecision::Escalate(reason) => {
                assert!(reason.contains("no agent services registered"));
            }
            other => panic!("expected escalation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn prompt_carries_descriptions_and_history() {
        let mut task = Task::new("check machine 7 then the orders", "http");
        task.begin_step("machines", "check machine 7 then the orders");
        if let Some(step) = task.open_step_mut() {
            step.close("The machine is healthy.");
        }

        let reasoner = Arc::new(FixedReasoner::answering("orders"));
        let orchestrator = ReasonerOrchestrator::new(Arc::clone(&reasoner) as Arc<dyn Reasoner>);
        orchestrator.decide(&task, &candidates()).await.unwrap();

        let prompts = reasoner.prompts.lock();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("check machine 7 then the orders"));
        assert!(prompts[0].contains("machines: The machine is healthy."));
        assert!(prompts[0].contains("orders: Useful for order lookups."));
        assert!(prompts[0].contains("NEED_HUMAN"));
    }
}
