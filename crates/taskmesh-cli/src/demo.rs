//! The bundled demo fleet: deterministic reasoners and canned tools
//! so the mesh runs end to end without model credentials.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use taskmesh_agent::{AgentConfig, AgentService, FnTool, ToolBox};
use taskmesh_core::{AgentDescriptor, Completion, Reasoner, TaskmeshResult, ToolCall, ToolSpec};
use taskmesh_queue::MessageQueue;

/// Simulated latency for every canned tool.
const TOOL_DELAY: Duration = Duration::from_millis(150);

/// Routing classifier driven by keywords in the task text. Stands in
/// for the model the router normally consults.
pub struct KeywordRouter {
    routes: Vec<(String, String)>,
}

impl KeywordRouter {
    /// Routes matching the bundled fleet: machine talk goes to
    /// `machines`, order talk to `orders`.
    pub fn demo() -> Self {
        Self {
            routes: vec![
                ("machine".into(), "machines".into()),
                ("order".into(), "orders".into()),
            ],
        }
    }
}

#[async_trait]
impl Reasoner for KeywordRouter {
    async fn complete(&self, prompt: &str, _tools: &[ToolSpec]) -> TaskmeshResult<Completion> {
        // Recorded work means the single demo hop already ran.
        if !prompt.contains("\n(none)") {
            return Ok(Completion::Answer("DONE".into()));
        }
        let task = prompt
            .split_once("Task: ")
            .and_then(|(_, rest)| rest.split_once("\n\nWork so far:"))
            .map(|(task, _)| task)
            .unwrap_or(prompt)
            .to_lowercase();
        for (keyword, service) in &self.routes {
            if task.contains(keyword) {
                return Ok(Completion::Answer(service.clone()));
            }
        }
        Ok(Completion::Answer("NEED_HUMAN".into()))
    }

    fn name(&self) -> &str {
        "keyword-router"
    }
}

/// Agent-side reasoner: picks one tool by keyword, then answers with
/// whatever the tool observed.
pub struct KeywordToolReasoner {
    rules: Vec<(String, String)>,
    fallback: String,
}

impl KeywordToolReasoner {
    /// `rules` maps a lowercase keyword to the tool to call;
    /// `fallback` is used when nothing matches.
    pub fn new(rules: &[(&str, &str)], fallback: &str) -> Self {
        Self {
            rules: rules
                .iter()
                .map(|(keyword, tool)| ((*keyword).to_string(), (*tool).to_string()))
                .collect(),
            fallback: fallback.to_string(),
        }
    }

    fn call(tool: &str) -> Completion {
        Completion::ToolCall(ToolCall::new(
            Uuid::new_v4().to_string(),
            tool,
            Value::Null,
        ))
    }
}

#[async_trait]
impl Reasoner for KeywordToolReasoner {
    async fn complete(&self, prompt: &str, _tools: &[ToolSpec]) -> TaskmeshResult<Completion> {
        if let Some(observation) = last_observation(prompt) {
            return Ok(Completion::Answer(observation));
        }
        let lowered = prompt.to_lowercase();
        for (keyword, tool) in &self.rules {
            if lowered.contains(keyword) {
                return Ok(Self::call(tool));
            }
        }
        Ok(Self::call(&self.fallback))
    }

    fn name(&self) -> &str {
        "keyword-tools"
    }
}

/// The text of the last tool observation in an agent transcript.
fn last_observation(prompt: &str) -> Option<String> {
    let tail = &prompt[prompt.rfind("Observation from ")?..];
    let (_, text) = tail.split_once(": ")?;
    Some(text.trim().to_string())
}

fn canned_tool(name: &str, description: &str, output: &'static str) -> Arc<FnTool> {
    Arc::new(FnTool::new(
        ToolSpec::new(name, description),
        move |_: Value| async move {
            tokio::time::sleep(TOOL_DELAY).await;
            Ok(output.to_string())
        },
    ))
}

/// The `machines` demo agent: machine health and job counts.
pub fn machines_agent(queue: Arc<dyn MessageQueue>, config: AgentConfig) -> AgentService {
    let mut toolbox = ToolBox::new(config.tool_timeout());
    toolbox.register(canned_tool(
        "get_machine_status",
        "Reports the health of the machine.",
        "The machine is healthy.",
    ));
    toolbox.register(canned_tool(
        "get_number_of_machine_jobs",
        "Counts the jobs on the machine.",
        "The machine has 5 jobs.",
    ));
    let reasoner = Arc::new(KeywordToolReasoner::new(
        &[("job", "get_number_of_machine_jobs")],
        "get_machine_status",
    ));
    AgentService::new(
        AgentDescriptor::new("machines", "Useful for machine status and machine job counts."),
        queue,
        reasoner,
        toolbox,
        config,
    )
}

/// The `orders` demo agent: order status lookups.
pub fn orders_agent(queue: Arc<dyn MessageQueue>, config: AgentConfig) -> AgentService {
    let mut toolbox = ToolBox::new(config.tool_timeout());
    toolbox.register(canned_tool(
        "get_order_status",
        "Looks up the status of new orders.",
        "There are two new orders in the system.",
    ));
    let reasoner = Arc::new(KeywordToolReasoner::new(&[], "get_order_status"));
    AgentService::new(
        AgentDescriptor::new("orders", "Useful for order status queries."),
        queue,
        reasoner,
        toolbox,
        config,
    )
}
