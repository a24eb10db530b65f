//! Tool registry with a hard per-invocation deadline.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use taskmesh_core::{ToolCall, ToolResult, ToolSpec};

use crate::tool::Tool;

/// The tools one agent service exposes to its reasoner.
///
/// Invocation never returns an error to the caller: unknown tools,
/// failures, and timeouts all come back as an error-flagged
/// [`ToolResult`] so the reasoning loop can fold them into its
/// transcript and carry on.
pub struct ToolBox {
    tools: HashMap<String, Arc<dyn Tool>>,
    timeout: Duration,
}

impl ToolBox {
    /// Creates an empty toolbox whose invocations are cut off after
    /// `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            tools: HashMap::new(),
            timeout,
        }
    }

    /// Adds a tool, replacing any previous tool of the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.spec().name.clone();
        info!(tool = %name, "Registered tool");
        self.tools.insert(name, tool);
    }

    /// Specs of every registered tool, for handing to a reasoner.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec().clone()).collect()
    }

    /// Registered tool names, for capability advertisement.
    pub fn names(&self) -> BTreeSet<String> {
        self.tools.keys().cloned().collect()
    }

    /// Number of registered tools.
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Executes one tool call under the configured deadline.
    pub async fn invoke(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, "Unknown tool requested");
            return ToolResult::error(&call.id, format!("Unknown tool: {}", call.name));
        };

        let started = Instant::now();
        match tokio::time::timeout(self.timeout, tool.invoke(call.arguments.clone())).await {
            Ok(Ok(content)) => {
                debug!(
                    tool = %call.name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Tool completed"
                );
                ToolResult::success(&call.id, content)
            }
            Ok(Err(e)) => {
                error!(tool = %call.name, error = %e, "Tool execution failed");
                ToolResult::error(&call.id, e.to_string())
            }
            Err(_) => {
                warn!(
                    tool = %call.name,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Tool timed out"
                );
                ToolResult::error(
                    &call.id,
                    format!("Tool timed out after {}ms", self.timeout.as_millis()),
                )
            }
        }
    }
}
