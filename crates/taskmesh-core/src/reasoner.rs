//! The reasoning seam.
//!
//! Both the agents and the orchestrator drive a [`Reasoner`]: agents
//! to act on task steps with tools, the orchestrator to classify
//! which service a task should hop to next. Implementations wrap a
//! model API, a local model, or a deterministic stub in tests.

use async_trait::async_trait;

use crate::error::TaskmeshResult;
use crate::tool::{ToolCall, ToolSpec};

/// One completion from a reasoning backend.
#[derive(Debug, Clone)]
pub enum Completion {
    /// Final text for the given prompt.
    Answer(String),
    /// The backend wants a tool invoked before it can answer.
    ToolCall(ToolCall),
}

/// A reasoning capability.
///
/// `tools` lists what the caller is willing to execute; a backend
/// that cannot use tools simply never returns
/// [`Completion::ToolCall`].
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Produces the next completion for `prompt`.
    async fn complete(&self, prompt: &str, tools: &[ToolSpec]) -> TaskmeshResult<Completion>;

    /// Identifier used in logs.
    fn name(&self) -> &str {
        "reasoner"
    }
}
