//! Tool descriptions and invocation records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Describes one tool an agent exposes to its reasoner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name, unique within the owning agent.
    pub name: String,
    /// What the tool does, phrased for the reasoner.
    pub description: String,
    /// JSON schema of the accepted arguments. `Null` means the tool
    /// takes no arguments.
    #[serde(default)]
    pub parameters: Value,
}

impl ToolSpec {
    /// Builds a spec for a tool that takes no arguments.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Value::Null,
        }
    }

    /// Attaches an argument schema.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// A reasoner's request to invoke a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation id for matching the result back to the call.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Arguments as JSON.
    pub arguments: Value,
}

impl ToolCall {
    /// Builds a call with the given correlation id.
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// The outcome of one tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Correlation id echoed from the call.
    pub call_id: String,
    /// Tool output, or an error description.
    pub content: String,
    /// True when `content` describes a failure.
    pub is_error: bool,
}

impl ToolResult {
    /// A successful invocation.
    pub fn success(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// A failed invocation.
    pub fn error(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}
