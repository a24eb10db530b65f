//! Unified error type shared by every taskmesh crate.

use thiserror::Error;

/// Errors produced anywhere in the mesh.
#[derive(Error, Debug)]
pub enum TaskmeshError {
    /// The control plane rejected a service registration.
    #[error("Registration error: {0}")]
    Registration(String),

    /// Routing could not select an agent for a task.
    #[error("No eligible agent: {0}")]
    NoEligibleAgent(String),

    /// A tool call ran past its deadline.
    #[error("Tool timed out: {0}")]
    ToolTimeout(String),

    /// A tool failed while executing.
    #[error("Tool error: {0}")]
    Tool(String),

    /// A result arrived for an unknown, terminal, or superseded step.
    #[error("Stale result: {0}")]
    StaleResult(String),

    /// The message queue refused a publish or subscribe.
    #[error("Queue error: {0}")]
    Queue(String),

    /// The reasoning backend failed to produce a completion.
    #[error("Reasoner error: {0}")]
    Reasoner(String),

    /// Configuration could not be loaded or validated.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used across all taskmesh crates.
pub type TaskmeshResult<T> = Result<T, TaskmeshError>;
