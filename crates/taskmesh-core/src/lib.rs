//! Core types for taskmesh, a message-queue-mediated multi-agent
//! orchestration layer.
//!
//! Everything the services exchange lives here: the wire
//! [`Envelope`], the [`Task`] lifecycle the control plane tracks, the
//! [`AgentDescriptor`] capability advertisement, and the [`Reasoner`]
//! trait both agents and the orchestrator are generic over. The
//! crates that host services (`taskmesh-queue`, `taskmesh-agent`,
//! `taskmesh-control`, `taskmesh-human`) all build on these types.

/// Capability advertisement for agent services.
pub mod descriptor;
/// Wire envelope and payload types.
pub mod envelope;
/// Unified error type.
pub mod error;
/// The reasoning seam shared by agents and the orchestrator.
pub mod reasoner;
/// Task lifecycle types.
pub mod task;
/// Tool descriptions and invocation records.
pub mod tool;

pub use descriptor::AgentDescriptor;
pub use envelope::{
    topics, Envelope, MessageKind, RegistrationAck, RegistrationPayload, StepOutcome,
    TaskRequestPayload, TaskResultPayload,
};
pub use error::{TaskmeshError, TaskmeshResult};
pub use reasoner::{Completion, Reasoner};
pub use task::{Task, TaskStatus, TaskStep};
pub use tool::{ToolCall, ToolResult, ToolSpec};
