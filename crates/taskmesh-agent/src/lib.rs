//! Agent service runtime for taskmesh.
//!
//! An [`AgentService`] pairs a [`Reasoner`](taskmesh_core::Reasoner)
//! with a [`ToolBox`] and runs them as a queue consumer: it registers
//! its [`AgentDescriptor`](taskmesh_core::AgentDescriptor) with the
//! control plane, pulls task steps from its own topic, and publishes
//! exactly one result per step back to the control plane, however
//! many times the step is delivered.

/// Per-service tunables.
pub mod config;
mod dedup;
/// The queue consumer and reasoning loop.
pub mod service;
/// The tool trait and closure adapter.
pub mod tool;
/// Tool registry with invocation deadlines.
pub mod toolbox;

pub use config::AgentConfig;
pub use service::AgentService;
pub use tool::{FnTool, Tool};
pub use toolbox::ToolBox;
