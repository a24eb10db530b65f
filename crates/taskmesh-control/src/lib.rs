//! Control plane for taskmesh.
//!
//! The control plane is the only component that knows the whole mesh:
//! it keeps the [`AgentRegistry`] of live services, the [`TaskStore`]
//! of accepted tasks, and asks an [`Orchestrator`] where each task
//! should go next. Agents and the human consumer only ever see queue
//! topics; the HTTP API in [`http`] is a read/submit window over the
//! same state.

/// REST API over the control plane.
pub mod http;
/// Routing decisions and the reasoner-backed classifier.
pub mod orchestrator;
/// The queue consumer and task lifecycle.
pub mod plane;
/// Registry of live agent services.
pub mod registry;
/// The task table.
pub mod store;

pub use orchestrator::{Orchestrator, ReasonerOrchestrator, RoutingDecision};
pub use plane::{ControlPlane, ControlPlaneConfig};
pub use registry::AgentRegistry;
pub use store::{TaskHandle, TaskStore};
