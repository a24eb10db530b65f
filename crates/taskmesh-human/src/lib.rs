//! Terminal result consumer for taskmesh.
//!
//! The last stop in the mesh: a subscriber on the human topic that
//! stores every finalized task in a sink and serves them over HTTP. The
//! sink going down never fails the sender; results are buffered and
//! retried, and the health endpoint reports the degradation.

/// HTTP read surface.
pub mod http;
/// The consumer loop and its buffering policy.
pub mod service;
/// Storage boundary for finalized tasks.
pub mod sink;

pub use service::{HumanConsumerConfig, TaskResultService};
pub use sink::{MemorySink, ResultSink};
