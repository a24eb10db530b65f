//! Message queue layer for taskmesh.
//!
//! Services never talk to each other directly; every interaction is
//! an [`Envelope`](taskmesh_core::Envelope) published to a topic on a
//! [`MessageQueue`]. This crate defines that seam, a process-local
//! [`InMemoryQueue`] backend, and the [`RetryingQueue`] wrapper that
//! provides at-least-once publish semantics.

/// In-memory backend over broadcast channels.
pub mod memory;
/// The queue trait and subscription handle.
pub mod queue;
/// Publish retries with exponential backoff.
pub mod retry;

pub use memory::{InMemoryQueue, DEFAULT_TOPIC_CAPACITY};
pub use queue::{MessageQueue, Subscription};
pub use retry::{RetryPolicy, RetryingQueue};
